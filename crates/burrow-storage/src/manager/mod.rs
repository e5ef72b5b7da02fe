//! The storage contract every backend implements

use async_trait::async_trait;
use burrow_core::error::BurrowError;
use burrow_core::stream::{TarballStream, TarballUpload};
use burrow_core::types::PackageRecord;
use futures::future::BoxFuture;
use tracing::debug;

use crate::lock::KeyedLocks;
use crate::StorageResult;

/// Mutation applied inside `update_package`; an error aborts the update
pub type RecordTransform = Box<dyn FnOnce(&mut PackageRecord) -> StorageResult<()> + Send>;

/// Persists the transformed record in place of `save_package`
pub type RecordWriter = Box<dyn FnOnce(String, PackageRecord) -> BoxFuture<'static, StorageResult<()>> + Send>;

/// Storage for package documents and tarball blobs.
///
/// No operation retries internally. Stored documents that cannot be
/// decoded are reported as `Internal` errors.
#[async_trait]
pub trait PackageStorage: Send + Sync {
    /// Store a new package; `Conflict` if `name` already exists
    async fn create_package(&self, name: &str, record: &PackageRecord) -> StorageResult<()>;

    /// Store a package unconditionally
    async fn save_package(&self, name: &str, record: &PackageRecord) -> StorageResult<()>;

    /// Load a package; `NotFound` if it does not exist
    async fn read_package(&self, name: &str) -> StorageResult<PackageRecord>;

    /// Remove a package; removing a missing package succeeds
    async fn delete_package(&self, name: &str) -> StorageResult<()>;

    /// Open a blob for writing.
    ///
    /// Fails with `Conflict` before any bytes are accepted when the blob
    /// already exists or another upload to it is in progress. Aborting the
    /// upload discards what was written.
    async fn write_tarball(&self, name: &str) -> StorageResult<TarballUpload>;

    /// Open a blob for reading; `NotFound` if it does not exist. The
    /// returned stream already knows the blob's length.
    async fn read_tarball(&self, name: &str) -> StorageResult<TarballStream>;

    /// Locks used to serialize `update_package` per package
    fn update_locks(&self) -> &KeyedLocks;

    /// Read-modify-write a package.
    ///
    /// Only one update per package runs at a time. The stored record is
    /// read, `transform` is applied and the result is handed to `on_write`,
    /// or to `save_package` when no writer is given. If reading or the
    /// transform fails nothing is written; a failing writer is reported as
    /// `Internal`. Returns the written record.
    async fn update_package(
        &self,
        name: &str,
        transform: RecordTransform,
        on_write: Option<RecordWriter>,
    ) -> StorageResult<PackageRecord> {
        let _guard = self.update_locks().lock(name).await;

        let mut record = self.read_package(name).await?;
        transform(&mut record)?;

        let written = match on_write {
            Some(write) => write(name.to_string(), record.clone()).await,
            None => self.save_package(name, &record).await,
        };
        written.map_err(|e| match e {
            BurrowError::Internal { .. } => e,
            other => BurrowError::internal(format!("failed to write package '{}'", name), other),
        })?;

        debug!(package = name, "package updated");
        Ok(record)
    }
}
