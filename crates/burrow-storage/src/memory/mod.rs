//! In-memory storage backend
//!
//! Package documents are kept serialized as JSON, the way a file backend
//! would hold them, so every read goes through the same decode path.
//! Tarballs are committed only once their upload finishes.

use std::sync::Arc;

use async_trait::async_trait;
use burrow_core::error::BurrowError;
use burrow_core::stream::{
    TarballStream, TarballUpload, UploadEvent, UploadReceiver, DEFAULT_CHUNK_SIZE, UPLOAD_CHANNEL_CAPACITY,
};
use burrow_core::types::PackageRecord;
use bytes::{Bytes, BytesMut};
use dashmap::{DashMap, DashSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::lock::KeyedLocks;
use crate::manager::PackageStorage;
use crate::StorageResult;

/// Ephemeral storage backend
#[derive(Debug, Default)]
pub struct MemoryStorage {
    packages: Arc<DashMap<String, String>>,
    tarballs: Arc<DashMap<String, Bytes>>,
    /// Blobs with an upload in flight
    pending: Arc<DashSet<String>>,
    locks: KeyedLocks,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the backend with packages and blobs
    pub fn with_data<P, T>(packages: P, tarballs: T) -> StorageResult<Self>
    where
        P: IntoIterator<Item = PackageRecord>,
        T: IntoIterator<Item = (String, Bytes)>,
    {
        let storage = Self::new();
        for record in packages {
            let raw = encode(&record)?;
            storage.packages.insert(record.name.clone(), raw);
        }
        for (name, data) in tarballs {
            storage.tarballs.insert(name, data);
        }
        Ok(storage)
    }

    /// Whether a committed blob exists under `name`
    pub fn has_tarball(&self, name: &str) -> bool {
        self.tarballs.contains_key(name)
    }

    pub fn package_count(&self) -> usize {
        self.packages.len()
    }
}

fn encode(record: &PackageRecord) -> StorageResult<String> {
    serde_json::to_string(record)
        .map_err(|e| BurrowError::internal(format!("failed to serialize package '{}'", record.name), e))
}

fn decode(name: &str, raw: &str) -> StorageResult<PackageRecord> {
    serde_json::from_str(raw).map_err(|e| BurrowError::internal(format!("failed to parse package '{}'", name), e))
}

#[async_trait]
impl PackageStorage for MemoryStorage {
    async fn create_package(&self, name: &str, record: &PackageRecord) -> StorageResult<()> {
        let raw = encode(record)?;
        match self.packages.entry(name.to_string()) {
            dashmap::mapref::entry::Entry::Occupied(_) => Err(BurrowError::Conflict {
                resource: name.to_string(),
            }),
            dashmap::mapref::entry::Entry::Vacant(entry) => {
                entry.insert(raw);
                debug!(package = name, "package created");
                Ok(())
            },
        }
    }

    async fn save_package(&self, name: &str, record: &PackageRecord) -> StorageResult<()> {
        let raw = encode(record)?;
        self.packages.insert(name.to_string(), raw);
        Ok(())
    }

    async fn read_package(&self, name: &str) -> StorageResult<PackageRecord> {
        let raw = self
            .packages
            .get(name)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| BurrowError::NotFound {
                resource: name.to_string(),
            })?;
        decode(name, &raw)
    }

    async fn delete_package(&self, name: &str) -> StorageResult<()> {
        if self.packages.remove(name).is_some() {
            debug!(package = name, "package deleted");
        }
        Ok(())
    }

    async fn write_tarball(&self, name: &str) -> StorageResult<TarballUpload> {
        // Claim the name first so a concurrent commit cannot slip in
        if !self.pending.insert(name.to_string()) {
            return Err(BurrowError::Conflict {
                resource: name.to_string(),
            });
        }
        if self.tarballs.contains_key(name) {
            self.pending.remove(name);
            return Err(BurrowError::Conflict {
                resource: name.to_string(),
            });
        }

        let (upload, receiver) = TarballUpload::channel(UPLOAD_CHANNEL_CAPACITY);
        tokio::spawn(receive_tarball(
            name.to_string(),
            receiver,
            Arc::clone(&self.tarballs),
            Arc::clone(&self.pending),
        ));
        Ok(upload)
    }

    async fn read_tarball(&self, name: &str) -> StorageResult<TarballStream> {
        let data = self
            .tarballs
            .get(name)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| BurrowError::NotFound {
                resource: name.to_string(),
            })?;
        Ok(TarballStream::from_bytes(data, DEFAULT_CHUNK_SIZE, CancellationToken::new()))
    }

    fn update_locks(&self) -> &KeyedLocks {
        &self.locks
    }
}

/// Buffer an upload and commit it once the writer is done
async fn receive_tarball(
    name: String,
    mut receiver: UploadReceiver,
    tarballs: Arc<DashMap<String, Bytes>>,
    pending: Arc<DashSet<String>>,
) {
    let mut buffer = BytesMut::new();
    loop {
        match receiver.recv().await {
            UploadEvent::Chunk(chunk) => buffer.extend_from_slice(&chunk),
            UploadEvent::Finished => {
                let length = buffer.len() as u64;
                tarballs.insert(name.clone(), buffer.freeze());
                pending.remove(&name);
                debug!(tarball = %name, bytes = length, "tarball stored");
                receiver.complete(Ok(length));
                return;
            },
            UploadEvent::Aborted => {
                pending.remove(&name);
                warn!(tarball = %name, received = receiver.received(), "tarball upload aborted");
                receiver.complete(Err(BurrowError::aborted("transmission aborted")));
                return;
            },
        }
    }
}
