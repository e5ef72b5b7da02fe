//! Streaming tarball transfers.
//!
//! `TarballStream` is the read side (uplink downloads, storage reads) and
//! `TarballUpload` the write side (storage writes). Both are pull/await
//! driven so a slow consumer suspends the producer, and both can be
//! aborted from another task through an `AbortHandle`.

use std::pin::Pin;

use bytes::Bytes;
use futures::Stream;
use tokio_util::sync::CancellationToken;

use crate::error::BurrowResult;

pub mod tarball;
pub mod upload;

pub use tarball::{Opened, TarballStream, TransferState, DEFAULT_CHUNK_SIZE};
pub use upload::{TarballUpload, UploadEvent, UploadReceiver, UPLOAD_CHANNEL_CAPACITY};

/// A boxed stream of byte chunks
pub type ByteStream = Pin<Box<dyn Stream<Item = BurrowResult<Bytes>> + Send>>;

/// Cloneable handle that aborts one transfer
#[derive(Debug, Clone)]
pub struct AbortHandle {
    token: CancellationToken,
}

impl AbortHandle {
    pub(crate) fn new(token: CancellationToken) -> Self {
        Self { token }
    }

    /// Abort the transfer; the consumer sees an `Aborted` error
    pub fn abort(&self) {
        self.token.cancel();
    }

    pub fn is_aborted(&self) -> bool {
        self.token.is_cancelled()
    }
}
