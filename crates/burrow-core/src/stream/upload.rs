//! Write side of a tarball transfer.
//!
//! The writer and the storage backend are joined by a bounded channel: once
//! `UPLOAD_CHANNEL_CAPACITY` chunks are in flight, `write` suspends until
//! the backend catches up. The backend reports the final outcome (bytes
//! stored, or the reason it failed) back to the writer. A writer dropped
//! without calling `done` counts as aborted.

use bytes::Bytes;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use super::AbortHandle;
use crate::error::{BurrowError, BurrowResult};

/// Chunks buffered between writer and backend
pub const UPLOAD_CHANNEL_CAPACITY: usize = 16;

/// What travels over the upload channel
#[derive(Debug)]
enum Frame {
    Chunk(Bytes),
    End,
}

/// Writer half of an upload
#[derive(Debug)]
pub struct TarballUpload {
    sender: mpsc::Sender<Frame>,
    token: CancellationToken,
    /// Taken once the backend's report has been read
    outcome: Option<oneshot::Receiver<BurrowResult<u64>>>,
    written: u64,
}

/// Backend half of an upload
#[derive(Debug)]
pub struct UploadReceiver {
    receiver: mpsc::Receiver<Frame>,
    token: CancellationToken,
    outcome: Option<oneshot::Sender<BurrowResult<u64>>>,
    received: u64,
}

/// What the backend sees next
#[derive(Debug, PartialEq, Eq)]
pub enum UploadEvent {
    Chunk(Bytes),
    /// The writer called `done`; commit the blob
    Finished,
    /// The writer aborted or went away; discard anything written so far
    Aborted,
}

impl TarballUpload {
    /// Create a connected writer/backend pair
    pub fn channel(capacity: usize) -> (TarballUpload, UploadReceiver) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        let (outcome_tx, outcome_rx) = oneshot::channel();
        let token = CancellationToken::new();

        let upload = TarballUpload {
            sender,
            token: token.clone(),
            outcome: Some(outcome_rx),
            written: 0,
        };
        let receiver = UploadReceiver {
            receiver,
            token,
            outcome: Some(outcome_tx),
            received: 0,
        };
        (upload, receiver)
    }

    /// Send one chunk, waiting while the backend is behind
    pub async fn write(&mut self, chunk: Bytes) -> BurrowResult<()> {
        let len = chunk.len() as u64;
        self.send(Frame::Chunk(chunk)).await?;
        self.written += len;
        Ok(())
    }

    /// Bytes accepted by the channel so far
    pub fn written(&self) -> u64 {
        self.written
    }

    pub fn abort_handle(&self) -> AbortHandle {
        AbortHandle::new(self.token.clone())
    }

    /// Signal end of data and wait for the backend to commit
    pub async fn done(mut self) -> BurrowResult<u64> {
        self.send(Frame::End).await?;
        self.outcome().await
    }

    /// Abort the upload and wait for the backend to release the partial blob.
    ///
    /// Resolves to the backend's report, normally `Err(Aborted)`.
    pub async fn abort(self) -> BurrowResult<u64> {
        self.token.cancel();
        self.outcome().await
    }

    async fn send(&mut self, frame: Frame) -> BurrowResult<()> {
        if self.token.is_cancelled() {
            return Err(BurrowError::aborted("upload was aborted"));
        }

        let sent = tokio::select! {
            biased;
            _ = self.token.cancelled() => None,
            sent = self.sender.send(frame) => Some(sent.is_ok()),
        };

        match sent {
            None => Err(BurrowError::aborted("upload was aborted")),
            Some(true) => Ok(()),
            // The backend stopped listening; its outcome explains why
            Some(false) => Err(self.backend_failure().await),
        }
    }

    async fn outcome(self) -> BurrowResult<u64> {
        let TarballUpload { sender, outcome, .. } = self;
        drop(sender);
        let Some(outcome) = outcome else {
            return Err(already_failed());
        };
        match outcome.await {
            Ok(result) => result,
            Err(_) => Err(backend_dropped()),
        }
    }

    async fn backend_failure(&mut self) -> BurrowError {
        let Some(outcome) = self.outcome.take() else {
            return already_failed();
        };
        match outcome.await {
            Ok(Err(err)) => err,
            Ok(Ok(_)) => BurrowError::Internal {
                message: "storage backend closed the upload early".to_string(),
                source: None,
            },
            Err(_) => backend_dropped(),
        }
    }
}

fn backend_dropped() -> BurrowError {
    BurrowError::Internal {
        message: "storage backend dropped the upload".to_string(),
        source: None,
    }
}

fn already_failed() -> BurrowError {
    BurrowError::Internal {
        message: "upload already failed".to_string(),
        source: None,
    }
}

impl UploadReceiver {
    /// Wait for the next chunk or the end of the upload
    pub async fn recv(&mut self) -> UploadEvent {
        let chunk = tokio::select! {
            biased;
            _ = self.token.cancelled() => return UploadEvent::Aborted,
            chunk = self.receiver.recv() => chunk,
        };

        match chunk {
            Some(Frame::Chunk(chunk)) => {
                self.received += chunk.len() as u64;
                UploadEvent::Chunk(chunk)
            },
            Some(Frame::End) => UploadEvent::Finished,
            None => UploadEvent::Aborted,
        }
    }

    /// Bytes received so far
    pub fn received(&self) -> u64 {
        self.received
    }

    /// Report the final outcome to the writer
    pub fn complete(mut self, result: BurrowResult<u64>) {
        if let Some(outcome) = self.outcome.take() {
            // The writer may already be gone
            let _ = outcome.send(result);
        }
    }

    /// Fail the upload before any bytes are accepted
    pub fn reject(self, error: BurrowError) {
        self.complete(Err(error));
    }
}
