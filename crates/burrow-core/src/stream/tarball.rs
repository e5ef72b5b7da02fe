//! Read side of a tarball transfer.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::{Bytes, BytesMut};
use futures::future::BoxFuture;
use futures::{Stream, StreamExt};
use tokio_util::sync::{CancellationToken, WaitForCancellationFutureOwned};
use tracing::{debug, warn};

use super::{AbortHandle, ByteStream, TarballUpload};
use crate::error::{BurrowError, BurrowResult};

/// Chunk size used when streaming an in-memory blob
pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

/// Lifecycle of one transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferState {
    Opening,
    Transferring,
    Completed,
    Aborted,
    Errored,
}

/// What an opening transfer resolves to once headers are known
pub struct Opened {
    /// Declared length of the payload, if the source announced one
    pub content_length: Option<u64>,
    pub body: ByteStream,
}

enum Inner {
    Opening(BoxFuture<'static, BurrowResult<Opened>>),
    Transferring(ByteStream),
    Finished,
}

/// A cancellable stream of tarball bytes with a completion result.
///
/// Yields `Ok(chunk)` items while transferring. A failure is delivered as a
/// single `Err` item after which the stream ends. When a length was
/// declared, the observed byte count is checked after the source ends and a
/// mismatch is reported as a final `ContentMismatch` item; by then every
/// chunk has already been handed to the consumer.
pub struct TarballStream {
    inner: Inner,
    state: TransferState,
    expected_length: Option<u64>,
    observed_length: u64,
    token: CancellationToken,
    cancelled: Pin<Box<WaitForCancellationFutureOwned>>,
}

impl TarballStream {
    /// A transfer that still has to connect; `open` resolves to the body
    pub fn opening<F>(open: F, token: CancellationToken) -> Self
    where
        F: Future<Output = BurrowResult<Opened>> + Send + 'static,
    {
        Self::with_inner(Inner::Opening(Box::pin(open)), TransferState::Opening, None, token)
    }

    /// A transfer whose body is already available
    pub fn from_stream(body: ByteStream, content_length: Option<u64>, token: CancellationToken) -> Self {
        Self::with_inner(
            Inner::Transferring(body),
            TransferState::Transferring,
            content_length,
            token,
        )
    }

    /// Stream an in-memory blob in `chunk_size` pieces
    pub fn from_bytes(data: Bytes, chunk_size: usize, token: CancellationToken) -> Self {
        let length = data.len() as u64;
        let chunk_size = chunk_size.max(1);
        let body = futures::stream::unfold(data, move |mut rest| async move {
            if rest.is_empty() {
                None
            } else {
                let chunk = rest.split_to(chunk_size.min(rest.len()));
                Some((Ok(chunk), rest))
            }
        });
        Self::from_stream(Box::pin(body), Some(length), token)
    }

    /// A transfer that fails with `error` on first poll
    pub fn failed(error: BurrowError) -> Self {
        Self::opening(async move { Err(error) }, CancellationToken::new())
    }

    fn with_inner(
        inner: Inner,
        state: TransferState,
        expected_length: Option<u64>,
        token: CancellationToken,
    ) -> Self {
        let cancelled = Box::pin(token.clone().cancelled_owned());
        Self {
            inner,
            state,
            expected_length,
            observed_length: 0,
            token,
            cancelled,
        }
    }

    pub fn state(&self) -> TransferState {
        self.state
    }

    /// Declared payload length, known once the transfer is open
    pub fn expected_length(&self) -> Option<u64> {
        self.expected_length
    }

    /// Bytes handed to the consumer so far
    pub fn observed_length(&self) -> u64 {
        self.observed_length
    }

    pub fn abort_handle(&self) -> AbortHandle {
        AbortHandle::new(self.token.clone())
    }

    /// Abort the transfer; the next poll yields `Aborted`
    pub fn abort(&self) {
        self.token.cancel();
    }

    /// Drive the transfer until its headers are known and report the
    /// declared length. Does not consume any payload bytes.
    pub async fn open(&mut self) -> BurrowResult<Option<u64>> {
        futures::future::poll_fn(|cx| self.poll_open(cx)).await
    }

    /// Read the whole payload into memory
    pub async fn into_bytes(mut self) -> BurrowResult<Bytes> {
        let mut buffer = BytesMut::new();
        while let Some(chunk) = self.next().await {
            buffer.extend_from_slice(&chunk?);
        }
        Ok(buffer.freeze())
    }

    /// Copy this transfer into a storage upload chunk by chunk.
    ///
    /// A failing or aborted source aborts the upload so the backend drops
    /// the partial blob; a failing upload aborts the source.
    pub async fn pipe_to(mut self, mut upload: TarballUpload) -> BurrowResult<u64> {
        while let Some(chunk) = self.next().await {
            match chunk {
                Ok(chunk) => {
                    if let Err(err) = upload.write(chunk).await {
                        self.abort();
                        return Err(err);
                    }
                },
                Err(err) => {
                    let _ = upload.abort().await;
                    return Err(err);
                },
            }
        }
        upload.done().await
    }

    fn poll_cancelled(&mut self, cx: &mut Context<'_>) -> bool {
        if self.cancelled.as_mut().poll(cx).is_ready() {
            debug!(observed = self.observed_length, "tarball transfer aborted");
            self.inner = Inner::Finished;
            self.state = TransferState::Aborted;
            return true;
        }
        false
    }

    fn poll_open(&mut self, cx: &mut Context<'_>) -> Poll<BurrowResult<Option<u64>>> {
        match self.state {
            TransferState::Opening => {},
            TransferState::Transferring | TransferState::Completed => {
                return Poll::Ready(Ok(self.expected_length));
            },
            TransferState::Aborted => {
                return Poll::Ready(Err(BurrowError::aborted("transfer was aborted")));
            },
            TransferState::Errored => {
                return Poll::Ready(Err(BurrowError::Internal {
                    message: "transfer already failed".to_string(),
                    source: None,
                }));
            },
        }

        if self.poll_cancelled(cx) {
            return Poll::Ready(Err(BurrowError::aborted("transfer aborted while opening")));
        }

        let Inner::Opening(open) = &mut self.inner else {
            return Poll::Ready(Ok(self.expected_length));
        };

        match open.as_mut().poll(cx) {
            Poll::Pending => Poll::Pending,
            Poll::Ready(Ok(opened)) => {
                self.expected_length = opened.content_length;
                self.inner = Inner::Transferring(opened.body);
                self.state = TransferState::Transferring;
                Poll::Ready(Ok(self.expected_length))
            },
            Poll::Ready(Err(err)) => {
                self.inner = Inner::Finished;
                self.state = TransferState::Errored;
                Poll::Ready(Err(err))
            },
        }
    }
}

impl Stream for TarballStream {
    type Item = BurrowResult<Bytes>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();

        if matches!(this.inner, Inner::Finished) {
            return Poll::Ready(None);
        }

        if this.poll_cancelled(cx) {
            return Poll::Ready(Some(Err(BurrowError::aborted("tarball transfer aborted"))));
        }

        if matches!(this.inner, Inner::Opening(_)) {
            match this.poll_open(cx) {
                Poll::Pending => return Poll::Pending,
                Poll::Ready(Err(err)) => return Poll::Ready(Some(Err(err))),
                Poll::Ready(Ok(_)) => {},
            }
        }

        let Inner::Transferring(body) = &mut this.inner else {
            return Poll::Ready(None);
        };

        match body.as_mut().poll_next(cx) {
            Poll::Pending => Poll::Pending,
            Poll::Ready(Some(Ok(chunk))) => {
                this.observed_length += chunk.len() as u64;
                Poll::Ready(Some(Ok(chunk)))
            },
            Poll::Ready(Some(Err(err))) => {
                this.inner = Inner::Finished;
                this.state = TransferState::Errored;
                Poll::Ready(Some(Err(err)))
            },
            Poll::Ready(None) => {
                this.inner = Inner::Finished;
                match this.expected_length {
                    Some(expected) if expected != this.observed_length => {
                        warn!(
                            expected,
                            observed = this.observed_length,
                            "tarball length does not match the declared length"
                        );
                        this.state = TransferState::Errored;
                        Poll::Ready(Some(Err(BurrowError::ContentMismatch {
                            expected,
                            actual: this.observed_length,
                        })))
                    },
                    _ => {
                        this.state = TransferState::Completed;
                        Poll::Ready(None)
                    },
                }
            },
        }
    }
}

impl fmt::Debug for TarballStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TarballStream")
            .field("state", &self.state)
            .field("expected_length", &self.expected_length)
            .field("observed_length", &self.observed_length)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::UploadEvent;

    fn chunks(parts: &[&'static [u8]]) -> ByteStream {
        let items: Vec<BurrowResult<Bytes>> = parts.iter().map(|p| Ok(Bytes::from_static(p))).collect();
        Box::pin(futures::stream::iter(items))
    }

    #[tokio::test]
    async fn test_complete_transfer() {
        let mut stream = TarballStream::from_stream(chunks(&[b"abc", b"def"]), Some(6), CancellationToken::new());
        assert_eq!(stream.open().await.unwrap(), Some(6));

        let mut received = Vec::new();
        while let Some(chunk) = stream.next().await {
            received.extend_from_slice(&chunk.unwrap());
        }

        assert_eq!(received, b"abcdef");
        assert_eq!(stream.observed_length(), 6);
        assert_eq!(stream.state(), TransferState::Completed);
    }

    #[tokio::test]
    async fn test_length_mismatch_reported_after_bytes_delivered() {
        let mut stream = TarballStream::from_stream(chunks(&[b"abc", b"de"]), Some(10), CancellationToken::new());

        let first = stream.next().await.unwrap().unwrap();
        let second = stream.next().await.unwrap().unwrap();
        assert_eq!(first.len() + second.len(), 5);

        match stream.next().await {
            Some(Err(BurrowError::ContentMismatch { expected, actual })) => {
                assert_eq!(expected, 10);
                assert_eq!(actual, 5);
            },
            other => panic!("Expected ContentMismatch, got {:?}", other),
        }
        assert!(stream.next().await.is_none());
        assert_eq!(stream.state(), TransferState::Errored);
    }

    #[tokio::test]
    async fn test_unknown_length_is_not_validated() {
        let stream = TarballStream::from_stream(chunks(&[b"abc"]), None, CancellationToken::new());
        assert_eq!(stream.into_bytes().await.unwrap(), Bytes::from_static(b"abc"));
    }

    #[tokio::test]
    async fn test_opening_failure_delivered_once() {
        let mut stream = TarballStream::failed(BurrowError::NotFound {
            resource: "pkg-1.0.0.tgz".to_string(),
        });
        assert_eq!(stream.state(), TransferState::Opening);

        match stream.next().await {
            Some(Err(BurrowError::NotFound { .. })) => {},
            other => panic!("Expected NotFound, got {:?}", other),
        }
        assert!(stream.next().await.is_none());
        assert_eq!(stream.state(), TransferState::Errored);
    }

    #[tokio::test]
    async fn test_open_reports_length_before_payload() {
        let token = CancellationToken::new();
        let mut stream = TarballStream::opening(
            async {
                Ok(Opened {
                    content_length: Some(3),
                    body: chunks(&[b"xyz"]),
                })
            },
            token,
        );

        assert_eq!(stream.open().await.unwrap(), Some(3));
        assert_eq!(stream.state(), TransferState::Transferring);
        assert_eq!(stream.observed_length(), 0);
        assert_eq!(stream.into_bytes().await.unwrap(), Bytes::from_static(b"xyz"));
    }

    #[tokio::test]
    async fn test_abort_mid_transfer() {
        let body = futures::stream::iter(vec![Ok(Bytes::from_static(b"first"))])
            .chain(futures::stream::pending());
        let mut stream = TarballStream::from_stream(Box::pin(body), None, CancellationToken::new());
        let handle = stream.abort_handle();

        assert!(stream.next().await.unwrap().is_ok());

        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
            handle.abort();
        });

        match stream.next().await {
            Some(Err(BurrowError::Aborted { .. })) => {},
            other => panic!("Expected Aborted, got {:?}", other),
        }
        assert_eq!(stream.state(), TransferState::Aborted);
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn test_from_bytes_chunks_lazily() {
        let data = Bytes::from(vec![7u8; 10]);
        let mut stream = TarballStream::from_bytes(data, 4, CancellationToken::new());

        let mut sizes = Vec::new();
        while let Some(chunk) = stream.next().await {
            sizes.push(chunk.unwrap().len());
        }
        assert_eq!(sizes, vec![4, 4, 2]);
        assert_eq!(stream.state(), TransferState::Completed);
    }

    #[tokio::test]
    async fn test_pipe_to_upload() {
        let (upload, mut receiver) = TarballUpload::channel(2);
        let backend = tokio::spawn(async move {
            let mut stored = Vec::new();
            loop {
                match receiver.recv().await {
                    UploadEvent::Chunk(chunk) => stored.extend_from_slice(&chunk),
                    UploadEvent::Finished => {
                        let len = stored.len() as u64;
                        receiver.complete(Ok(len));
                        return stored;
                    },
                    UploadEvent::Aborted => {
                        receiver.complete(Err(BurrowError::aborted("aborted")));
                        return Vec::new();
                    },
                }
            }
        });

        let stream = TarballStream::from_bytes(Bytes::from_static(b"package bytes"), 3, CancellationToken::new());
        assert_eq!(stream.pipe_to(upload).await.unwrap(), 13);
        assert_eq!(backend.await.unwrap(), b"package bytes");
    }

    #[tokio::test]
    async fn test_pipe_aborts_upload_on_mismatch() {
        let (upload, mut receiver) = TarballUpload::channel(2);
        let backend = tokio::spawn(async move {
            loop {
                match receiver.recv().await {
                    UploadEvent::Chunk(_) => {},
                    UploadEvent::Finished => {
                        receiver.complete(Ok(0));
                        return false;
                    },
                    UploadEvent::Aborted => {
                        receiver.complete(Err(BurrowError::aborted("aborted")));
                        return true;
                    },
                }
            }
        });

        let stream = TarballStream::from_stream(chunks(&[b"short"]), Some(100), CancellationToken::new());
        match stream.pipe_to(upload).await {
            Err(BurrowError::ContentMismatch { .. }) => {},
            other => panic!("Expected ContentMismatch, got {:?}", other),
        }
        assert!(backend.await.unwrap(), "backend should observe the abort");
    }
}
