use std::collections::VecDeque;
use std::fmt;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, ReadBuf};

/// One byte source inside a [`ChainedReader`].
pub type ByteSource = Box<dyn AsyncRead + Send + Unpin>;

/// Sequential, non-seekable concatenation of several byte sources.
///
/// Reading drains the sources in order and moves to the next one whenever
/// the current source reports end of stream. The first error returned by a
/// source is surfaced to the caller and the reader stays failed afterwards.
pub struct ChainedReader {
    sources: VecDeque<ByteSource>,
    failed: bool,
}

impl ChainedReader {
    pub fn new() -> Self {
        Self {
            sources: VecDeque::new(),
            failed: false,
        }
    }

    pub fn push(&mut self, source: ByteSource) {
        self.sources.push_back(source);
    }

    pub fn with(mut self, source: ByteSource) -> Self {
        self.push(source);
        self
    }

    /// Number of sources not yet exhausted.
    pub fn remaining_sources(&self) -> usize {
        self.sources.len()
    }
}

impl Default for ChainedReader {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ChainedReader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChainedReader")
            .field("remaining_sources", &self.sources.len())
            .field("failed", &self.failed)
            .finish()
    }
}

impl AsyncRead for ChainedReader {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        if self.failed {
            return Poll::Ready(Err(io::Error::other("chained reader already failed")));
        }
        if buf.remaining() == 0 {
            return Poll::Ready(Ok(()));
        }
        loop {
            let Some(current) = self.sources.front_mut() else {
                return Poll::Ready(Ok(()));
            };
            let before = buf.filled().len();
            match Pin::new(current).poll_read(cx, buf) {
                Poll::Pending => return Poll::Pending,
                Poll::Ready(Err(err)) => {
                    self.failed = true;
                    self.sources.clear();
                    return Poll::Ready(Err(err));
                }
                Poll::Ready(Ok(())) => {
                    if buf.filled().len() == before {
                        self.sources.pop_front();
                        continue;
                    }
                    return Poll::Ready(Ok(()));
                }
            }
        }
    }
}

/// A source that fails on its first read, used when a file could not be opened.
pub(crate) struct FailedSource {
    error: Option<io::Error>,
}

impl FailedSource {
    pub(crate) fn new(error: io::Error) -> Self {
        Self { error: Some(error) }
    }
}

impl AsyncRead for FailedSource {
    fn poll_read(
        mut self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        _buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.error.take() {
            Some(err) => Poll::Ready(Err(err)),
            None => Poll::Ready(Err(io::Error::other("source failed"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use tokio::io::AsyncReadExt;

    use super::*;

    fn bytes(data: &'static [u8]) -> ByteSource {
        Box::new(Cursor::new(data))
    }

    #[tokio::test]
    async fn reads_sources_in_order_and_skips_empty_ones() {
        let mut reader = ChainedReader::new()
            .with(bytes(b"head-"))
            .with(bytes(b""))
            .with(bytes(b"body"))
            .with(bytes(b"-tail"));
        let mut out = Vec::new();
        reader.read_to_end(&mut out).await.unwrap();
        assert_eq!(out, b"head-body-tail");
        assert_eq!(reader.remaining_sources(), 0);
    }

    #[tokio::test]
    async fn first_source_error_is_terminal() {
        let mut reader = ChainedReader::new()
            .with(bytes(b"ok"))
            .with(Box::new(FailedSource::new(io::Error::new(
                io::ErrorKind::NotFound,
                "missing.bin",
            ))))
            .with(bytes(b"never"));
        let mut out = Vec::new();
        let err = reader.read_to_end(&mut out).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
        assert_eq!(out, b"ok");

        let mut more = [0u8; 4];
        assert!(reader.read(&mut more).await.is_err());
    }

    #[tokio::test]
    async fn empty_chain_is_immediately_exhausted() {
        let mut reader = ChainedReader::default();
        let mut out = Vec::new();
        assert_eq!(reader.read_to_end(&mut out).await.unwrap(), 0);
    }
}
