//! Byte sources with awkward read behaviour, for tests and benches

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, ReadBuf};

/// Hands out at most `chunk` bytes per read, like a slow network body
pub struct TrickleReader {
    data: Vec<u8>,
    pos: usize,
    chunk: usize,
}

impl TrickleReader {
    pub fn new(data: Vec<u8>, chunk: usize) -> Self {
        TrickleReader {
            data,
            pos: 0,
            chunk: chunk.max(1),
        }
    }
}

impl AsyncRead for TrickleReader {
    fn poll_read(
        mut self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let n = self
            .chunk
            .min(buf.remaining())
            .min(self.data.len() - self.pos);
        let start = self.pos;
        buf.put_slice(&self.data[start..start + n]);
        self.pos += n;
        Poll::Ready(Ok(()))
    }
}

/// Yields `ok_bytes` bytes, then fails every read
pub struct FailingReader {
    ok_bytes: usize,
    served: usize,
}

impl FailingReader {
    pub fn new(ok_bytes: usize) -> Self {
        FailingReader {
            ok_bytes,
            served: 0,
        }
    }
}

impl AsyncRead for FailingReader {
    fn poll_read(
        mut self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        if self.served >= self.ok_bytes {
            return Poll::Ready(Err(io::Error::new(
                io::ErrorKind::ConnectionReset,
                "source connection reset",
            )));
        }
        let n = (self.ok_bytes - self.served).min(buf.remaining());
        buf.put_slice(&vec![0xAB; n]);
        self.served += n;
        Poll::Ready(Ok(()))
    }
}
