//! Splits a byte stream into upload parts

use std::io;

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::warn;

/// Reads fixed-size parts from a source.
///
/// A single `read` may return fewer bytes than requested, so each part is
/// accumulated until it is full or the source ends.
pub struct PartReader<R> {
    source: R,
    part_size: usize,
    /// Bytes still owed by a sized source; `None` reads to EOF
    remaining: Option<u64>,
    bytes_read: u64,
    exhausted: bool,
}

impl<R: AsyncRead + Unpin> PartReader<R> {
    /// Reader for a source whose total length is declared up front
    pub fn sized(source: R, part_size: usize, declared_size: u64) -> Self {
        PartReader {
            source,
            part_size,
            remaining: Some(declared_size),
            bytes_read: 0,
            exhausted: false,
        }
    }

    /// Reader for a source read until EOF
    pub fn unbounded(source: R, part_size: usize) -> Self {
        PartReader {
            source,
            part_size,
            remaining: None,
            bytes_read: 0,
            exhausted: false,
        }
    }

    /// Total bytes handed out so far
    pub fn bytes_read(&self) -> u64 {
        self.bytes_read
    }

    /// Read the next part. `Ok(None)` once the source is done.
    pub async fn next_part(&mut self) -> io::Result<Option<Bytes>> {
        if self.exhausted {
            return Ok(None);
        }

        let want = match self.remaining {
            Some(0) => {
                self.exhausted = true;
                return Ok(None);
            }
            Some(remaining) => remaining.min(self.part_size as u64) as usize,
            None => self.part_size,
        };

        let buf = self.fill(want).await?;
        let got = buf.len();
        self.bytes_read += got as u64;

        match self.remaining.as_mut() {
            None => {
                if got < want {
                    self.exhausted = true;
                }
                if got == 0 {
                    return Ok(None);
                }
            }
            Some(remaining) => {
                let expected_final = *remaining <= self.part_size as u64;
                *remaining -= got as u64;
                if got < want {
                    self.exhausted = true;
                    // A short non-final part would be rejected by the store
                    // anyway, and an empty one means the source ran dry.
                    if got == 0 || !expected_final {
                        return Err(io::Error::new(
                            io::ErrorKind::UnexpectedEof,
                            format!(
                                "source ended after {} bytes, {} more were declared",
                                self.bytes_read, remaining
                            ),
                        ));
                    }
                    warn!(
                        bytes_read = self.bytes_read,
                        missing = *remaining,
                        "Source ended before declared size, uploading short final part"
                    );
                }
            }
        }

        Ok(Some(buf.freeze()))
    }

    async fn fill(&mut self, want: usize) -> io::Result<BytesMut> {
        let mut buf = BytesMut::with_capacity(want);
        while buf.len() < want {
            let mut limited = (&mut self.source).take((want - buf.len()) as u64);
            let n = limited.read_buf(&mut buf).await?;
            if n == 0 {
                break;
            }
        }
        Ok(buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::TrickleReader;

    async fn collect<R: AsyncRead + Unpin>(mut reader: PartReader<R>) -> io::Result<Vec<usize>> {
        let mut sizes = Vec::new();
        while let Some(part) = reader.next_part().await? {
            sizes.push(part.len());
        }
        Ok(sizes)
    }

    #[tokio::test]
    async fn test_unbounded_parts() {
        let data = vec![7u8; 25];
        let sizes = collect(PartReader::unbounded(&data[..], 10)).await.unwrap();
        assert_eq!(sizes, vec![10, 10, 5]);
    }

    #[tokio::test]
    async fn test_exact_multiple_has_no_trailing_part() {
        let data = vec![7u8; 30];
        let sizes = collect(PartReader::unbounded(&data[..], 10)).await.unwrap();
        assert_eq!(sizes, vec![10, 10, 10]);

        let sizes = collect(PartReader::sized(&data[..], 10, 30)).await.unwrap();
        assert_eq!(sizes, vec![10, 10, 10]);
    }

    #[tokio::test]
    async fn test_short_reads_are_accumulated() {
        let data: Vec<u8> = (0..=255u8).cycle().take(1000).collect();
        let source = TrickleReader::new(data.clone(), 7);

        let mut reader = PartReader::sized(source, 300, 1000);
        let mut reassembled = Vec::new();
        let mut sizes = Vec::new();
        while let Some(part) = reader.next_part().await.unwrap() {
            sizes.push(part.len());
            reassembled.extend_from_slice(&part);
        }

        assert_eq!(sizes, vec![300, 300, 300, 100]);
        assert_eq!(reassembled, data);
        assert_eq!(reader.bytes_read(), 1000);
    }

    #[tokio::test]
    async fn test_sized_ignores_trailing_bytes() {
        let data = vec![1u8; 50];
        let sizes = collect(PartReader::sized(&data[..], 10, 25)).await.unwrap();
        assert_eq!(sizes, vec![10, 10, 5]);
    }

    #[tokio::test]
    async fn test_truncated_source_fails_mid_partition() {
        let data = vec![1u8; 15];
        let err = collect(PartReader::sized(&data[..], 10, 40)).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[tokio::test]
    async fn test_short_final_part_is_uploaded_as_read() {
        // Declared 25, delivered 23: the last part comes up short
        let data = vec![1u8; 23];
        let sizes = collect(PartReader::sized(&data[..], 10, 25)).await.unwrap();
        assert_eq!(sizes, vec![10, 10, 3]);
    }

    #[tokio::test]
    async fn test_short_part_before_final_fails() {
        // Declared 25, delivered 18: part 2 of 3 ends short
        let data = vec![1u8; 18];
        let err = collect(PartReader::sized(&data[..], 10, 25)).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[tokio::test]
    async fn test_empty_sources() {
        let empty: &[u8] = &[];
        assert!(collect(PartReader::unbounded(empty, 10)).await.unwrap().is_empty());
        assert!(collect(PartReader::sized(empty, 10, 0)).await.unwrap().is_empty());
        assert!(collect(PartReader::sized(empty, 10, 5)).await.is_err());
    }
}
