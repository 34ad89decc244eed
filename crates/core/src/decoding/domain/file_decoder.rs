use thiserror::Error;

use crate::decoding::domain::raw_file::RawFile;
use crate::shared::byte_buffer::ByteBuffer;

#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("failed to read file: {0}")]
    Read(#[source] std::io::Error),
    #[error("file is empty")]
    Empty,
    #[error("read ended early: expected {expected} bytes, got {actual}")]
    Truncated { expected: u64, actual: u64 },
}

/// Reads a [`RawFile`] into an immutable [`ByteBuffer`].
#[derive(Clone, Copy, Debug, Default)]
pub struct FileDecoder;

impl FileDecoder {
    pub fn new() -> Self {
        Self
    }

    /// Suspends until the read completes. A zero-byte file, or one whose read
    /// delivers fewer bytes than it advertised, is a decode failure.
    pub async fn decode(&self, file: &dyn RawFile) -> Result<ByteBuffer, DecodeError> {
        let bytes = file.read_all().await.map_err(DecodeError::Read)?;
        let actual = bytes.len() as u64;

        if let Some(expected) = file.byte_len() {
            if actual < expected {
                return Err(DecodeError::Truncated { expected, actual });
            }
        }
        if bytes.is_empty() {
            return Err(DecodeError::Empty);
        }

        log::debug!(
            "Decoded {} ({actual} bytes, mime hint {:?})",
            file.describe(),
            file.mime_hint()
        );
        Ok(ByteBuffer::new(bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::io;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct StubFile {
        result: fn() -> io::Result<Vec<u8>>,
        advertised: Option<u64>,
        reads: AtomicUsize,
    }

    impl StubFile {
        fn new(result: fn() -> io::Result<Vec<u8>>, advertised: Option<u64>) -> Self {
            Self {
                result,
                advertised,
                reads: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl RawFile for StubFile {
        fn byte_len(&self) -> Option<u64> {
            self.advertised
        }

        fn mime_hint(&self) -> Option<&str> {
            None
        }

        fn describe(&self) -> String {
            "stub".into()
        }

        async fn read_all(&self) -> io::Result<Vec<u8>> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            (self.result)()
        }
    }

    #[tokio::test]
    async fn test_decodes_full_content() {
        let file = StubFile::new(|| Ok(vec![1, 2, 3, 4]), Some(4));
        let buf = FileDecoder::new().decode(&file).await.unwrap();
        assert_eq!(buf.as_slice(), &[1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn test_reads_exactly_once() {
        let file = StubFile::new(|| Ok(vec![9; 8]), None);
        FileDecoder::new().decode(&file).await.unwrap();
        assert_eq!(file.reads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_io_failure_is_read_error() {
        let file = StubFile::new(
            || Err(io::Error::new(io::ErrorKind::PermissionDenied, "denied")),
            None,
        );
        let err = FileDecoder::new().decode(&file).await.unwrap_err();
        assert!(matches!(err, DecodeError::Read(e) if e.kind() == io::ErrorKind::PermissionDenied));
    }

    #[tokio::test]
    async fn test_zero_bytes_is_empty_error() {
        let file = StubFile::new(|| Ok(Vec::new()), Some(0));
        let err = FileDecoder::new().decode(&file).await.unwrap_err();
        assert!(matches!(err, DecodeError::Empty));
    }

    #[tokio::test]
    async fn test_short_read_is_truncated() {
        let file = StubFile::new(|| Ok(vec![0; 10]), Some(100));
        let err = FileDecoder::new().decode(&file).await.unwrap_err();
        assert!(matches!(
            err,
            DecodeError::Truncated {
                expected: 100,
                actual: 10
            }
        ));
    }

    #[tokio::test]
    async fn test_unknown_length_is_accepted() {
        let file = StubFile::new(|| Ok(vec![5; 3]), None);
        assert_eq!(FileDecoder::new().decode(&file).await.unwrap().len(), 3);
    }
}
