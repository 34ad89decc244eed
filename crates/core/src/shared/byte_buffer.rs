use std::ops::Deref;
use std::sync::Arc;

/// Immutable snapshot of a file's bytes.
///
/// Cloning is cheap (shared ownership), so the buffer can be handed to a
/// blocking task without copying the image data.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ByteBuffer {
    bytes: Arc<[u8]>,
}

impl ByteBuffer {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self {
            bytes: Arc::from(bytes),
        }
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl Deref for ByteBuffer {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.bytes
    }
}

impl From<Vec<u8>> for ByteBuffer {
    fn from(bytes: Vec<u8>) -> Self {
        Self::new(bytes)
    }
}
