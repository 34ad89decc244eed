use async_trait::async_trait;

use crate::decoding::domain::raw_file::RawFile;

/// A [`RawFile`] over bytes already in memory, e.g. an upload body.
#[derive(Clone, Debug)]
pub struct MemoryFile {
    name: String,
    bytes: Vec<u8>,
    mime_hint: Option<String>,
}

impl MemoryFile {
    pub fn new(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            bytes,
            mime_hint: None,
        }
    }

    pub fn with_mime_hint(mut self, mime: impl Into<String>) -> Self {
        self.mime_hint = Some(mime.into());
        self
    }
}

#[async_trait]
impl RawFile for MemoryFile {
    fn byte_len(&self) -> Option<u64> {
        Some(self.bytes.len() as u64)
    }

    fn mime_hint(&self) -> Option<&str> {
        self.mime_hint.as_deref()
    }

    fn describe(&self) -> String {
        self.name.clone()
    }

    async fn read_all(&self) -> std::io::Result<Vec<u8>> {
        Ok(self.bytes.clone())
    }
}
