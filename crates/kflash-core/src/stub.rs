//! Flash stub image
//!
//! The stub is shipped zlib-compressed and inflated once before a session
//! starts. Its contents are opaque to this crate.

use crate::protocol::ProtocolError;

/// A decompressed stub loader ready for upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StubImage {
    data: Vec<u8>,
}

impl StubImage {
    /// Inflate a zlib-compressed stub
    pub fn from_compressed(compressed: &[u8]) -> Result<Self, ProtocolError> {
        let data = miniz_oxide::inflate::decompress_to_vec_zlib(compressed)
            .map_err(|e| ProtocolError::InvalidStub(format!("failed to inflate: {e}")))?;
        tracing::debug!(
            compressed = compressed.len(),
            inflated = data.len(),
            "stub image inflated"
        );
        Self::from_raw(data)
    }

    /// Use an already inflated stub
    pub fn from_raw(data: Vec<u8>) -> Result<Self, ProtocolError> {
        if data.is_empty() {
            return Err(ProtocolError::InvalidStub("image is empty".to_string()));
        }
        Ok(Self { data })
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_compressed() {
        let raw: Vec<u8> = (0..4096u32).map(|i| (i % 251) as u8).collect();
        let compressed = miniz_oxide::deflate::compress_to_vec_zlib(&raw, 6);
        let stub = StubImage::from_compressed(&compressed).unwrap();
        assert_eq!(stub.as_bytes(), &raw[..]);
        assert_eq!(stub.len(), 4096);
    }

    #[test]
    fn test_garbage_is_rejected() {
        let err = StubImage::from_compressed(&[0x00, 0x01, 0x02, 0x03]).unwrap_err();
        assert!(matches!(err, ProtocolError::InvalidStub(_)));
    }

    #[test]
    fn test_empty_is_rejected() {
        assert!(StubImage::from_raw(Vec::new()).is_err());
        let compressed = miniz_oxide::deflate::compress_to_vec_zlib(&[], 6);
        assert!(StubImage::from_compressed(&compressed).is_err());
    }
}
