//! Cache payload serialization

use zen_core::{AssetContent, AssetRecord};

use crate::error::Result;

/// Translates cached values to and from payload bytes
pub trait Serializer: Send + Sync + std::fmt::Debug {
    /// MIME-style tag of the payload
    fn content_type(&self) -> &str;

    fn serialize(&self, content: &AssetContent) -> Result<Vec<u8>>;

    /// Rebuild content from payload bytes; metadata comes from the cache index
    fn deserialize(&self, bytes: Vec<u8>, metadata: Option<AssetRecord>) -> Result<AssetContent>;
}

/// Text artifacts are stored as-is
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentitySerializer;

impl Serializer for IdentitySerializer {
    fn content_type(&self) -> &str {
        "text/plain"
    }

    fn serialize(&self, content: &AssetContent) -> Result<Vec<u8>> {
        Ok(content.content.clone())
    }

    fn deserialize(&self, bytes: Vec<u8>, metadata: Option<AssetRecord>) -> Result<AssetContent> {
        Ok(AssetContent::new(bytes, metadata))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_preserves_bytes_and_metadata() {
        let record = AssetRecord::new("x", "t/x.md");
        let original = AssetContent::new(b"line\r\n\xff".to_vec(), Some(record.clone()));

        let bytes = IdentitySerializer.serialize(&original).unwrap();
        let restored = IdentitySerializer
            .deserialize(bytes, Some(record))
            .unwrap();

        assert_eq!(restored.content, original.content);
        assert_eq!(restored.checksum, original.checksum);
        assert_eq!(restored.metadata, original.metadata);
        assert_eq!(IdentitySerializer.content_type(), "text/plain");
    }
}
