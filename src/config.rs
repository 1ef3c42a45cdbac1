//! Write configuration

use crate::layout::ChunkShape;
use serde::{Deserialize, Serialize};

/// Gzip level used for new pixel data blocks.
pub const DEFAULT_COMPRESSION_LEVEL: u8 = 2;

/// Largest color table, in bytes of encoded text, stored inline as an attribute.
/// Larger tables go into a `ColorTable` dataset.
pub const INLINE_ATTRIBUTE_LIMIT: usize = 64 * 1024;

/// Application name recorded in new containers.
pub const DEFAULT_CREATOR: &str = "ims-io";

/// Options for creating a container from a volume
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WriteOptions {
    /// Gzip level, 0 to 9
    pub compression_level: u8,

    /// Fixed chunk shape (z, y, x); chosen from the pixel type and volume depth when unset
    pub chunk_shape: Option<ChunkShape>,

    /// Value of the `Creator` attribute
    pub creator: String,
}

impl WriteOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_compression_level(mut self, level: u8) -> Self {
        self.compression_level = level.min(9);
        self
    }

    pub fn with_chunk_shape(mut self, chunk_shape: ChunkShape) -> Self {
        self.chunk_shape = Some(chunk_shape);
        self
    }

    pub fn with_creator(mut self, creator: impl Into<String>) -> Self {
        self.creator = creator.into();
        self
    }
}

impl Default for WriteOptions {
    fn default() -> Self {
        Self {
            compression_level: DEFAULT_COMPRESSION_LEVEL,
            chunk_shape: None,
            creator: DEFAULT_CREATOR.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = WriteOptions::default();
        assert_eq!(options.compression_level, 2);
        assert!(options.chunk_shape.is_none());
        assert_eq!(options.creator, "ims-io");
    }

    #[test]
    fn test_builder() {
        let options = WriteOptions::new()
            .with_compression_level(12)
            .with_chunk_shape(ChunkShape::new([1, 64, 64]))
            .with_creator("pipeline");
        assert_eq!(options.compression_level, 9);
        assert_eq!(options.chunk_shape.map(|c| c.dims()), Some([1, 64, 64]));
        assert_eq!(options.creator, "pipeline");
    }
}
