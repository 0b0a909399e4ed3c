/*!
Compression adapters for the file store.

The database file is plain JSON by default. With compression enabled the
whole document is gzip-encoded; reads detect the encoding from the gzip magic
bytes, so a file written in either mode opens regardless of current settings.
*/

use crate::{FolioError, Result};
use flate2::{read::GzDecoder, write::GzEncoder, Compression};
use std::io::{Read, Write};

/// First two bytes of every gzip stream
const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Encoding applied to the serialized store document
pub trait CompressionAdapter: Send + Sync {
    /// Encode the serialized document
    ///
    /// # Arguments
    /// * `data` - Serialized store document
    fn compress(&self, data: &[u8]) -> Result<Vec<u8>>;

    /// Decode bytes previously produced by [`CompressionAdapter::compress`]
    fn decompress(&self, compressed_data: &[u8]) -> Result<Vec<u8>>;

    /// Name shown in logs and `describe()` output
    fn algorithm_name(&self) -> &str;
}

/// Gzip adapter
///
/// # Example
/// ```rust
/// use folio_core::{CompressionAdapter, GzipCompressor};
///
/// let compressor = GzipCompressor::new();
/// let data = br#"{"format_version":1,"tables":{}}"#;
/// let compressed = compressor.compress(data)?;
/// assert_eq!(compressor.decompress(&compressed)?, data.to_vec());
/// # Ok::<(), folio_core::FolioError>(())
/// ```
#[derive(Debug, Clone)]
pub struct GzipCompressor {
    compression_level: Compression,
}

impl GzipCompressor {
    /// Gzip at the default level (6)
    pub fn new() -> Self {
        Self {
            compression_level: Compression::default(),
        }
    }

    /// Gzip at `level` (0-9)
    pub fn with_level(level: u32) -> Self {
        Self {
            compression_level: Compression::new(level.min(9)),
        }
    }
}

impl Default for GzipCompressor {
    fn default() -> Self {
        Self::new()
    }
}

impl CompressionAdapter for GzipCompressor {
    fn compress(&self, data: &[u8]) -> Result<Vec<u8>> {
        let mut encoder = GzEncoder::new(Vec::new(), self.compression_level);

        encoder
            .write_all(data)
            .map_err(|e| FolioError::compression(format!("Failed to gzip store: {e}")))?;

        encoder
            .finish()
            .map_err(|e| FolioError::compression(format!("Failed to finish gzip stream: {e}")))
    }

    fn decompress(&self, compressed_data: &[u8]) -> Result<Vec<u8>> {
        let mut decoder = GzDecoder::new(compressed_data);
        let mut decompressed = Vec::new();

        decoder
            .read_to_end(&mut decompressed)
            .map_err(|e| FolioError::compression(format!("Failed to gunzip store: {e}")))?;

        Ok(decompressed)
    }

    fn algorithm_name(&self) -> &str {
        "gzip"
    }
}

/// Pass-through adapter for plain JSON files
#[derive(Debug, Clone, Default)]
pub struct NoCompression;

impl CompressionAdapter for NoCompression {
    fn compress(&self, data: &[u8]) -> Result<Vec<u8>> {
        Ok(data.to_vec())
    }

    fn decompress(&self, compressed_data: &[u8]) -> Result<Vec<u8>> {
        Ok(compressed_data.to_vec())
    }

    fn algorithm_name(&self) -> &str {
        "none"
    }
}

/// Whether `data` starts with the gzip magic bytes
pub fn is_gzip(data: &[u8]) -> bool {
    data.starts_with(&GZIP_MAGIC)
}

/// Decode `data` with whichever adapter produced it
pub fn decode_any(data: &[u8]) -> Result<Vec<u8>> {
    if is_gzip(data) {
        GzipCompressor::new().decompress(data)
    } else {
        NoCompression.decompress(data)
    }
}
