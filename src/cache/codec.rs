//! Entry serialization and compression
//!
//! Persisted entries are JSON documents passed through a named, pluggable
//! [`Compressor`]. Anything that fails to decode is reported as
//! [`CodecError::Corrupt`], which the warm tier treats as permanent data
//! loss rather than a storage fault.

use crate::cache::entry::{CacheEntry, CacheMetadata};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use std::io::{self, Read, Write};
use std::sync::Arc;

/// Version stamped into every entry file
pub const ENTRY_FORMAT_VERSION: u32 = 1;

/// Errors produced while encoding or decoding entry files
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// The payload could not be serialized
    #[error("Failed to encode entry: {0}")]
    Encode(String),

    /// The bytes do not form a valid entry
    #[error("Corrupt entry data: {0}")]
    Corrupt(String),
}

/// A named compression step applied after serialization
pub trait Compressor: Send + Sync + Debug {
    /// Stable name for logs and configuration
    fn name(&self) -> &'static str;

    fn compress(&self, data: &[u8]) -> io::Result<Vec<u8>>;

    fn decompress(&self, data: &[u8]) -> io::Result<Vec<u8>>;
}

/// Pass-through compressor
#[derive(Debug, Default, Clone, Copy)]
pub struct NoCompression;

impl Compressor for NoCompression {
    fn name(&self) -> &'static str {
        "none"
    }

    fn compress(&self, data: &[u8]) -> io::Result<Vec<u8>> {
        Ok(data.to_vec())
    }

    fn decompress(&self, data: &[u8]) -> io::Result<Vec<u8>> {
        Ok(data.to_vec())
    }
}

/// Gzip compressor backed by flate2
#[derive(Debug, Clone, Copy)]
pub struct GzipCompression {
    level: u32,
}

impl Default for GzipCompression {
    fn default() -> Self {
        Self { level: 6 }
    }
}

impl GzipCompression {
    /// Compression level 0-9
    pub fn with_level(level: u32) -> Self {
        Self { level: level.min(9) }
    }
}

impl Compressor for GzipCompression {
    fn name(&self) -> &'static str {
        "gzip"
    }

    fn compress(&self, data: &[u8]) -> io::Result<Vec<u8>> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::new(self.level));
        encoder.write_all(data)?;
        encoder.finish()
    }

    fn decompress(&self, data: &[u8]) -> io::Result<Vec<u8>> {
        let mut decoder = GzDecoder::new(data);
        let mut out = Vec::new();
        decoder.read_to_end(&mut out)?;
        Ok(out)
    }
}

/// Compression selected through configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompressionKind {
    None,
    #[default]
    Gzip,
}

impl CompressionKind {
    /// Build the compressor for this setting
    pub fn compressor(&self) -> Arc<dyn Compressor> {
        match self {
            CompressionKind::None => Arc::new(NoCompression),
            CompressionKind::Gzip => Arc::new(GzipCompression::default()),
        }
    }
}

impl std::str::FromStr for CompressionKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "none" => Ok(CompressionKind::None),
            "gzip" => Ok(CompressionKind::Gzip),
            other => Err(format!("unknown compression '{}'", other)),
        }
    }
}

#[derive(Serialize)]
struct EnvelopeRef<'a, V> {
    format_version: u32,
    key: &'a str,
    metadata: &'a CacheMetadata,
    payload: &'a V,
}

#[derive(Deserialize)]
struct Envelope<V> {
    format_version: u32,
    key: String,
    metadata: CacheMetadata,
    payload: V,
}

/// Entry file contents without the payload
#[derive(Debug, Clone, Deserialize)]
pub struct EntryHeader {
    pub format_version: u32,
    pub key: String,
    pub metadata: CacheMetadata,
}

/// Serializer plus compressor for entry files
#[derive(Debug, Clone)]
pub struct EntryCodec {
    compressor: Arc<dyn Compressor>,
}

impl Default for EntryCodec {
    fn default() -> Self {
        Self::new(Arc::new(NoCompression))
    }
}

impl EntryCodec {
    pub fn new(compressor: Arc<dyn Compressor>) -> Self {
        Self { compressor }
    }

    pub fn compressor_name(&self) -> &'static str {
        self.compressor.name()
    }

    /// Approximate serialized size of a payload, used for capacity accounting
    pub fn payload_size<V: Serialize>(&self, payload: &V) -> Result<usize, CodecError> {
        serde_json::to_vec(payload)
            .map(|bytes| bytes.len())
            .map_err(|e| CodecError::Encode(e.to_string()))
    }

    /// Serialize and compress an entry
    pub fn encode<V: Serialize>(&self, entry: &CacheEntry<V>) -> Result<Vec<u8>, CodecError> {
        let envelope = EnvelopeRef {
            format_version: ENTRY_FORMAT_VERSION,
            key: &entry.key,
            metadata: &entry.metadata,
            payload: &entry.payload,
        };
        let json = serde_json::to_vec(&envelope).map_err(|e| CodecError::Encode(e.to_string()))?;
        self.compressor
            .compress(&json)
            .map_err(|e| CodecError::Encode(e.to_string()))
    }

    /// Decompress and deserialize an entry
    pub fn decode<V: DeserializeOwned>(&self, bytes: &[u8]) -> Result<CacheEntry<V>, CodecError> {
        let json = self.decompress(bytes)?;
        let envelope: Envelope<V> =
            serde_json::from_slice(&json).map_err(|e| CodecError::Corrupt(e.to_string()))?;
        check_version(envelope.format_version)?;

        Ok(CacheEntry {
            key: envelope.key,
            payload: envelope.payload,
            metadata: envelope.metadata,
        })
    }

    /// Decode only the key and metadata; used when rebuilding the index
    pub fn decode_header(&self, bytes: &[u8]) -> Result<EntryHeader, CodecError> {
        let json = self.decompress(bytes)?;
        let header: EntryHeader =
            serde_json::from_slice(&json).map_err(|e| CodecError::Corrupt(e.to_string()))?;
        check_version(header.format_version)?;
        Ok(header)
    }

    fn decompress(&self, bytes: &[u8]) -> Result<Vec<u8>, CodecError> {
        self.compressor.decompress(bytes).map_err(|e| {
            CodecError::Corrupt(format!("{} decompression failed: {}", self.compressor.name(), e))
        })
    }
}

fn check_version(version: u32) -> Result<(), CodecError> {
    if version != ENTRY_FORMAT_VERSION {
        return Err(CodecError::Corrupt(format!(
            "unsupported entry format version {}",
            version
        )));
    }
    Ok(())
}
