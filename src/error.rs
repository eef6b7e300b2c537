use std::io;
use thiserror::Error;

/// Result type for tinybundles operations
pub type Result<T> = std::result::Result<T, BundleError>;

/// Unified error type for bundle assembly and streaming
#[derive(Debug, Error)]
pub enum BundleError {
    // Archive errors
    #[error("Invalid archive format: {0}")]
    InvalidArchive(String),

    #[error("Unsupported compression method: {0}")]
    UnsupportedCompression(u16),

    #[error("CRC mismatch for {path}: expected {expected:08x}, got {actual:08x}")]
    CrcMismatch {
        path: String,
        expected: u32,
        actual: u32,
    },

    #[error("Archive limit exceeded: {0}")]
    ArchiveTooLarge(String),

    #[error("Path error: {0}")]
    PathError(String),

    // Manifest errors
    #[error("Invalid manifest: {0}")]
    InvalidManifest(String),

    #[error("Failed to read embedded manifest of {entry}: {source}")]
    EmbeddedManifest {
        entry: String,
        #[source]
        source: Box<BundleError>,
    },

    // Bucket and store errors
    #[error("Duplicate entry in bundle: {0}")]
    DuplicateEntry(String),

    #[error("Entry not found in bucket: {0}")]
    EntryNotFound(String),

    #[error("Unknown content handle: {0}")]
    UnknownHandle(String),

    // Streaming errors
    #[error("Streaming failed while writing {entry}: {message}")]
    StreamFailed { entry: String, message: String },

    #[error("Bundle stream was closed by the consumer")]
    Cancelled,

    #[error("Failed to spawn writer thread: {0}")]
    ThreadSpawn(#[source] io::Error),

    #[error("Writer thread panicked")]
    WriterPanicked,

    // Configuration errors
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("TOML error: {0}")]
    TomlError(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl From<toml::de::Error> for BundleError {
    fn from(err: toml::de::Error) -> Self {
        BundleError::TomlError(err.to_string())
    }
}

impl From<BundleError> for io::Error {
    fn from(err: BundleError) -> Self {
        match err {
            BundleError::Io(inner) => inner,
            BundleError::Cancelled => io::Error::new(io::ErrorKind::BrokenPipe, err.to_string()),
            other => io::Error::new(io::ErrorKind::Other, other.to_string()),
        }
    }
}
