//! Build configuration
//!
//! Tunes the pipe between the writer thread and the consumer, the archive
//! encoder, and the attributes stamped into generated manifests. Every field
//! has a default, so a TOML file only needs to name what it changes:
//!
//! ```toml
//! pipe_capacity = 4
//! chunk_size = 16384
//! compression_level = 9
//! built_by = "release-bot"
//! on_stream_failure = "truncate"
//! ```

use crate::error::{BundleError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default number of chunks buffered between producer and consumer
pub const DEFAULT_PIPE_CAPACITY: usize = 16;

/// Default chunk size in bytes
pub const DEFAULT_CHUNK_SIZE: usize = 8192;

/// Default deflate level
pub const DEFAULT_COMPRESSION_LEVEL: u32 = 6;

/// Placeholder processor id written for plain resources in deployment packages
pub const DEFAULT_RESOURCE_PROCESSOR: &str = "foo";

/// What the writer thread does when copying an entry fails
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StreamFailurePolicy {
    /// Close the stream with an error; the consumer's next read fails
    #[default]
    Propagate,
    /// Close the archive over the entries written so far and end the stream
    /// normally. The consumer cannot tell the archive is incomplete.
    Truncate,
}

/// Configuration shared by both builders
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildConfig {
    /// Chunks the pipe holds before the writer blocks
    pub pipe_capacity: usize,

    /// Bytes per chunk handed across the pipe
    pub chunk_size: usize,

    /// Read buffer used when copying entry content
    pub copy_buffer_size: usize,

    /// Deflate level (0-9)
    pub compression_level: u32,

    /// `Built-By` value; falls back to the current user name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub built_by: Option<String>,

    /// `Resource-Processor` value for non-bundle deployment entries
    pub resource_processor: String,

    /// Streaming failure handling
    pub on_stream_failure: StreamFailurePolicy,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            pipe_capacity: DEFAULT_PIPE_CAPACITY,
            chunk_size: DEFAULT_CHUNK_SIZE,
            copy_buffer_size: DEFAULT_CHUNK_SIZE,
            compression_level: DEFAULT_COMPRESSION_LEVEL,
            built_by: None,
            resource_processor: DEFAULT_RESOURCE_PROCESSOR.to_string(),
            on_stream_failure: StreamFailurePolicy::Propagate,
        }
    }
}

impl BuildConfig {
    /// Parse and validate a TOML document
    pub fn from_toml_str(source: &str) -> Result<Self> {
        let config: Self = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let source = std::fs::read_to_string(path)?;
        Self::from_toml_str(&source)
    }

    /// Check value ranges
    pub fn validate(&self) -> Result<()> {
        if self.pipe_capacity == 0 {
            return Err(BundleError::InvalidConfig(
                "pipe_capacity must be at least 1".to_string(),
            ));
        }
        if self.chunk_size == 0 {
            return Err(BundleError::InvalidConfig(
                "chunk_size must be at least 1".to_string(),
            ));
        }
        if self.copy_buffer_size == 0 {
            return Err(BundleError::InvalidConfig(
                "copy_buffer_size must be at least 1".to_string(),
            ));
        }
        if self.compression_level > 9 {
            return Err(BundleError::InvalidConfig(format!(
                "compression_level must be 0-9, got {}",
                self.compression_level
            )));
        }
        Ok(())
    }

    pub fn with_pipe_capacity(mut self, chunks: usize) -> Self {
        self.pipe_capacity = chunks;
        self
    }

    pub fn with_chunk_size(mut self, bytes: usize) -> Self {
        self.chunk_size = bytes;
        self
    }

    pub fn with_built_by(mut self, name: impl Into<String>) -> Self {
        self.built_by = Some(name.into());
        self
    }

    pub fn with_failure_policy(mut self, policy: StreamFailurePolicy) -> Self {
        self.on_stream_failure = policy;
        self
    }

    /// Resolve the `Built-By` value
    pub fn built_by(&self) -> String {
        self.built_by
            .clone()
            .or_else(|| std::env::var("USER").ok())
            .or_else(|| std::env::var("USERNAME").ok())
            .unwrap_or_else(|| "unknown".to_string())
    }
}
