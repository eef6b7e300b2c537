//! Tinybundles: streaming JAR and OSGi deployment package assembly
//!
//! This library builds JAR-style archives on the fly, combining:
//! - Generated `META-INF/MANIFEST.MF` with fixed defaults and caller headers
//! - Deployment packages with per-entry sections read from each bundle's own manifest
//! - Streaming ZIP output (deflate with data descriptors) through a bounded pipe
//! - Content-addressable stores keyed by SHA-256
//!
//! The archive is written on a background thread while the caller reads it,
//! so memory use stays bounded regardless of bundle size.
//!
//! # Example
//!
//! ```no_run
//! use std::io::Read;
//! use std::sync::Arc;
//! use tinybundles::{Bucket, DeploymentPackageBuilder, MemoryStore};
//!
//! let store = Arc::new(MemoryStore::new());
//! let mut bucket = Bucket::new();
//! bucket.add_bundle("core.jar", store.store_bytes(&std::fs::read("core.jar")?))?;
//! bucket.add_resource("app.properties", store.store_bytes(b"debug=false\n"))?;
//!
//! let headers = [("DeploymentPackage-SymbolicName", "org.example.dp")];
//! let mut stream = DeploymentPackageBuilder::new().build(headers, store, &bucket)?;
//!
//! let mut dp = Vec::new();
//! stream.read_to_end(&mut dp)?;
//! let summary = stream.finish()?;
//! println!("{} entries, {} bytes", summary.entries_written, summary.bytes_written);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

// Core modules
pub mod archive;
pub mod assemble;
pub mod bucket;
pub mod builder;
pub mod config;
pub mod error;
pub mod manifest;
pub mod pipe;
pub mod store;
pub mod stream;

// Re-export commonly used types
pub use archive::{
    read_manifest, ArchiveStreamReader, ArchiveWriter, CompressionMethod, EntryInfo, MANIFEST_NAME,
};
pub use bucket::{Bucket, BucketEntry, ContentType, EntryIndex};
pub use builder::{DeploymentPackageBuilder, RawBuilder};
pub use config::{BuildConfig, StreamFailurePolicy};
pub use error::{BundleError, Result};
pub use manifest::{Attributes, Manifest};
pub use store::{ByteReader, ContentStore, FileStore, Handle, Locator, MemoryStore};
pub use stream::{BuildSummary, BundleStream};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_library_basics() {
        // Ensure core types are accessible
        let _method = CompressionMethod::Deflated;
        let _config = BuildConfig::default();
        assert_eq!(MANIFEST_NAME, "META-INF/MANIFEST.MF");
    }
}
