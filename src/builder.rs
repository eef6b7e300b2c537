//! Bundle builders
//!
//! Both builders do all validation and metadata work on the calling thread,
//! so a bad input fails `build` itself; only content copying is left to the
//! writer thread behind the returned [`BundleStream`].

use crate::archive::{normalize_path, MANIFEST_NAME};
use crate::assemble::{deployment_manifest, raw_manifest};
use crate::bucket::EntryIndex;
use crate::config::BuildConfig;
use crate::error::{BundleError, Result};
use crate::store::{ContentStore, Locator};
use crate::stream::{BundleStream, PlannedEntry, WriteJob};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;

/// Validate an entry name and return it in the form the archive will carry
fn check_entry_name(name: &str, seen: &mut HashSet<String>) -> Result<String> {
    let name = normalize_path(name);
    if name.is_empty() {
        return Err(BundleError::PathError("Entry name is empty".to_string()));
    }
    if name.eq_ignore_ascii_case(MANIFEST_NAME) {
        return Err(BundleError::PathError(format!(
            "Entry name {} is reserved for the generated manifest",
            name
        )));
    }
    if seen.contains(&name) {
        return Err(BundleError::DuplicateEntry(name));
    }
    seen.insert(name.clone());
    Ok(name)
}

/// Builds a plain JAR from named resources
///
/// # Example
///
/// ```no_run
/// use std::io::Read;
/// use tinybundles::{Locator, RawBuilder};
///
/// let resources = vec![
///     ("a.txt", Locator::bytes("alpha")),
///     ("conf/b.properties", Locator::path("/etc/app/b.properties")),
/// ];
/// let mut stream = RawBuilder::new().build(resources, [("Bundle-Name", "demo")])?;
///
/// let mut jar = Vec::new();
/// stream.read_to_end(&mut jar)?;
/// stream.finish()?;
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
#[derive(Debug, Clone, Default)]
pub struct RawBuilder {
    config: BuildConfig,
}

impl RawBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: BuildConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &BuildConfig {
        &self.config
    }

    /// Start building a JAR of `resources`, in the order given
    pub fn build<N, K, V>(
        &self,
        resources: impl IntoIterator<Item = (N, Locator)>,
        headers: impl IntoIterator<Item = (K, V)>,
    ) -> Result<BundleStream>
    where
        N: Into<String>,
        K: Into<String>,
        V: Into<String>,
    {
        self.config.validate()?;

        let mut seen = HashSet::new();
        let mut entries = Vec::new();
        for (name, source) in resources {
            let name: String = name.into();
            let name = check_entry_name(&name, &mut seen)?;
            entries.push(PlannedEntry {
                name,
                source,
                missing: false,
            });
        }

        let manifest = raw_manifest(headers, &self.config).to_bytes()?;
        debug!("Raw bundle: {} resources", entries.len());

        BundleStream::spawn(WriteJob {
            manifest,
            entries,
            config: self.config.clone(),
        })
    }
}

/// Builds an OSGi deployment package from a content store and a bucket
///
/// The manifest gets one section per bucket entry; see
/// [`deployment_manifest`] for what each section holds. Entries flagged
/// missing are listed in the manifest but not written, as fix packs expect.
#[derive(Debug, Clone, Default)]
pub struct DeploymentPackageBuilder {
    config: BuildConfig,
}

impl DeploymentPackageBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: BuildConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &BuildConfig {
        &self.config
    }

    /// Start building a deployment package
    ///
    /// The bucket is only consulted during this call; the writer thread works
    /// from a snapshot of its entries and the shared store.
    pub fn build<K, V, I>(
        &self,
        headers: impl IntoIterator<Item = (K, V)>,
        store: Arc<dyn ContentStore>,
        bucket: &I,
    ) -> Result<BundleStream>
    where
        K: Into<String>,
        V: Into<String>,
        I: EntryIndex + ?Sized,
    {
        self.config.validate()?;

        let manifest = deployment_manifest(headers, store.as_ref(), bucket, &self.config)?;

        let mut seen = HashSet::new();
        let mut entries = Vec::new();
        for name in bucket.entries() {
            let entry_name = check_entry_name(name, &mut seen)?;
            let handle = bucket
                .handle(name)
                .ok_or_else(|| BundleError::EntryNotFound(name.to_string()))?;
            entries.push(PlannedEntry {
                name: entry_name,
                source: Locator::stored(Arc::clone(&store), handle.clone()),
                missing: bucket.is_missing(name),
            });
        }

        debug!(
            "Deployment package: {} entries, {} missing",
            entries.len(),
            entries.iter().filter(|entry| entry.missing).count()
        );

        BundleStream::spawn(WriteJob {
            manifest: manifest.to_bytes()?,
            entries,
            config: self.config.clone(),
        })
    }
}
