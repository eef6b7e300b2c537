//! Manifest assembly for raw bundles and deployment packages
//!
//! Both builders start from a fixed set of main attributes and lay the
//! caller's headers over them; a caller header with the same name (ignoring
//! case) replaces the default value. Deployment packages also get one named
//! section per bucket entry, filled from the entry's own embedded manifest.

use crate::archive::{normalize_path, read_manifest, MANIFEST_NAME};
use crate::bucket::{ContentType, EntryIndex};
use crate::config::BuildConfig;
use crate::error::{BundleError, Result};
use crate::manifest::{Attributes, Manifest, MANIFEST_VERSION};
use crate::store::ContentStore;
use std::collections::HashSet;
use tracing::debug;

pub const BUILT_BY: &str = "Built-By";
pub const CREATED_BY: &str = "Created-By";
pub const TOOL: &str = "Tool";
pub const TINYBUNDLES_VERSION: &str = "TinybundlesVersion";
pub const CONTENT_TYPE: &str = "Content-Type";

pub const BUNDLE_SYMBOLIC_NAME: &str = "Bundle-SymbolicName";
pub const BUNDLE_VERSION: &str = "Bundle-Version";
pub const RESOURCE_PROCESSOR: &str = "Resource-Processor";

pub const DEPLOYMENT_PACKAGE_SYMBOLIC_NAME: &str = "DeploymentPackage-SymbolicName";
pub const DEPLOYMENT_PACKAGE_VERSION: &str = "DeploymentPackage-Version";
pub const DEPLOYMENT_PACKAGE_FIX_PACK: &str = "DeploymentPackage-FixPack";
pub const DEPLOYMENT_PACKAGE_MISSING: &str = "DeploymentPackage-Missing";

/// Media type of a deployment package
pub const DEPLOYMENT_PACKAGE_CONTENT_TYPE: &str = "application/vnd.osgi.dp";

/// Value stamped into `Created-By`, `Tool` and `TinybundlesVersion`
pub const TOOL_NAME: &str = concat!("tinybundles-", env!("CARGO_PKG_VERSION"));

/// Defaults first, then caller headers; a later name replaces an earlier one
pub fn main_attributes<K, V>(defaults: Attributes, headers: impl IntoIterator<Item = (K, V)>) -> Attributes
where
    K: Into<String>,
    V: Into<String>,
{
    let mut attributes = defaults;
    for (name, value) in headers {
        let name = name.into();
        let value = value.into();
        debug!("Header {}: {}", name, value);
        attributes.insert(name, value);
    }
    attributes
}

/// Fixed main attributes of a raw bundle
pub fn raw_defaults(config: &BuildConfig) -> Attributes {
    let mut attributes = Attributes::new();
    attributes.insert(MANIFEST_VERSION, "1.0");
    attributes.insert(BUILT_BY, config.built_by());
    attributes.insert(CREATED_BY, TOOL_NAME);
    attributes.insert(TOOL, TOOL_NAME);
    attributes.insert(TINYBUNDLES_VERSION, TOOL_NAME);
    attributes
}

/// Fixed main attributes of a deployment package
pub fn deployment_defaults() -> Attributes {
    let mut attributes = Attributes::new();
    attributes.insert(MANIFEST_VERSION, "1.0");
    attributes.insert(CONTENT_TYPE, DEPLOYMENT_PACKAGE_CONTENT_TYPE);
    attributes
}

/// Manifest of a raw bundle
pub fn raw_manifest<K, V>(headers: impl IntoIterator<Item = (K, V)>, config: &BuildConfig) -> Manifest
where
    K: Into<String>,
    V: Into<String>,
{
    Manifest::with_main_attributes(main_attributes(raw_defaults(config), headers))
}

/// Manifest of a deployment package
///
/// Walks the index in order and builds one section per entry, missing or
/// not. Bundle entries carry `Bundle-SymbolicName` and `Bundle-Version` from
/// their own manifest; a bundle without one (or with neither header) simply
/// gets no identity attributes. Every other entry names the configured
/// resource processor. Missing entries additionally get
/// `DeploymentPackage-Missing: true`.
///
/// Each bundle is opened once here and the reader dropped before returning;
/// the streaming writer opens it again to copy the content.
pub fn deployment_manifest<K, V, I>(
    headers: impl IntoIterator<Item = (K, V)>,
    store: &dyn ContentStore,
    index: &I,
    config: &BuildConfig,
) -> Result<Manifest>
where
    K: Into<String>,
    V: Into<String>,
    I: EntryIndex + ?Sized,
{
    let mut manifest = Manifest::with_main_attributes(main_attributes(deployment_defaults(), headers));
    let mut seen = HashSet::new();

    for name in index.entries() {
        // Sections are keyed by the name the content entry will carry
        let entry_name = normalize_path(name);
        if entry_name.eq_ignore_ascii_case(MANIFEST_NAME) {
            return Err(BundleError::PathError(format!(
                "Entry name {} is reserved for the generated manifest",
                entry_name
            )));
        }
        if seen.contains(&entry_name) {
            return Err(BundleError::DuplicateEntry(entry_name));
        }
        seen.insert(entry_name.clone());

        let handle = index
            .handle(name)
            .ok_or_else(|| BundleError::EntryNotFound(name.to_string()))?;
        let content_type = index
            .content_type(name)
            .ok_or_else(|| BundleError::EntryNotFound(name.to_string()))?;

        let mut section = Attributes::new();
        match content_type {
            ContentType::Bundle => {
                let embedded = store
                    .open(handle)
                    .and_then(read_manifest)
                    .map_err(|e| BundleError::EmbeddedManifest {
                        entry: entry_name.clone(),
                        source: Box::new(e),
                    })?;

                match &embedded {
                    Some(bundle) => {
                        let main = bundle.main_attributes();
                        section.insert_opt(BUNDLE_SYMBOLIC_NAME, main.get(BUNDLE_SYMBOLIC_NAME));
                        section.insert_opt(BUNDLE_VERSION, main.get(BUNDLE_VERSION));
                    }
                    None => debug!("Bundle {} has no embedded manifest", entry_name),
                }
            }
            ContentType::Resource => {
                if !store.contains(handle) {
                    return Err(BundleError::UnknownHandle(handle.to_string()));
                }
                section.insert(RESOURCE_PROCESSOR, config.resource_processor.as_str());
            }
        }

        if index.is_missing(name) {
            section.insert(DEPLOYMENT_PACKAGE_MISSING, "true");
        }

        debug!("Section {} ({:?}): {} attributes", entry_name, content_type, section.len());
        manifest.insert_section(entry_name, section);
    }

    Ok(manifest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::ArchiveWriter;
    use crate::bucket::Bucket;
    use crate::store::{Handle, MemoryStore};
    use std::collections::BTreeMap;

    fn bundle_jar(manifest: &str) -> Vec<u8> {
        let mut writer = ArchiveWriter::new(Vec::new());
        writer.add_bytes(MANIFEST_NAME, manifest.as_bytes()).unwrap();
        writer.add_bytes("org/example/Activator.class", b"\xCA\xFE\xBA\xBE").unwrap();
        writer.finish().unwrap()
    }

    #[test]
    fn test_headers_override_defaults() {
        let mut headers = BTreeMap::new();
        headers.insert("Content-Type", "application/x-custom");
        headers.insert(DEPLOYMENT_PACKAGE_SYMBOLIC_NAME, "org.example.dp");

        let attributes = main_attributes(deployment_defaults(), headers);
        assert_eq!(attributes.get(MANIFEST_VERSION), Some("1.0"));
        assert_eq!(attributes.get(CONTENT_TYPE), Some("application/x-custom"));
        assert_eq!(attributes.get(DEPLOYMENT_PACKAGE_SYMBOLIC_NAME), Some("org.example.dp"));
        assert_eq!(attributes.len(), 3);
    }

    #[test]
    fn test_header_override_ignores_case() {
        let attributes = main_attributes(deployment_defaults(), [("content-type", "text/plain")]);
        assert_eq!(attributes.get(CONTENT_TYPE), Some("text/plain"));
        assert_eq!(attributes.len(), 2);
    }

    #[test]
    fn test_raw_defaults() {
        let config = BuildConfig::default().with_built_by("builder");
        let manifest = raw_manifest([("Bundle-Name", "demo")], &config);
        let main = manifest.main_attributes();

        assert_eq!(main.get(MANIFEST_VERSION), Some("1.0"));
        assert_eq!(main.get(BUILT_BY), Some("builder"));
        assert_eq!(main.get(CREATED_BY), Some(TOOL_NAME));
        assert_eq!(main.get(TOOL), Some(TOOL_NAME));
        assert_eq!(main.get(TINYBUNDLES_VERSION), Some(TOOL_NAME));
        assert_eq!(main.get("Bundle-Name"), Some("demo"));
        assert!(TOOL_NAME.starts_with("tinybundles-"));
    }

    #[test]
    fn test_deployment_sections() {
        let store = MemoryStore::new();
        let mut bucket = Bucket::new();

        let core = store.store_bytes(&bundle_jar(
            "Manifest-Version: 1.0\r\nBundle-SymbolicName: org.example.core\r\nBundle-Version: 1.2.0\r\n\r\n",
        ));
        let props = store.store_bytes(b"key=value\n");
        let old = store.store_bytes(&bundle_jar(
            "Manifest-Version: 1.0\r\nBundle-SymbolicName: org.example.old\r\n\r\n",
        ));

        bucket.add_bundle("core.jar", core).unwrap();
        bucket.add_resource("app.properties", props).unwrap();
        bucket.add_bundle("old.jar", old).unwrap();
        bucket.mark_missing("old.jar").unwrap();

        let manifest = deployment_manifest(
            Vec::<(String, String)>::new(),
            &store,
            &bucket,
            &BuildConfig::default(),
        )
        .unwrap();

        let names: Vec<&str> = manifest.sections().map(|(name, _)| name).collect();
        assert_eq!(names, vec!["core.jar", "app.properties", "old.jar"]);

        let core = manifest.section("core.jar").unwrap();
        assert_eq!(core.get(BUNDLE_SYMBOLIC_NAME), Some("org.example.core"));
        assert_eq!(core.get(BUNDLE_VERSION), Some("1.2.0"));
        assert!(!core.contains(DEPLOYMENT_PACKAGE_MISSING));

        let resource = manifest.section("app.properties").unwrap();
        assert_eq!(resource.get(RESOURCE_PROCESSOR), Some("foo"));
        assert!(!resource.contains(BUNDLE_SYMBOLIC_NAME));

        let old = manifest.section("old.jar").unwrap();
        assert_eq!(old.get(BUNDLE_SYMBOLIC_NAME), Some("org.example.old"));
        assert_eq!(old.get(BUNDLE_VERSION), None);
        assert_eq!(old.get(DEPLOYMENT_PACKAGE_MISSING), Some("true"));
    }

    #[test]
    fn test_bundle_without_manifest_has_no_identity() {
        let store = MemoryStore::new();
        let mut bucket = Bucket::new();
        bucket.add_bundle("plain.jar", store.store_bytes(b"not a jar")).unwrap();
        // Shorter than a local header signature
        bucket.add_bundle("tiny.jar", store.store_bytes(b"PK\x03")).unwrap();
        bucket.add_bundle("empty.jar", store.store_bytes(b"")).unwrap();

        let manifest = deployment_manifest(
            [("DeploymentPackage-Version", "1.0.0")],
            &store,
            &bucket,
            &BuildConfig::default(),
        )
        .unwrap();

        assert!(manifest.section("plain.jar").unwrap().is_empty());
        assert!(manifest.section("tiny.jar").unwrap().is_empty());
        assert!(manifest.section("empty.jar").unwrap().is_empty());
    }

    #[test]
    fn test_corrupt_bundle_fails() {
        let store = MemoryStore::new();
        let mut jar = bundle_jar("Manifest-Version: 1.0\r\nBundle-SymbolicName: x\r\n\r\n");
        jar.truncate(40);

        let mut bucket = Bucket::new();
        bucket.add_bundle("broken.jar", store.store_bytes(&jar)).unwrap();

        let err = deployment_manifest(
            Vec::<(String, String)>::new(),
            &store,
            &bucket,
            &BuildConfig::default(),
        )
        .unwrap_err();
        assert!(matches!(err, BundleError::EmbeddedManifest { entry, .. } if entry == "broken.jar"));
    }

    #[test]
    fn test_unknown_handle() {
        let store = MemoryStore::new();
        let mut bucket = Bucket::new();
        bucket.add_bundle("gone.jar", Handle::for_content(b"never stored")).unwrap();

        let err = deployment_manifest(
            Vec::<(String, String)>::new(),
            &store,
            &bucket,
            &BuildConfig::default(),
        )
        .unwrap_err();
        assert!(matches!(err, BundleError::EmbeddedManifest { .. }));
    }

    #[test]
    fn test_configured_resource_processor() {
        let store = MemoryStore::new();
        let mut bucket = Bucket::new();
        bucket.add_resource("a.xml", store.store_bytes(b"<a/>")).unwrap();

        let config = BuildConfig {
            resource_processor: "org.osgi.deployment.rp.autoconf".to_string(),
            ..BuildConfig::default()
        };
        let manifest =
            deployment_manifest(Vec::<(String, String)>::new(), &store, &bucket, &config).unwrap();
        assert_eq!(
            manifest.section("a.xml").unwrap().get(RESOURCE_PROCESSOR),
            Some("org.osgi.deployment.rp.autoconf")
        );
    }

    /// Index over fixed names that all share one handle
    struct ListIndex {
        names: Vec<&'static str>,
        handle: Handle,
    }

    impl EntryIndex for ListIndex {
        fn entries(&self) -> Vec<&str> {
            self.names.clone()
        }

        fn handle(&self, _name: &str) -> Option<&Handle> {
            Some(&self.handle)
        }

        fn content_type(&self, _name: &str) -> Option<ContentType> {
            Some(ContentType::Resource)
        }

        fn is_missing(&self, _name: &str) -> bool {
            false
        }
    }

    #[test]
    fn test_foreign_index_duplicates_rejected() {
        let store = MemoryStore::new();
        let index = ListIndex {
            names: vec!["a.txt", "a.txt"],
            handle: store.store_bytes(b"a"),
        };

        let err = deployment_manifest(
            Vec::<(String, String)>::new(),
            &store,
            &index,
            &BuildConfig::default(),
        )
        .unwrap_err();
        assert!(matches!(err, BundleError::DuplicateEntry(name) if name == "a.txt"));

        let index = ListIndex {
            names: vec!["conf/a.txt", "conf\\a.txt"],
            handle: store.store_bytes(b"a"),
        };
        let err = deployment_manifest(
            Vec::<(String, String)>::new(),
            &store,
            &index,
            &BuildConfig::default(),
        )
        .unwrap_err();
        assert!(matches!(err, BundleError::DuplicateEntry(name) if name == "conf/a.txt"));
    }

    #[test]
    fn test_foreign_index_sections_use_archive_names() {
        let store = MemoryStore::new();
        let index = ListIndex {
            names: vec!["dir\\r.txt"],
            handle: store.store_bytes(b"r"),
        };

        let manifest = deployment_manifest(
            Vec::<(String, String)>::new(),
            &store,
            &index,
            &BuildConfig::default(),
        )
        .unwrap();

        let names: Vec<&str> = manifest.sections().map(|(name, _)| name).collect();
        assert_eq!(names, vec!["dir/r.txt"]);
    }
}
