//! JAR manifest support
//!
//! A manifest is the `META-INF/MANIFEST.MF` entry of a JAR-style archive: one
//! main attribute section followed by zero or more named sections, each
//! describing a single archive entry.
//!
//! # Text Format
//!
//! ```text
//! Manifest-Version: 1.0
//! Content-Type: application/vnd.osgi.dp
//!
//! Name: bundles/core.jar
//! Bundle-SymbolicName: org.example.core
//! Bundle-Version: 1.2.0
//!
//! ```
//!
//! Lines end in CRLF and never exceed 72 bytes; longer headers continue on
//! the next line after a single space. Attribute names compare ASCII
//! case-insensitively.
//!
//! # Usage
//!
//! ```
//! use tinybundles::manifest::{Attributes, Manifest};
//!
//! let mut manifest = Manifest::new();
//! manifest.main_attributes_mut().insert("Manifest-Version", "1.0");
//!
//! let mut section = Attributes::new();
//! section.insert("Bundle-SymbolicName", "org.example.core");
//! manifest.insert_section("core.jar", section);
//!
//! let bytes = manifest.to_bytes()?;
//! let parsed = Manifest::parse(&bytes)?;
//! assert_eq!(parsed.section("core.jar").unwrap().get("bundle-symbolicname"),
//!            Some("org.example.core"));
//! # Ok::<(), tinybundles::BundleError>(())
//! ```

use crate::error::{BundleError, Result};
use std::io::Write;

/// Maximum bytes per physical manifest line, excluding the line break
pub const MAX_LINE_LENGTH: usize = 72;

/// Maximum length of an attribute name
pub const MAX_NAME_LENGTH: usize = 70;

/// Attribute introducing a named section
pub const SECTION_NAME: &str = "Name";

/// Attribute always written first in the main section
pub const MANIFEST_VERSION: &str = "Manifest-Version";

/// Ordered attribute set with case-insensitive names
///
/// Replacing a value keeps the attribute's original position and spelling.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Attributes {
    entries: Vec<(String, String)>,
}

impl Attributes {
    pub fn new() -> Self {
        Self::default()
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.entries
            .iter()
            .position(|(key, _)| key.eq_ignore_ascii_case(name))
    }

    /// Set an attribute, returning the previous value
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) -> Option<String> {
        let name = name.into();
        let value = value.into();
        match self.position(&name) {
            Some(index) => Some(std::mem::replace(&mut self.entries[index].1, value)),
            None => {
                self.entries.push((name, value));
                None
            }
        }
    }

    /// Set an attribute only when a value is present
    pub fn insert_opt(&mut self, name: &str, value: Option<&str>) {
        if let Some(value) = value {
            self.insert(name, value);
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.position(name).map(|index| self.entries[index].1.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    pub fn remove(&mut self, name: &str) -> Option<String> {
        self.position(name).map(|index| self.entries.remove(index).1)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    fn write_to<W: Write>(&self, mut writer: W, version_first: bool) -> Result<usize> {
        let mut bytes_written = 0;

        if version_first {
            if let Some(version) = self.get(MANIFEST_VERSION) {
                bytes_written += write_header(&mut writer, MANIFEST_VERSION, version)?;
            }
        }

        for (name, value) in self.iter() {
            if version_first && name.eq_ignore_ascii_case(MANIFEST_VERSION) {
                continue;
            }
            if name.eq_ignore_ascii_case(SECTION_NAME) {
                return Err(BundleError::InvalidManifest(
                    "\"Name\" is reserved for section headers".to_string(),
                ));
            }
            bytes_written += write_header(&mut writer, name, value)?;
        }

        Ok(bytes_written)
    }
}

impl<K: Into<String>, V: Into<String>> Extend<(K, V)> for Attributes {
    fn extend<I: IntoIterator<Item = (K, V)>>(&mut self, iter: I) {
        for (name, value) in iter {
            self.insert(name, value);
        }
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Attributes {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut attributes = Attributes::new();
        attributes.extend(iter);
        attributes
    }
}

/// JAR manifest: main attributes plus named per-entry sections
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Manifest {
    main: Attributes,
    sections: Vec<(String, Attributes)>,
}

impl Manifest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a manifest with the given main attributes
    pub fn with_main_attributes(main: Attributes) -> Self {
        Self {
            main,
            sections: Vec::new(),
        }
    }

    pub fn main_attributes(&self) -> &Attributes {
        &self.main
    }

    pub fn main_attributes_mut(&mut self) -> &mut Attributes {
        &mut self.main
    }

    /// Add or replace the section for an entry; replaced sections keep their position
    pub fn insert_section(&mut self, name: impl Into<String>, attributes: Attributes) -> Option<Attributes> {
        let name = name.into();
        match self.sections.iter_mut().find(|(key, _)| *key == name) {
            Some((_, existing)) => Some(std::mem::replace(existing, attributes)),
            None => {
                self.sections.push((name, attributes));
                None
            }
        }
    }

    pub fn section(&self, name: &str) -> Option<&Attributes> {
        self.sections
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, attributes)| attributes)
    }

    pub fn sections(&self) -> impl Iterator<Item = (&str, &Attributes)> {
        self.sections.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn section_count(&self) -> usize {
        self.sections.len()
    }

    /// Write the manifest in JAR text form
    pub fn write_to<W: Write>(&self, mut writer: W) -> Result<usize> {
        let mut bytes_written = self.main.write_to(&mut writer, true)?;
        writer.write_all(b"\r\n")?;
        bytes_written += 2;

        for (name, attributes) in &self.sections {
            bytes_written += write_header(&mut writer, SECTION_NAME, name)?;
            bytes_written += attributes.write_to(&mut writer, false)?;
            writer.write_all(b"\r\n")?;
            bytes_written += 2;
        }

        Ok(bytes_written)
    }

    /// Serialize to bytes
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        self.write_to(&mut buf)?;
        Ok(buf)
    }

    /// Parse JAR manifest text
    pub fn parse(data: &[u8]) -> Result<Self> {
        let text = std::str::from_utf8(data)
            .map_err(|e| BundleError::InvalidManifest(format!("Invalid UTF-8: {}", e)))?;

        // Lines may end in CRLF, LF or a bare CR
        let text = text.replace("\r\n", "\n").replace('\r', "\n");

        // Join continuation lines; None marks a section break
        let mut lines: Vec<Option<String>> = Vec::new();
        for raw in text.lines() {
            if let Some(continued) = raw.strip_prefix(' ') {
                match lines.last_mut() {
                    Some(Some(previous)) => previous.push_str(continued),
                    _ => {
                        return Err(BundleError::InvalidManifest(
                            "Continuation line without a header".to_string(),
                        ))
                    }
                }
            } else if raw.is_empty() {
                lines.push(None);
            } else {
                lines.push(Some(raw.to_string()));
            }
        }

        let mut manifest = Manifest::new();
        let mut in_main = true;
        let mut current: Option<(String, Attributes)> = None;

        for line in lines {
            let Some(line) = line else {
                in_main = false;
                if let Some((name, attributes)) = current.take() {
                    manifest.merge_section(name, attributes);
                }
                continue;
            };

            let (name, value) = parse_header(&line)?;

            if in_main {
                manifest.main.insert(name, value);
                continue;
            }

            match current.as_mut() {
                Some((_, attributes)) => {
                    attributes.insert(name, value);
                }
                None if name.eq_ignore_ascii_case(SECTION_NAME) => {
                    current = Some((value.to_string(), Attributes::new()));
                }
                None => {
                    return Err(BundleError::InvalidManifest(format!(
                        "Section must start with \"Name\", found \"{}\"",
                        name
                    )))
                }
            }
        }

        if let Some((name, attributes)) = current.take() {
            manifest.merge_section(name, attributes);
        }

        Ok(manifest)
    }

    fn merge_section(&mut self, name: String, attributes: Attributes) {
        match self.sections.iter_mut().find(|(key, _)| *key == name) {
            Some((_, existing)) => existing.extend(
                attributes
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string())),
            ),
            None => self.sections.push((name, attributes)),
        }
    }
}

/// Check an attribute name: `[A-Za-z0-9_-]`, 1-70 bytes
pub fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() || name.len() > MAX_NAME_LENGTH {
        return Err(BundleError::InvalidManifest(format!(
            "Attribute name must be 1-{} bytes: \"{}\"",
            MAX_NAME_LENGTH, name
        )));
    }
    if !name
        .bytes()
        .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
    {
        return Err(BundleError::InvalidManifest(format!(
            "Invalid attribute name: \"{}\"",
            name
        )));
    }
    Ok(())
}

fn validate_value(name: &str, value: &str) -> Result<()> {
    if value.contains(['\r', '\n', '\0']) {
        return Err(BundleError::InvalidManifest(format!(
            "Value of \"{}\" contains a line break or NUL",
            name
        )));
    }
    Ok(())
}

fn parse_header(line: &str) -> Result<(&str, &str)> {
    let (name, value) = line.split_once(':').ok_or_else(|| {
        BundleError::InvalidManifest(format!("Header without ':' separator: \"{}\"", line))
    })?;
    validate_name(name)?;
    Ok((name, value.strip_prefix(' ').unwrap_or(value)))
}

/// Write `name: value` wrapped to 72-byte lines
fn write_header<W: Write>(mut writer: W, name: &str, value: &str) -> Result<usize> {
    validate_name(name)?;
    validate_value(name, value)?;

    let line = format!("{}: {}", name, value);
    let bytes = line.as_bytes();
    let mut bytes_written = 0;
    let mut start = 0;
    let mut limit = MAX_LINE_LENGTH;

    while bytes.len() - start > limit {
        let mut end = start + limit;
        // Never split a UTF-8 sequence across lines
        while !line.is_char_boundary(end) {
            end -= 1;
        }
        writer.write_all(&bytes[start..end])?;
        writer.write_all(b"\r\n ")?;
        bytes_written += end - start + 3;
        start = end;
        limit = MAX_LINE_LENGTH - 1;
    }

    writer.write_all(&bytes[start..])?;
    writer.write_all(b"\r\n")?;
    bytes_written += bytes.len() - start + 2;

    Ok(bytes_written)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_overwrites_case_insensitively() {
        let mut attributes = Attributes::new();
        attributes.insert("Content-Type", "application/vnd.osgi.dp");
        attributes.insert("Bundle-Name", "Test");
        let previous = attributes.insert("content-type", "text/plain");

        assert_eq!(previous.as_deref(), Some("application/vnd.osgi.dp"));
        assert_eq!(attributes.len(), 2);
        assert_eq!(attributes.get("CONTENT-TYPE"), Some("text/plain"));
        // Position and spelling of the first insertion survive
        assert_eq!(attributes.iter().next(), Some(("Content-Type", "text/plain")));
    }

    #[test]
    fn test_version_written_first() {
        let mut manifest = Manifest::new();
        manifest.main_attributes_mut().insert("Built-By", "alice");
        manifest.main_attributes_mut().insert("Manifest-Version", "1.0");

        let text = String::from_utf8(manifest.to_bytes().unwrap()).unwrap();
        assert_eq!(text, "Manifest-Version: 1.0\r\nBuilt-By: alice\r\n\r\n");
    }

    #[test]
    fn test_sections_roundtrip() {
        let mut manifest = Manifest::new();
        manifest.main_attributes_mut().insert("Manifest-Version", "1.0");

        let mut bundle = Attributes::new();
        bundle.insert("Bundle-SymbolicName", "org.example.core");
        bundle.insert("Bundle-Version", "1.2.0");
        manifest.insert_section("bundles/core.jar", bundle);

        let mut resource = Attributes::new();
        resource.insert("Resource-Processor", "foo");
        resource.insert("DeploymentPackage-Missing", "true");
        manifest.insert_section("conf/app.properties", resource);

        let parsed = Manifest::parse(&manifest.to_bytes().unwrap()).unwrap();
        assert_eq!(parsed, manifest);
        assert_eq!(
            parsed.sections().map(|(name, _)| name).collect::<Vec<_>>(),
            vec!["bundles/core.jar", "conf/app.properties"]
        );
    }

    #[test]
    fn test_long_values_wrap_at_72_bytes() {
        let value = "x".repeat(200);
        let mut manifest = Manifest::new();
        manifest.main_attributes_mut().insert("Long-Header", value.as_str());

        let bytes = manifest.to_bytes().unwrap();
        let text = String::from_utf8(bytes.clone()).unwrap();
        for line in text.split("\r\n") {
            assert!(line.len() <= MAX_LINE_LENGTH, "line too long: {}", line.len());
        }

        let parsed = Manifest::parse(&bytes).unwrap();
        assert_eq!(parsed.main_attributes().get("Long-Header"), Some(value.as_str()));
    }

    #[test]
    fn test_wrap_keeps_utf8_sequences_intact() {
        let value = "ü".repeat(80);
        let mut manifest = Manifest::new();
        manifest.main_attributes_mut().insert("Bundle-Description", value.as_str());

        let parsed = Manifest::parse(&manifest.to_bytes().unwrap()).unwrap();
        assert_eq!(
            parsed.main_attributes().get("Bundle-Description"),
            Some(value.as_str())
        );
    }

    #[test]
    fn test_parse_accepts_lf_and_missing_trailing_blank() {
        let parsed = Manifest::parse(b"Manifest-Version: 1.0\nCreated-By: hand\n\nName: a.txt\nX-Flag: on").unwrap();
        assert_eq!(parsed.main_attributes().get("Created-By"), Some("hand"));
        assert_eq!(parsed.section("a.txt").unwrap().get("X-Flag"), Some("on"));
    }

    #[test]
    fn test_parse_accepts_bare_cr() {
        let parsed = Manifest::parse(
            b"Manifest-Version: 1.0\rBundle-SymbolicName: org.exa\r mple\r\rName: b.jar\rX-Flag: on\r\r",
        )
        .unwrap();
        assert_eq!(parsed.main_attributes().get("Bundle-SymbolicName"), Some("org.example"));
        assert_eq!(parsed.main_attributes().len(), 2);
        assert_eq!(parsed.section("b.jar").unwrap().get("X-Flag"), Some("on"));
    }

    #[test]
    fn test_rejects_invalid_names() {
        let mut manifest = Manifest::new();
        manifest.main_attributes_mut().insert("Bad Name", "value");
        assert!(matches!(
            manifest.to_bytes(),
            Err(BundleError::InvalidManifest(_))
        ));

        assert!(validate_name(&"a".repeat(71)).is_err());
        assert!(validate_name("Bundle-SymbolicName").is_ok());
    }

    #[test]
    fn test_rejects_line_breaks_in_values() {
        let mut manifest = Manifest::new();
        manifest.main_attributes_mut().insert("Header", "one\ntwo");
        assert!(manifest.to_bytes().is_err());
    }

    #[test]
    fn test_section_without_name_fails() {
        let result = Manifest::parse(b"Manifest-Version: 1.0\r\n\r\nBundle-Version: 1\r\n");
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("Section must start with"));
    }

    #[test]
    fn test_orphan_continuation_fails() {
        assert!(Manifest::parse(b" continued\r\n").is_err());
    }
}
