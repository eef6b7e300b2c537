//! Entry index for deployment packages
//!
//! A bucket lists the entries of a deployment package in the order they will
//! be written, each with a content handle, a content type, and a missing flag
//! for fix-pack entries that are declared but not shipped.

use crate::archive::normalize_path;
use crate::error::{BundleError, Result};
use crate::store::Handle;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Kind of content behind a deployment package entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ContentType {
    /// An OSGi bundle; its identity is copied from its own manifest
    Bundle,
    /// Any other resource, handled by a resource processor
    Resource,
}

/// Read access to an ordered entry registry
pub trait EntryIndex {
    /// Entry names in write order
    fn entries(&self) -> Vec<&str>;

    fn handle(&self, name: &str) -> Option<&Handle>;

    fn content_type(&self, name: &str) -> Option<ContentType>;

    /// Whether the entry is declared but left out of the archive
    fn is_missing(&self, name: &str) -> bool;
}

/// One bucket entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BucketEntry {
    pub name: String,
    pub handle: Handle,
    pub content_type: ContentType,
    pub missing: bool,
}

/// Ordered entry registry with unique names
#[derive(Debug, Clone, Default)]
pub struct Bucket {
    entries: Vec<BucketEntry>,
    positions: HashMap<String, usize>,
}

impl Bucket {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry; names must be unique once backslashes become slashes
    pub fn add(&mut self, name: impl Into<String>, handle: Handle, content_type: ContentType) -> Result<()> {
        let name: String = name.into();
        let name = normalize_path(&name);
        if self.positions.contains_key(&name) {
            return Err(BundleError::DuplicateEntry(name));
        }

        self.positions.insert(name.clone(), self.entries.len());
        self.entries.push(BucketEntry {
            name,
            handle,
            content_type,
            missing: false,
        });
        Ok(())
    }

    pub fn add_bundle(&mut self, name: impl Into<String>, handle: Handle) -> Result<()> {
        self.add(name, handle, ContentType::Bundle)
    }

    pub fn add_resource(&mut self, name: impl Into<String>, handle: Handle) -> Result<()> {
        self.add(name, handle, ContentType::Resource)
    }

    /// Flag an entry as unchanged since the previous package version
    pub fn mark_missing(&mut self, name: &str) -> Result<()> {
        let position = *self
            .positions
            .get(&normalize_path(name))
            .ok_or_else(|| BundleError::EntryNotFound(name.to_string()))?;
        self.entries[position].missing = true;
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&BucketEntry> {
        self.positions
            .get(&normalize_path(name))
            .map(|&position| &self.entries[position])
    }

    pub fn iter(&self) -> impl Iterator<Item = &BucketEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl EntryIndex for Bucket {
    fn entries(&self) -> Vec<&str> {
        self.entries.iter().map(|entry| entry.name.as_str()).collect()
    }

    fn handle(&self, name: &str) -> Option<&Handle> {
        self.get(name).map(|entry| &entry.handle)
    }

    fn content_type(&self, name: &str) -> Option<ContentType> {
        self.get(name).map(|entry| entry.content_type)
    }

    fn is_missing(&self, name: &str) -> bool {
        self.get(name).is_some_and(|entry| entry.missing)
    }
}
