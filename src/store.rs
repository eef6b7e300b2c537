//! Byte sources for bundle entries
//!
//! Entry content comes either from a [`Locator`] (a file path or bytes held in
//! memory) or from a [`ContentStore`] keyed by the SHA-256 of the content.
//! Every source can be opened any number of times; each call returns an
//! independent reader. The deployment package builder relies on this: it
//! opens each entry once to read its embedded manifest and again to copy it.

use crate::error::{BundleError, Result};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fmt;
use std::fs::File;
use std::io::{self, BufReader, Cursor, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use tempfile::NamedTempFile;
use tracing::debug;

/// Readable content handed out by a source
pub type ByteReader = Box<dyn Read + Send>;

/// Content address: lowercase hex SHA-256 of the stored bytes
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Handle(String);

impl Handle {
    /// Handle for the given content
    pub fn for_content(data: &[u8]) -> Self {
        Handle(hex::encode(Sha256::digest(data)))
    }

    /// Parse a hex-encoded handle
    pub fn from_hex(value: &str) -> Result<Self> {
        let bytes = hex::decode(value)
            .map_err(|_| BundleError::UnknownHandle(value.to_string()))?;
        if bytes.len() != 32 {
            return Err(BundleError::UnknownHandle(value.to_string()));
        }
        Ok(Handle(value.to_ascii_lowercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Content-addressable store
pub trait ContentStore: Send + Sync {
    /// Store everything the reader yields and return its address
    fn store(&self, content: &mut dyn Read) -> Result<Handle>;

    /// Open stored content; callable repeatedly for the same handle
    fn open(&self, handle: &Handle) -> Result<ByteReader>;

    fn contains(&self, handle: &Handle) -> bool;
}

/// In-memory store
#[derive(Default)]
pub struct MemoryStore {
    objects: RwLock<HashMap<Handle, Arc<[u8]>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a byte slice
    pub fn store_bytes(&self, data: &[u8]) -> Handle {
        let handle = Handle::for_content(data);
        let mut objects = self.objects.write().unwrap_or_else(|e| e.into_inner());
        objects
            .entry(handle.clone())
            .or_insert_with(|| Arc::from(data));
        handle
    }

    pub fn len(&self) -> usize {
        self.objects.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ContentStore for MemoryStore {
    fn store(&self, content: &mut dyn Read) -> Result<Handle> {
        let mut data = Vec::new();
        content.read_to_end(&mut data)?;
        Ok(self.store_bytes(&data))
    }

    fn open(&self, handle: &Handle) -> Result<ByteReader> {
        let objects = self.objects.read().unwrap_or_else(|e| e.into_inner());
        let data = objects
            .get(handle)
            .cloned()
            .ok_or_else(|| BundleError::UnknownHandle(handle.to_string()))?;
        Ok(Box::new(Cursor::new(data)))
    }

    fn contains(&self, handle: &Handle) -> bool {
        self.objects
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .contains_key(handle)
    }
}

/// Store keeping one file per object under a root directory
///
/// Objects are written to a temporary file in the same directory and moved
/// into place once complete, so a reader never sees a partial object.
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    /// Open a store rooted at `root`, creating the directory if needed
    pub fn open<P: AsRef<Path>>(root: P) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn object_path(&self, handle: &Handle) -> PathBuf {
        self.root.join(handle.as_str())
    }
}

impl ContentStore for FileStore {
    fn store(&self, content: &mut dyn Read) -> Result<Handle> {
        let mut temp = NamedTempFile::new_in(&self.root)?;
        let mut hasher = Sha256::new();
        let mut buffer = [0u8; 8192];

        loop {
            let n = match content.read(&mut buffer) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            };
            hasher.update(&buffer[..n]);
            temp.write_all(&buffer[..n])?;
        }
        temp.flush()?;

        let handle = Handle(hex::encode(hasher.finalize()));
        let path = self.object_path(&handle);
        if path.exists() {
            debug!("Object {} already stored", handle);
        } else {
            temp.persist(&path).map_err(|e| BundleError::Io(e.error))?;
            debug!("Stored object {} at {}", handle, path.display());
        }

        Ok(handle)
    }

    fn open(&self, handle: &Handle) -> Result<ByteReader> {
        match File::open(self.object_path(handle)) {
            Ok(file) => Ok(Box::new(BufReader::new(file))),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                Err(BundleError::UnknownHandle(handle.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    fn contains(&self, handle: &Handle) -> bool {
        self.object_path(handle).is_file()
    }
}

/// Where a raw bundle resource's bytes come from
#[derive(Clone)]
pub enum Locator {
    /// File on disk, opened fresh on every read
    Path(PathBuf),
    /// Bytes held in memory
    Bytes(Arc<[u8]>),
    /// Object in a content store
    Stored {
        store: Arc<dyn ContentStore>,
        handle: Handle,
    },
}

impl Locator {
    pub fn path<P: Into<PathBuf>>(path: P) -> Self {
        Locator::Path(path.into())
    }

    pub fn bytes(data: impl Into<Vec<u8>>) -> Self {
        let data: Vec<u8> = data.into();
        Locator::Bytes(Arc::from(data))
    }

    pub fn stored(store: Arc<dyn ContentStore>, handle: Handle) -> Self {
        Locator::Stored { store, handle }
    }

    /// Open an independent reader over the content
    pub fn open(&self) -> Result<ByteReader> {
        match self {
            Locator::Path(path) => Ok(Box::new(BufReader::new(File::open(path)?))),
            Locator::Bytes(data) => Ok(Box::new(Cursor::new(Arc::clone(data)))),
            Locator::Stored { store, handle } => store.open(handle),
        }
    }
}

impl fmt::Debug for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Locator::Path(path) => f.debug_tuple("Path").field(path).finish(),
            Locator::Bytes(data) => write!(f, "Bytes({} bytes)", data.len()),
            Locator::Stored { handle, .. } => f.debug_tuple("Stored").field(handle).finish(),
        }
    }
}
