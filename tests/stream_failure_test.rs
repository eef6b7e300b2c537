//! Streaming failure handling
//!
//! A resource that cannot be read while the archive is being written either
//! fails the consumer's read (default) or ends the archive early.

use std::io::{self, Read};
use std::sync::Arc;
use tinybundles::{
    ArchiveStreamReader, Bucket, BuildConfig, BundleError, ByteReader, ContentStore,
    DeploymentPackageBuilder, Handle, Locator, MemoryStore, RawBuilder, StreamFailurePolicy,
    MANIFEST_NAME,
};

fn resources_with_gap() -> Vec<(&'static str, Locator)> {
    vec![
        ("a.txt", Locator::bytes("alpha")),
        ("b.txt", Locator::path("/nonexistent/tinybundles/b.txt")),
        ("c.txt", Locator::bytes("gamma")),
    ]
}

#[test]
fn test_failure_propagates_to_reader() {
    let mut stream = RawBuilder::new()
        .build(resources_with_gap(), Vec::<(String, String)>::new())
        .unwrap();

    let mut bytes = Vec::new();
    let err = stream.read_to_end(&mut bytes).unwrap_err();
    assert_eq!(err.kind(), io::ErrorKind::Other);
    assert!(err.to_string().contains("b.txt"));

    let result = stream.finish();
    assert!(matches!(result, Err(BundleError::StreamFailed { entry, .. }) if entry == "b.txt"));

    // What arrived before the failure is a valid prefix without a directory
    let mut reader = ArchiveStreamReader::new(&bytes[..]);
    assert_eq!(reader.next_entry().unwrap().unwrap().name, MANIFEST_NAME);
    assert_eq!(reader.next_entry().unwrap().unwrap().name, "a.txt");
    assert!(reader.next_entry().is_err());
}

#[test]
fn test_truncate_policy_ends_cleanly() {
    let config = BuildConfig::default().with_failure_policy(StreamFailurePolicy::Truncate);
    let mut stream = RawBuilder::with_config(config)
        .build(resources_with_gap(), Vec::<(String, String)>::new())
        .unwrap();

    // Consumer sees ordinary end of stream
    let mut bytes = Vec::new();
    stream.read_to_end(&mut bytes).unwrap();

    // The producer still reports what happened
    assert!(matches!(stream.finish(), Err(BundleError::StreamFailed { .. })));

    // Archive is well formed but stops before the failed entry
    let directory = ArchiveStreamReader::new(&bytes[..]).finish().unwrap();
    let names: Vec<&str> = directory.iter().map(|e| e.name.as_str()).collect();
    assert_eq!(names, vec![MANIFEST_NAME, "a.txt"]);
}

/// Store whose objects fail after 10 000 bytes
struct FlakyStore {
    inner: MemoryStore,
}

struct FailingReader {
    remaining: usize,
}

impl Read for FailingReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.remaining == 0 {
            return Err(io::Error::new(io::ErrorKind::ConnectionReset, "backend went away"));
        }
        let n = self.remaining.min(buf.len());
        buf[..n].fill(b'x');
        self.remaining -= n;
        Ok(n)
    }
}

impl ContentStore for FlakyStore {
    fn store(&self, content: &mut dyn Read) -> tinybundles::Result<Handle> {
        self.inner.store(content)
    }

    fn open(&self, _handle: &Handle) -> tinybundles::Result<ByteReader> {
        Ok(Box::new(FailingReader { remaining: 10_000 }))
    }

    fn contains(&self, handle: &Handle) -> bool {
        self.inner.contains(handle)
    }
}

#[test]
fn test_mid_entry_failure_in_deployment_package() {
    let inner = MemoryStore::new();
    let handle = inner.store_bytes(b"resource payload");
    let store = Arc::new(FlakyStore { inner });

    let mut bucket = Bucket::new();
    bucket.add_resource("data.bin", handle).unwrap();

    let mut stream = DeploymentPackageBuilder::new()
        .build(Vec::<(String, String)>::new(), store, &bucket)
        .unwrap();

    let mut bytes = Vec::new();
    let err = stream.read_to_end(&mut bytes).unwrap_err();
    assert!(err.to_string().contains("backend went away"));

    match stream.finish() {
        Err(BundleError::StreamFailed { entry, message }) => {
            assert_eq!(entry, "data.bin");
            assert!(message.contains("backend went away"));
        }
        other => panic!("unexpected outcome: {:?}", other),
    }
}

#[test]
fn test_truncate_policy_keeps_partial_entry_consistent() {
    let inner = MemoryStore::new();
    let handle = inner.store_bytes(b"resource payload");
    let store = Arc::new(FlakyStore { inner });

    let resources = vec![
        ("a.txt", Locator::bytes("alpha")),
        ("data.bin", Locator::stored(store, handle)),
        ("c.txt", Locator::bytes("gamma")),
    ];
    let config = BuildConfig::default().with_failure_policy(StreamFailurePolicy::Truncate);
    let mut stream = RawBuilder::with_config(config)
        .build(resources, Vec::<(String, String)>::new())
        .unwrap();

    let mut bytes = Vec::new();
    stream.read_to_end(&mut bytes).unwrap();
    assert!(matches!(
        stream.finish(),
        Err(BundleError::StreamFailed { entry, .. }) if entry == "data.bin"
    ));

    // The entry cut short mid-copy is closed with matching CRC and sizes
    let mut reader = ArchiveStreamReader::new(&bytes[..]);
    assert_eq!(reader.next_entry().unwrap().unwrap().name, MANIFEST_NAME);
    assert_eq!(reader.next_entry().unwrap().unwrap().name, "a.txt");
    let partial = reader.next_entry().unwrap().unwrap();
    assert_eq!(partial.name, "data.bin");
    assert_eq!(partial.data, vec![b'x'; 10_000]);

    let directory = reader.finish().unwrap();
    assert_eq!(directory.len(), 3);
    assert_eq!(directory[2].uncompressed_size, 10_000);
}
