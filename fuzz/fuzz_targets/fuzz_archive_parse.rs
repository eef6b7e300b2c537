#![no_main]

use libfuzzer_sys::fuzz_target;
use tinybundles::{read_manifest, ArchiveStreamReader};

fuzz_target!(|data: &[u8]| {
    // Manifest probing must never panic on arbitrary resources
    let _ = read_manifest(data);

    // Walk every entry, then the central directory
    let mut reader = ArchiveStreamReader::new(data);
    loop {
        match reader.next_entry() {
            Ok(Some(_)) => continue,
            Ok(None) => break,
            Err(_) => return, // Expected for corrupted data
        }
    }
    let _ = reader.finish();
});
