#![no_main]

use libfuzzer_sys::fuzz_target;
use tinybundles::Manifest;

fuzz_target!(|data: &[u8]| {
    let manifest = match Manifest::parse(data) {
        Ok(m) => m,
        Err(_) => return, // Expected for invalid text
    };

    // Writing is canonical: parsing our own output and writing it again
    // reproduces the same bytes
    if let Ok(bytes) = manifest.to_bytes() {
        let reparsed = Manifest::parse(&bytes).expect("written manifest must parse");
        assert_eq!(reparsed.to_bytes().expect("reparsed manifest must write"), bytes);
    }
});
