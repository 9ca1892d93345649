#![no_main]
// SPDX-License-Identifier: MIT OR Apache-2.0
//! libFuzzer target for columnar header decoding
//!
//! Tests:
//! - FlatHeader::decode on arbitrary input
//! - No panics on truncated or malformed prefixes
//! - A decoded header re-encodes and decodes to itself

use gridbench_store::flat::FlatHeader;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Skip overly large inputs
    if data.len() > 1_000_000 {
        return;
    }

    if let Ok((header, offset)) = FlatHeader::decode(data) {
        assert_eq!(offset % 8, 0);
        let encoded = header.encode().expect("decoded header re-encodes");
        let (again, again_offset) = FlatHeader::decode(&encoded).expect("round trip");
        assert_eq!(again, header);
        assert_eq!(again_offset, encoded.len());
    }
});
