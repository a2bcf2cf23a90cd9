//! Fuzz target for launch frame decoding.
//!
//! Tests that arbitrary byte sequences cannot cause panics when parsed as
//! a launch request.

#![no_main]

use libfuzzer_sys::fuzz_target;
use ctester::peer::decode_launch;

fuzz_target!(|data: &[u8]| {
    // Should never panic - only return Ok or Err.
    let _ = decode_launch(data);
});
