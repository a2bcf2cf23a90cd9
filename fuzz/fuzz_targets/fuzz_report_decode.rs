//! Fuzz target for report channel decoding.
//!
//! Arbitrary bytes, read against an arbitrary script shape, must decode to
//! records or an error, never a panic.

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use ctester::peer::{ChunkOutcome, ReportReader};

#[derive(Arbitrary, Debug)]
struct Input {
    shape: Vec<u8>,
    stream: Vec<u8>,
}

fuzz_target!(|input: Input| {
    let _ = ChunkOutcome::decode(&input.stream);

    let shape = input.shape.iter().map(|&n| n as usize).collect();
    let mut reader = ReportReader::new(&input.stream[..], shape);
    let _ = reader.read_report();
});
