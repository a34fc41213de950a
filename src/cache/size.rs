//! Approximate value footprint: the length of the compact JSON encoding.

use std::io::{self, Write};

use serde_json::Value;

/// A writer that only counts bytes.
#[derive(Default)]
struct ByteCounter(usize);

impl Write for ByteCounter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0 += buf.len();
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Estimated size of `value` in bytes.
pub fn estimate(value: &Value) -> usize {
    let mut counter = ByteCounter::default();
    // Serializing a `Value` into an infallible writer cannot fail.
    match serde_json::to_writer(&mut counter, value) {
        Ok(()) => counter.0,
        Err(_) => 0,
    }
}
