// ── Transfer monitors ────────────────────────────────────────────────────────
//
// A ranged read streams remote bytes into a `BoundedSink` that never writes
// past the caller's buffer, while a `ProgressMonitor` is consulted after every
// chunk and can stop the transfer early.

use log::trace;
use std::io::{self, Write};

/// Observer of a streaming transfer.
pub trait ProgressMonitor {
    fn init(&mut self, _path: &str, _offset: u64) {}

    /// Called with the size of every chunk moved. Returning `false` stops
    /// the transfer after this chunk.
    fn count(&mut self, bytes: u64) -> bool;

    fn end(&mut self) {}
}

/// Stops a download once `max` bytes have been received.
#[derive(Debug, Clone)]
pub struct ReadLimitMonitor {
    received: u64,
    max: u64,
}

impl ReadLimitMonitor {
    pub fn new(max: u64) -> Self {
        Self { received: 0, max }
    }
}

impl ProgressMonitor for ReadLimitMonitor {
    fn init(&mut self, path: &str, offset: u64) {
        trace!("get {} offset {} limit {}", path, offset, self.max);
    }

    fn count(&mut self, bytes: u64) -> bool {
        self.received += bytes;
        self.received < self.max
    }

    fn end(&mut self) {
        trace!("get done, {} bytes", self.received);
    }
}

/// Counts uploaded bytes and never aborts.
#[derive(Debug, Clone, Default)]
pub struct CountingMonitor {
    sent: u64,
}

impl ProgressMonitor for CountingMonitor {
    fn init(&mut self, path: &str, offset: u64) {
        trace!("put {} offset {}", path, offset);
    }

    fn count(&mut self, bytes: u64) -> bool {
        self.sent += bytes;
        true
    }

    fn end(&mut self) {
        trace!("put done, {} bytes", self.sent);
    }
}

/// Write sink over a fixed buffer. Bytes past capacity are dropped.
pub struct BoundedSink<'a> {
    buffer: &'a mut [u8],
    filled: usize,
}

impl<'a> BoundedSink<'a> {
    pub fn new(buffer: &'a mut [u8]) -> Self {
        Self { buffer, filled: 0 }
    }

    /// Bytes copied into the buffer so far.
    pub fn received(&self) -> usize {
        self.filled
    }

    fn remaining(&self) -> usize {
        self.buffer.len() - self.filled
    }
}

impl Write for BoundedSink<'_> {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        let n = data.len().min(self.remaining());
        self.buffer[self.filled..self.filled + n].copy_from_slice(&data[..n]);
        self.filled += n;
        // Report the whole chunk as consumed so `write_all` does not spin on
        // a full buffer.
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
