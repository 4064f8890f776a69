// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The abstract byte transport a [`crate::channel::Channel`] drives.
//!
//! This core performs no I/O of its own; callers supply a `LinkTransport`
//! (a TCP socket, a serial port, a TLS stream, an in-memory pipe for tests)
//! and the channel's reader/writer threads call into it.

use std::io;
use std::sync::atomic::{AtomicU64, Ordering};

/// A duplex byte stream carrying link-layer frames.
///
/// Implementations need not be internally buffered; the channel's [`crate::link::Deframer`]
/// handles partial reads. `read` should block until at least one byte is
/// available and return an empty vector only to signal a graceful close.
pub trait LinkTransport: Send {
    /// Block until new bytes arrive, or return an error on I/O failure.
    fn read(&mut self) -> io::Result<Vec<u8>>;

    /// Write `buf` in full, or return an error.
    fn write(&mut self, buf: &[u8]) -> io::Result<()>;

    /// Release any underlying resource (socket, file descriptor) and unblock
    /// a concurrently-blocked `read`. Called once, from the channel's
    /// shutdown path.
    fn close(&mut self);
}

/// Cumulative byte counters for one channel's transport, safe to snapshot
/// from any thread while the reader/writer loops run concurrently.
#[derive(Debug, Default)]
pub struct TransportStats {
    pub bytes_read: AtomicU64,
    pub bytes_written: AtomicU64,
    pub read_errors: AtomicU64,
    pub write_errors: AtomicU64,
}

impl TransportStats {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A point-in-time copy of the counters.
    #[must_use]
    pub fn snapshot(&self) -> TransportStatsSnapshot {
        TransportStatsSnapshot {
            bytes_read: self.bytes_read.load(Ordering::Relaxed),
            bytes_written: self.bytes_written.load(Ordering::Relaxed),
            read_errors: self.read_errors.load(Ordering::Relaxed),
            write_errors: self.write_errors.load(Ordering::Relaxed),
        }
    }

    pub(crate) fn record_read(&self, bytes: usize) {
        self.bytes_read.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_write(&self, bytes: usize) {
        self.bytes_written.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_read_error(&self) {
        self.read_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_write_error(&self) {
        self.write_errors.fetch_add(1, Ordering::Relaxed);
    }
}

/// Snapshot returned by [`TransportStats::snapshot`]; plain data, no atomics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransportStatsSnapshot {
    pub bytes_read: u64,
    pub bytes_written: u64,
    pub read_errors: u64,
    pub write_errors: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    struct MemoryTransport {
        inbound: VecDeque<Vec<u8>>,
        pub outbound: Vec<u8>,
        closed: bool,
    }

    impl LinkTransport for MemoryTransport {
        fn read(&mut self) -> io::Result<Vec<u8>> {
            if self.closed {
                return Ok(Vec::new());
            }
            Ok(self.inbound.pop_front().unwrap_or_default())
        }

        fn write(&mut self, buf: &[u8]) -> io::Result<()> {
            self.outbound.extend_from_slice(buf);
            Ok(())
        }

        fn close(&mut self) {
            self.closed = true;
        }
    }

    #[test]
    fn stats_accumulate_across_calls() {
        let stats = TransportStats::new();
        stats.record_read(10);
        stats.record_read(5);
        stats.record_write(3);
        stats.record_write_error();
        let snap = stats.snapshot();
        assert_eq!(snap.bytes_read, 15);
        assert_eq!(snap.bytes_written, 3);
        assert_eq!(snap.write_errors, 1);
    }

    #[test]
    fn memory_transport_round_trips() {
        let mut t = MemoryTransport { inbound: VecDeque::from([vec![1, 2, 3]]), outbound: Vec::new(), closed: false };
        assert_eq!(t.read().unwrap(), vec![1, 2, 3]);
        t.write(&[9, 9]).unwrap();
        assert_eq!(t.outbound, vec![9, 9]);
        t.close();
        assert_eq!(t.read().unwrap(), Vec::<u8>::new());
    }
}
