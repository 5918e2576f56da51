//! Transport abstraction for any byte-oriented channel under a serial
//! binding.
//!
//! Concrete implementations:
//! - `NullTransport`, which discards writes and never reads
//! - `LoopbackTransport`, an in-memory crossed pair for tests and
//!   simulated buses
//!
//! Links and the I/O task are generic over `Transport`, so adding a new
//! byte channel requires no changes to the MCTP logic.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

/// Byte-oriented transport channel.
pub trait Transport {
    /// Error type for this transport.
    type Error: core::fmt::Debug;

    /// Read up to `buf.len()` bytes into `buf`.
    /// Returns the number of bytes actually read.
    /// Returns 0 if no data is available (non-blocking).
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error>;

    /// Write `data` to the transport.
    /// Returns the number of bytes actually written.
    fn write(&mut self, data: &[u8]) -> Result<usize, Self::Error>;

    /// Flush any buffered output.
    fn flush(&mut self) -> Result<(), Self::Error>;

    /// Check if data is available for reading.
    fn available(&self) -> bool;
}

/// A null transport that discards all writes and never reads.
pub struct NullTransport;

impl Transport for NullTransport {
    type Error = ();

    fn read(&mut self, _buf: &mut [u8]) -> Result<usize, ()> {
        Ok(0)
    }

    fn write(&mut self, data: &[u8]) -> Result<usize, ()> {
        Ok(data.len())
    }

    fn flush(&mut self) -> Result<(), ()> {
        Ok(())
    }

    fn available(&self) -> bool {
        false
    }
}

type Pipe = Arc<Mutex<VecDeque<u8>>>;

/// One end of an in-memory byte pipe. Cloneable and `Send`, so the two
/// ends may live on different threads.
#[derive(Clone, Default)]
pub struct LoopbackTransport {
    rx: Pipe,
    tx: Pipe,
}

/// Create two transports wired back to back.
pub fn loopback_pair() -> (LoopbackTransport, LoopbackTransport) {
    let a: Pipe = Arc::default();
    let b: Pipe = Arc::default();
    (
        LoopbackTransport {
            rx: a.clone(),
            tx: b.clone(),
        },
        LoopbackTransport { rx: b, tx: a },
    )
}

impl LoopbackTransport {
    /// Bytes queued for this end to read.
    pub fn pending(&self) -> usize {
        self.rx.lock().map(|q| q.len()).unwrap_or(0)
    }

    /// Inject raw bytes as if the peer had written them.
    pub fn inject(&self, data: &[u8]) {
        if let Ok(mut q) = self.rx.lock() {
            q.extend(data);
        }
    }
}

impl Transport for LoopbackTransport {
    type Error = ();

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, ()> {
        let mut q = self.rx.lock().map_err(|_| ())?;
        let n = buf.len().min(q.len());
        for (dst, src) in buf.iter_mut().zip(q.drain(..n)) {
            *dst = src;
        }
        Ok(n)
    }

    fn write(&mut self, data: &[u8]) -> Result<usize, ()> {
        self.tx.lock().map_err(|_| ())?.extend(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> Result<(), ()> {
        Ok(())
    }

    fn available(&self) -> bool {
        self.pending() > 0
    }
}
