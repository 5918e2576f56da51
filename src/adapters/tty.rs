//! Serial device transport for running the MCTP stack in user space.
//!
//! ```text
//!   /dev/ttyUSB0 ──read──▶ reader thread ──▶ rx queue ──▶ Transport::read
//!   /dev/ttyUSB0 ◀─write── Transport::write
//! ```
//!
//! Reads on a tty block, so a reader thread moves bytes into a queue and
//! [`Transport::read`] never waits. Line settings come from `stty`, the
//! same way the link adapter drives the `mctp` tool.

use std::collections::VecDeque;
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Write};
use std::process::{Command, Stdio};
use std::sync::{Arc, Mutex};
use std::thread;

use log::{debug, warn};

use crate::error::{LinkError, Result};
use crate::mctp::transport::Transport;

pub const DEFAULT_BAUD: u32 = 115_200;

/// `stty` invocation putting `device` in raw 8N1 mode at `baud`.
pub fn stty_args(device: &str, baud: u32) -> Vec<String> {
    let baud = baud.to_string();
    ["stty", "-F", device, baud.as_str(), "raw", "-echo", "cs8", "-cstopb", "-parenb"]
        .map(String::from)
        .to_vec()
}

type RxQueue = Arc<Mutex<VecDeque<u8>>>;

pub struct TtyTransport {
    device: String,
    port: File,
    rx: RxQueue,
}

impl TtyTransport {
    /// Configure `device` with `stty` and open it for reading and writing.
    pub fn open(device: &str, baud: u32) -> Result<Self> {
        let argv = stty_args(device, baud);
        let status = Command::new(&argv[0])
            .args(&argv[1..])
            .stdin(Stdio::null())
            .status()
            .map_err(|_| LinkError::CommandFailed("stty"))?;
        if !status.success() {
            return Err(LinkError::CommandFailed("stty").into());
        }
        let port = OpenOptions::new()
            .read(true)
            .write(true)
            .open(device)
            .map_err(|_| LinkError::DeviceNotFound)?;
        Self::from_file(device, port)
    }

    /// Wrap an already-open file. The reader thread gets its own handle.
    pub fn from_file(device: &str, port: File) -> Result<Self> {
        let reader = port.try_clone().map_err(|_| LinkError::Transport)?;
        let rx = RxQueue::default();
        let queue = rx.clone();
        let name = device.to_string();
        thread::Builder::new()
            .name(format!("tty-rx {device}"))
            .spawn(move || read_loop(&name, reader, &queue))
            .map_err(|_| LinkError::Transport)?;
        Ok(Self {
            device: device.to_string(),
            port,
            rx,
        })
    }

    pub fn device(&self) -> &str {
        &self.device
    }
}

// Ends on EOF or a read error; a blocked read outlives the transport
// until the process exits.
fn read_loop(device: &str, mut reader: File, queue: &RxQueue) {
    let mut buf = [0u8; 256];
    loop {
        match reader.read(&mut buf) {
            Ok(0) => {
                debug!("serial[{}]: end of input", device);
                return;
            }
            Ok(n) => match queue.lock() {
                Ok(mut q) => q.extend(&buf[..n]),
                Err(_) => return,
            },
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => {
                warn!("serial[{}]: read failed: {}", device, e);
                return;
            }
        }
    }
}

impl Transport for TtyTransport {
    type Error = io::Error;

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut q = self
            .rx
            .lock()
            .map_err(|_| io::Error::other("rx queue poisoned"))?;
        let n = buf.len().min(q.len());
        for (slot, byte) in buf.iter_mut().zip(q.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }

    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.port.write_all(data)?;
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.port.flush()
    }

    fn available(&self) -> bool {
        self.rx.lock().map(|q| !q.is_empty()).unwrap_or(false)
    }
}
