//! In-memory serial device.
//!
//! [`MemoryDevice`] implements [`SerialDevice`] without touching the
//! operating system. The paired [`MemoryDeviceHandle`] plays the far end of
//! the wire: it feeds inbound chunks, observes outbound writes and injects
//! failures.

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, unbounded};
use parking_lot::Mutex;
use std::io::{self, Read, Write};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use super::port::{DeviceDescriptor, SerialDevice};

/// How long an idle memory read blocks before reporting `TimedOut`.
const POLL_INTERVAL: Duration = Duration::from_millis(10);

enum Inbound {
    Data(Vec<u8>),
    Error(io::ErrorKind),
}

#[derive(Default)]
struct DeviceState {
    open: bool,
    open_calls: usize,
    close_calls: usize,
    last_descriptor: Option<DeviceDescriptor>,
    fail_open: Option<io::ErrorKind>,
    write_failures: usize,
    write_delay: Option<Duration>,
}

struct Shared {
    state: Mutex<DeviceState>,
    inbound_tx: Sender<Inbound>,
    inbound_rx: Receiver<Inbound>,
    written_tx: Sender<Vec<u8>>,
    written_rx: Receiver<Vec<u8>>,
}

impl Shared {
    fn is_open(&self) -> bool {
        self.state.lock().open
    }
}

/// Serial device that lives entirely in memory.
pub struct MemoryDevice {
    shared: Arc<Shared>,
}

/// Far end of a [`MemoryDevice`].
#[derive(Clone)]
pub struct MemoryDeviceHandle {
    shared: Arc<Shared>,
}

impl MemoryDevice {
    /// Creates a device and the handle that controls it.
    pub fn new() -> (Self, MemoryDeviceHandle) {
        let (inbound_tx, inbound_rx) = unbounded();
        let (written_tx, written_rx) = unbounded();
        let shared = Arc::new(Shared {
            state: Mutex::new(DeviceState::default()),
            inbound_tx,
            inbound_rx,
            written_tx,
            written_rx,
        });
        (
            Self {
                shared: shared.clone(),
            },
            MemoryDeviceHandle { shared },
        )
    }
}

impl SerialDevice for MemoryDevice {
    fn open(&mut self, descriptor: &DeviceDescriptor) -> io::Result<()> {
        let mut state = self.shared.state.lock();
        state.open_calls += 1;
        state.last_descriptor = Some(descriptor.clone());
        if let Some(kind) = state.fail_open {
            return Err(io::Error::new(kind, "memory device refused to open"));
        }
        state.open = true;
        Ok(())
    }

    fn reader(&mut self) -> io::Result<Box<dyn Read + Send>> {
        if !self.shared.is_open() {
            return Err(io::Error::new(
                io::ErrorKind::NotConnected,
                "Serial port is not initialized",
            ));
        }
        Ok(Box::new(MemoryReader {
            shared: self.shared.clone(),
            pending: Vec::new(),
        }))
    }

    fn writer(&mut self) -> io::Result<Box<dyn Write + Send>> {
        if !self.shared.is_open() {
            return Err(io::Error::new(
                io::ErrorKind::NotConnected,
                "Serial port is not initialized",
            ));
        }
        Ok(Box::new(MemoryWriter {
            shared: self.shared.clone(),
        }))
    }

    fn close(&mut self) {
        let mut state = self.shared.state.lock();
        state.close_calls += 1;
        state.open = false;
    }
}

impl MemoryDeviceHandle {
    /// Queues a chunk for the reader. Empty chunks are ignored.
    pub fn push_inbound(&self, bytes: &[u8]) {
        if !bytes.is_empty() {
            let _ = self.shared.inbound_tx.send(Inbound::Data(bytes.to_vec()));
        }
    }

    /// Makes the read after any already-queued chunks fail with `kind`.
    pub fn fail_read(&self, kind: io::ErrorKind) {
        let _ = self.shared.inbound_tx.send(Inbound::Error(kind));
    }

    /// Makes the next `count` writes fail.
    pub fn fail_writes(&self, count: usize) {
        self.shared.state.lock().write_failures = count;
    }

    /// Makes every open attempt fail with `kind`, or succeed again with `None`.
    pub fn fail_open(&self, kind: Option<io::ErrorKind>) {
        self.shared.state.lock().fail_open = kind;
    }

    /// Delays every write by `delay`.
    pub fn set_write_delay(&self, delay: Option<Duration>) {
        self.shared.state.lock().write_delay = delay;
    }

    /// Waits up to `timeout` for the next chunk written to the device.
    pub fn next_write(&self, timeout: Duration) -> Option<Vec<u8>> {
        self.shared.written_rx.recv_timeout(timeout).ok()
    }

    /// Drains every chunk written so far.
    pub fn writes(&self) -> Vec<Vec<u8>> {
        self.shared.written_rx.try_iter().collect()
    }

    pub fn is_open(&self) -> bool {
        self.shared.is_open()
    }

    pub fn open_calls(&self) -> usize {
        self.shared.state.lock().open_calls
    }

    pub fn close_calls(&self) -> usize {
        self.shared.state.lock().close_calls
    }

    pub fn last_descriptor(&self) -> Option<DeviceDescriptor> {
        self.shared.state.lock().last_descriptor.clone()
    }
}

struct MemoryReader {
    shared: Arc<Shared>,
    pending: Vec<u8>,
}

impl Read for MemoryReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if !self.shared.is_open() {
            return Ok(0);
        }
        if self.pending.is_empty() {
            match self.shared.inbound_rx.recv_timeout(POLL_INTERVAL) {
                Ok(Inbound::Data(data)) => self.pending = data,
                Ok(Inbound::Error(kind)) => {
                    return Err(io::Error::new(kind, "memory device read failure"));
                }
                Err(RecvTimeoutError::Timeout) => {
                    return Err(io::Error::new(io::ErrorKind::TimedOut, "no data"));
                }
                Err(RecvTimeoutError::Disconnected) => return Ok(0),
            }
        }
        let n = buf.len().min(self.pending.len());
        buf[..n].copy_from_slice(&self.pending[..n]);
        self.pending.drain(..n);
        Ok(n)
    }
}

struct MemoryWriter {
    shared: Arc<Shared>,
}

impl Write for MemoryWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let delay = self.shared.state.lock().write_delay;
        if let Some(delay) = delay {
            thread::sleep(delay);
        }
        let mut state = self.shared.state.lock();
        if !state.open {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "closed"));
        }
        if state.write_failures > 0 {
            state.write_failures -= 1;
            return Err(io::Error::other("memory device write failure"));
        }
        self.shared
            .written_tx
            .send(buf.to_vec())
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "closed"))?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn opened() -> (MemoryDevice, MemoryDeviceHandle) {
        let (mut device, handle) = MemoryDevice::new();
        device
            .open(&DeviceDescriptor::new("/dev/mem0", 9600))
            .expect("memory device opens");
        (device, handle)
    }

    #[test]
    fn test_streams_require_open() {
        let (mut device, _handle) = MemoryDevice::new();
        assert!(device.reader().is_err());
        assert!(device.writer().is_err());
    }

    #[test]
    fn test_read_splits_large_chunk() {
        let (mut device, handle) = opened();
        let mut reader = device.reader().unwrap();
        handle.push_inbound(b"abcdef");

        let mut buf = [0u8; 4];
        assert_eq!(reader.read(&mut buf).unwrap(), 4);
        assert_eq!(&buf, b"abcd");
        assert_eq!(reader.read(&mut buf).unwrap(), 2);
        assert_eq!(&buf[..2], b"ef");
    }

    #[test]
    fn test_idle_read_times_out() {
        let (mut device, _handle) = opened();
        let mut reader = device.reader().unwrap();
        let mut buf = [0u8; 8];
        let err = reader.read(&mut buf).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::TimedOut);
    }

    #[test]
    fn test_read_after_close_is_end_of_stream() {
        let (mut device, handle) = opened();
        let mut reader = device.reader().unwrap();
        handle.push_inbound(b"late");
        device.close();
        let mut buf = [0u8; 8];
        assert_eq!(reader.read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn test_injected_write_failure() {
        let (mut device, handle) = opened();
        let mut writer = device.writer().unwrap();
        handle.fail_writes(1);
        assert!(writer.write_all(b"x").is_err());
        writer.write_all(b"y").unwrap();
        assert_eq!(handle.writes(), vec![b"y".to_vec()]);
    }

    #[test]
    fn test_fail_open_records_attempt() {
        let (mut device, handle) = MemoryDevice::new();
        handle.fail_open(Some(io::ErrorKind::PermissionDenied));
        let descriptor = DeviceDescriptor::new("/dev/mem1", 57600);
        assert!(device.open(&descriptor).is_err());
        assert_eq!(handle.open_calls(), 1);
        assert_eq!(handle.last_descriptor(), Some(descriptor));
        assert!(!handle.is_open());
    }
}
