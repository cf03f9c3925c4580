use log::{debug, info};
use std::fmt;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio_serial::{DataBits, FlowControl, Parity, SerialPort, StopBits};

use super::settings::DEFAULT_READ_TIMEOUT;

/// What to open: device node path, baud rate and driver flags.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct DeviceDescriptor {
    pub path: PathBuf,
    pub baud_rate: u32,
    /// Passed through to the device backend untouched. What they mean is up
    /// to the backend; [`NativeSerialDevice`] does not apply them.
    pub flags: i32,
}

impl DeviceDescriptor {
    pub fn new(path: impl Into<PathBuf>, baud_rate: u32) -> Self {
        Self {
            path: path.into(),
            baud_rate,
            flags: 0,
        }
    }

    #[must_use]
    pub fn with_flags(mut self, flags: i32) -> Self {
        self.flags = flags;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl fmt::Display for DeviceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} @ {} baud", self.path.display(), self.baud_rate)
    }
}

/// serial port state
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PortState {
    /// no connection, no workers
    Closed,
    /// device open, both workers started
    Open,
}

impl PortState {
    /// serial port is open
    pub fn is_open(&self) -> bool {
        matches!(self, PortState::Open)
    }

    /// serial port is closed
    pub fn is_closed(&self) -> bool {
        matches!(self, PortState::Closed)
    }
}

impl fmt::Display for PortState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PortState::Closed => write!(f, "closed"),
            PortState::Open => write!(f, "open"),
        }
    }
}

/// The platform serial device.
///
/// One implementation talks to real hardware ([`NativeSerialDevice`]), the
/// other lives in memory ([`MemoryDevice`](super::MemoryDevice)).
///
/// The reader returned by [`reader`](SerialDevice::reader) must not block
/// forever when idle: it should return `TimedOut`, `WouldBlock` or
/// `Interrupted` periodically, or `Ok(0)` once the device is closed, so the
/// read worker can observe a stop request.
///
/// [`DeviceDescriptor::flags`] reach [`open`](SerialDevice::open) as given.
/// Applying them is optional.
#[cfg_attr(test, mockall::automock)]
pub trait SerialDevice: Send {
    /// Opens the device described by `descriptor`.
    fn open(&mut self, descriptor: &DeviceDescriptor) -> io::Result<()>;

    /// Readable side of the open device.
    fn reader(&mut self) -> io::Result<Box<dyn Read + Send>>;

    /// Writable side of the open device.
    fn writer(&mut self) -> io::Result<Box<dyn Write + Send>>;

    /// Releases the device. Calling it on a closed device does nothing.
    fn close(&mut self);
}

fn not_open() -> io::Error {
    io::Error::new(io::ErrorKind::NotConnected, "Serial port is not initialized")
}

/// Serial device backed by the operating system's tty driver.
///
/// Opens 8N1 without flow control. The reader and writer are independent
/// clones of the port handle.
///
/// Open flags are ignored (logged at debug level): `serialport` opens the
/// node with its own fixed flags.
pub struct NativeSerialDevice {
    read_timeout: Duration,
    port: Option<Box<dyn SerialPort>>,
}

impl NativeSerialDevice {
    pub fn new(read_timeout: Duration) -> Self {
        Self {
            read_timeout,
            port: None,
        }
    }

    fn port(&self) -> io::Result<&dyn SerialPort> {
        self.port.as_deref().ok_or_else(not_open)
    }
}

impl Default for NativeSerialDevice {
    fn default() -> Self {
        Self::new(DEFAULT_READ_TIMEOUT)
    }
}

impl SerialDevice for NativeSerialDevice {
    fn open(&mut self, descriptor: &DeviceDescriptor) -> io::Result<()> {
        self.close();
        if descriptor.flags != 0 {
            debug!(
                "Open flags {:#x} for {} are left to the driver defaults",
                descriptor.flags,
                descriptor.path.display()
            );
        }
        let port = tokio_serial::new(descriptor.path.to_string_lossy(), descriptor.baud_rate)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .timeout(self.read_timeout)
            .open()?;
        info!("Opened serial port {descriptor}");
        self.port = Some(port);
        Ok(())
    }

    fn reader(&mut self) -> io::Result<Box<dyn Read + Send>> {
        let half = self.port()?.try_clone()?;
        Ok(Box::new(PortHalf(half)))
    }

    fn writer(&mut self) -> io::Result<Box<dyn Write + Send>> {
        let half = self.port()?.try_clone()?;
        Ok(Box::new(PortHalf(half)))
    }

    fn close(&mut self) {
        if let Some(port) = self.port.take() {
            debug!(
                "Closing serial port {}",
                port.name().unwrap_or_else(|| "<unnamed>".to_string())
            );
        }
    }
}

/// One cloned handle of a native port, used as either the readable or the
/// writable side.
struct PortHalf(Box<dyn SerialPort>);

impl Read for PortHalf {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.0.read(buf)
    }
}

impl Write for PortHalf {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.0.flush()
    }
}
