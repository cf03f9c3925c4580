//! Connection lifecycle.
//!
//! [`SerialPortManager`] owns the device and the two workers. `open` and
//! `close` block while workers are started or joined; `send` only enqueues.

use log::{info, warn};
use parking_lot::{Mutex, MutexGuard, RwLock};
use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use super::listener::{DataListener, ListenerSlot, Listeners, OpenListener, OpenStatus};
use super::permission::{DevicePermissions, SuPermissions};
use super::port::{DeviceDescriptor, NativeSerialDevice, PortState, SerialDevice};
use super::read::ReadWorker;
use super::send::{SendQueue, SendWorker};
use super::settings::ManagerConfig;
use crate::error::{OpenError, Result};

/// What the manager holds while a connection is live.
struct Connection {
    device: Box<dyn SerialDevice>,
    /// set once `device.open` has been called, cleared by `close`
    device_active: bool,
    descriptor: Option<DeviceDescriptor>,
    send_worker: Option<SendWorker>,
    read_worker: Option<ReadWorker>,
}

/// Workers detached from a connection, stopped outside the connection lock.
struct Teardown {
    descriptor: Option<DeviceDescriptor>,
    send_worker: Option<SendWorker>,
    read_worker: Option<ReadWorker>,
}

impl Connection {
    fn is_live(&self) -> bool {
        self.device_active
            || self.descriptor.is_some()
            || self.send_worker.is_some()
            || self.read_worker.is_some()
    }

    /// Signals the device to close and detaches the workers.
    fn take(&mut self) -> Teardown {
        if self.device_active {
            self.device.close();
            self.device_active = false;
        }
        Teardown {
            descriptor: self.descriptor.take(),
            send_worker: self.send_worker.take(),
            read_worker: self.read_worker.take(),
        }
    }
}

impl Teardown {
    fn finish(mut self) {
        if let Some(mut worker) = self.send_worker.take() {
            worker.stop();
        }
        if let Some(mut worker) = self.read_worker.take() {
            worker.stop();
        }
        if let Some(descriptor) = self.descriptor {
            info!("Closed serial port {descriptor}");
        }
    }
}

/// Opens a serial device and runs its reader and writer threads.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use serial_link::prelude::*;
///
/// let (device, wire) = MemoryDevice::new();
/// let manager =
///     SerialPortManager::with_device(device, Unrestricted, ManagerConfig::default()).unwrap();
///
/// manager.open(DeviceDescriptor::new("/dev/ttyMEM0", 115200)).unwrap();
/// assert!(manager.send(b"AT\r\n"));
/// assert_eq!(wire.next_write(Duration::from_secs(1)), Some(b"AT\r\n".to_vec()));
///
/// manager.close();
/// assert!(!manager.send(b"AT\r\n"));
/// ```
pub struct SerialPortManager {
    config: ManagerConfig,
    permissions: Box<dyn DevicePermissions>,
    connection: Mutex<Connection>,
    queue: RwLock<Option<SendQueue>>,
    listeners: Listeners,
}

impl SerialPortManager {
    /// Manager for real serial ports with the default settings.
    pub fn new() -> Self {
        let config = ManagerConfig::default();
        Self::build(
            Box::new(NativeSerialDevice::new(config.read_timeout)),
            Box::new(SuPermissions::new(config.su_path.clone())),
            config,
        )
    }

    /// Manager for real serial ports.
    pub fn with_config(config: ManagerConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::build(
            Box::new(NativeSerialDevice::new(config.read_timeout)),
            Box::new(SuPermissions::new(config.su_path.clone())),
            config,
        ))
    }

    /// Manager over a caller-supplied device and permission policy.
    pub fn with_device(
        device: impl SerialDevice + 'static,
        permissions: impl DevicePermissions + 'static,
        config: ManagerConfig,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self::build(Box::new(device), Box::new(permissions), config))
    }

    fn build(
        device: Box<dyn SerialDevice>,
        permissions: Box<dyn DevicePermissions>,
        config: ManagerConfig,
    ) -> Self {
        Self {
            config,
            permissions,
            connection: Mutex::new(Connection {
                device,
                device_active: false,
                descriptor: None,
                send_worker: None,
                read_worker: None,
            }),
            queue: RwLock::new(None),
            listeners: Listeners::default(),
        }
    }

    /// Replaces the open listener. `None` silences open notifications.
    pub fn set_open_listener(&self, listener: Option<Arc<dyn OpenListener>>) -> &Self {
        self.listeners.open.replace(listener);
        self
    }

    /// Replaces the data listener. `None` silences traffic notifications.
    pub fn set_data_listener(&self, listener: Option<Arc<dyn DataListener>>) -> &Self {
        self.listeners.data.replace(listener);
        self
    }

    /// Opens `path` at `baud_rate` with no extra flags.
    pub fn open_path(
        &self,
        path: impl Into<PathBuf>,
        baud_rate: u32,
    ) -> std::result::Result<(), OpenError> {
        self.open(DeviceDescriptor::new(path, baud_rate))
    }

    /// Opens the device, replacing any live connection.
    ///
    /// The open listener hears exactly one outcome. On failure nothing is
    /// left running.
    pub fn open(&self, descriptor: DeviceDescriptor) -> std::result::Result<(), OpenError> {
        info!("Opening serial port {descriptor}");

        let path = descriptor.path();
        if !self.permissions.is_read_write(path) && !self.permissions.ensure_read_write(path) {
            warn!("No read/write permission on {}", path.display());
            return Err(self.fail(&descriptor, OpenError::no_permission(path)));
        }

        let mut conn = self.lock_closed();
        match self.connect(&mut conn, &descriptor) {
            Ok(queue) => {
                conn.descriptor = Some(descriptor.clone());
                *self.queue.write() = Some(queue);
                drop(conn);
                info!("Serial port {descriptor} is open");
                self.listeners
                    .open
                    .notify("on_success", |l| l.on_success(&descriptor));
                Ok(())
            }
            Err(source) => {
                let teardown = conn.take();
                drop(conn);
                teardown.finish();
                warn!("Failed to open serial port {descriptor}: {source}");
                Err(self.fail(&descriptor, OpenError::open_failed(path, source)))
            }
        }
    }

    /// Closes whatever is live and returns the connection lock with nothing
    /// open. Workers are joined with the lock released, so a concurrent
    /// `open` can install a connection in between; that one is closed too.
    fn lock_closed(&self) -> MutexGuard<'_, Connection> {
        loop {
            let queue = self.queue.write().take();
            drop(queue);
            let mut conn = self.connection.lock();
            if !conn.is_live() {
                return conn;
            }
            let teardown = conn.take();
            drop(conn);
            teardown.finish();
        }
    }

    /// Opens the device and starts both workers. Whatever was started before
    /// an error is left in `conn` for the caller to tear down.
    fn connect(&self, conn: &mut Connection, descriptor: &DeviceDescriptor) -> io::Result<SendQueue> {
        conn.device_active = true;
        conn.device.open(descriptor)?;
        let reader = conn.device.reader()?;
        let writer = conn.device.writer()?;

        let name = thread_label(descriptor);
        let data: Arc<ListenerSlot<dyn DataListener>> = self.listeners.data.clone();
        conn.read_worker = Some(ReadWorker::start(
            &name,
            reader,
            self.config.read_buffer_size,
            data.clone(),
        )?);
        let send_worker = SendWorker::start(&name, writer, data)?;
        let queue = send_worker.queue();
        conn.send_worker = Some(send_worker);
        Ok(queue)
    }

    fn fail(&self, descriptor: &DeviceDescriptor, error: OpenError) -> OpenError {
        let status: OpenStatus = error.status();
        self.listeners
            .open
            .notify("on_fail", |l| l.on_fail(descriptor, status));
        error
    }

    /// Closes the connection. Queued writes are discarded; the reader is
    /// interrupted and joined. Calling it while closed does nothing.
    pub fn close(&self) {
        let queue = self.queue.write().take();
        drop(queue);
        let teardown = self.connection.lock().take();
        teardown.finish();
    }

    /// Queues `bytes` for the writer. `false` if the port isn't open; the
    /// write's outcome is reported to the data listener.
    pub fn send(&self, bytes: &[u8]) -> bool {
        match self.queue.read().as_ref() {
            Some(queue) => queue.enqueue(bytes.to_vec()),
            None => false,
        }
    }

    pub fn state(&self) -> PortState {
        if self.is_open() {
            PortState::Open
        } else {
            PortState::Closed
        }
    }

    pub fn is_open(&self) -> bool {
        self.connection.lock().descriptor.is_some()
    }

    /// Whether the read worker is still receiving. Turns `false` after a
    /// read error even though the connection stays open.
    pub fn is_reading(&self) -> bool {
        self.connection
            .lock()
            .read_worker
            .as_ref()
            .is_some_and(ReadWorker::is_running)
    }

    /// Descriptor of the live connection.
    pub fn descriptor(&self) -> Option<DeviceDescriptor> {
        self.connection.lock().descriptor.clone()
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }
}

impl Default for SerialPortManager {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for SerialPortManager {
    fn drop(&mut self) {
        self.close();
    }
}

fn thread_label(descriptor: &DeviceDescriptor) -> String {
    descriptor
        .path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "port".to_string())
}
