use log::error;
use parking_lot::RwLock;
use std::any::Any;
use std::fmt;
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use super::port::DeviceDescriptor;

/// Why an open attempt failed, as reported to the open listener.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OpenStatus {
    /// The device node is not readable and writable and elevation failed.
    NoReadWritePermission,
    /// The device could not be opened or the workers could not start.
    OpenFailed,
}

impl fmt::Display for OpenStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OpenStatus::NoReadWritePermission => write!(f, "no read/write permission"),
            OpenStatus::OpenFailed => write!(f, "open failed"),
        }
    }
}

/// Receives the outcome of every [`open`](super::SerialPortManager::open).
#[cfg_attr(test, mockall::automock)]
pub trait OpenListener: Send + Sync {
    fn on_success(&self, descriptor: &DeviceDescriptor);

    fn on_fail(&self, descriptor: &DeviceDescriptor, status: OpenStatus);
}

/// Receives traffic and I/O errors. Called from the worker threads.
pub trait DataListener: Send + Sync {
    /// One chunk exactly as the read returned it.
    fn on_data_received(&self, bytes: &[u8]);

    /// A queued message was written to the device.
    fn on_data_sent(&self, bytes: &[u8]);

    /// A read or write failed.
    fn on_error(&self, error: &io::Error);
}

type BytesFn = Box<dyn Fn(&[u8]) + Send + Sync>;

/// [`DataListener`] assembled from closures. Missing callbacks are ignored.
#[derive(Default)]
pub struct DataCallbacks {
    received: Option<BytesFn>,
    sent: Option<BytesFn>,
    error: Option<Box<dyn Fn(&io::Error) + Send + Sync>>,
}

impl DataCallbacks {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_received(mut self, f: impl Fn(&[u8]) + Send + Sync + 'static) -> Self {
        self.received = Some(Box::new(f));
        self
    }

    #[must_use]
    pub fn with_sent(mut self, f: impl Fn(&[u8]) + Send + Sync + 'static) -> Self {
        self.sent = Some(Box::new(f));
        self
    }

    #[must_use]
    pub fn with_error(mut self, f: impl Fn(&io::Error) + Send + Sync + 'static) -> Self {
        self.error = Some(Box::new(f));
        self
    }
}

impl DataListener for DataCallbacks {
    fn on_data_received(&self, bytes: &[u8]) {
        if let Some(f) = &self.received {
            f(bytes);
        }
    }

    fn on_data_sent(&self, bytes: &[u8]) {
        if let Some(f) = &self.sent {
            f(bytes);
        }
    }

    fn on_error(&self, error: &io::Error) {
        if let Some(f) = &self.error {
            f(error);
        }
    }
}

/// [`OpenListener`] assembled from closures.
#[derive(Default)]
pub struct OpenCallbacks {
    success: Option<Box<dyn Fn(&DeviceDescriptor) + Send + Sync>>,
    fail: Option<Box<dyn Fn(&DeviceDescriptor, OpenStatus) + Send + Sync>>,
}

impl OpenCallbacks {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_success(mut self, f: impl Fn(&DeviceDescriptor) + Send + Sync + 'static) -> Self {
        self.success = Some(Box::new(f));
        self
    }

    #[must_use]
    pub fn with_fail(
        mut self,
        f: impl Fn(&DeviceDescriptor, OpenStatus) + Send + Sync + 'static,
    ) -> Self {
        self.fail = Some(Box::new(f));
        self
    }
}

impl OpenListener for OpenCallbacks {
    fn on_success(&self, descriptor: &DeviceDescriptor) {
        if let Some(f) = &self.success {
            f(descriptor);
        }
    }

    fn on_fail(&self, descriptor: &DeviceDescriptor, status: OpenStatus) {
        if let Some(f) = &self.fail {
            f(descriptor, status);
        }
    }
}

/// A replaceable listener registration shared with the workers.
///
/// Readers clone the `Arc` out under a short read lock, so a concurrent
/// replacement is never observed half-written and never waits on a callback.
pub(crate) struct ListenerSlot<L: ?Sized> {
    inner: RwLock<Option<Arc<L>>>,
}

impl<L: ?Sized> Default for ListenerSlot<L> {
    fn default() -> Self {
        Self {
            inner: RwLock::new(None),
        }
    }
}

impl<L: ?Sized> ListenerSlot<L> {
    pub(crate) fn replace(&self, listener: Option<Arc<L>>) {
        *self.inner.write() = listener;
    }

    pub(crate) fn get(&self) -> Option<Arc<L>> {
        self.inner.read().clone()
    }

    /// Runs `f` against the current listener, if any. A panic inside the
    /// callback is logged and swallowed.
    pub(crate) fn notify(&self, event: &str, f: impl FnOnce(&L)) {
        let Some(listener) = self.get() else {
            return;
        };
        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| f(&listener))) {
            error!("Listener panicked in {event}: {}", panic_message(&*payload));
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        *s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "<non-string panic>"
    }
}

/// Both registrations of one manager.
#[derive(Default)]
pub(crate) struct Listeners {
    pub(crate) open: ListenerSlot<dyn OpenListener>,
    pub(crate) data: Arc<ListenerSlot<dyn DataListener>>,
}
