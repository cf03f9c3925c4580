//! # Serial Link
//!
//! Serial port connection management with background reader and writer
//! threads.
//!
//! The caller opens a device node at a baud rate, queues outbound bytes and
//! receives notifications about the connection, incoming data, completed
//! writes and I/O errors without blocking its own thread.
//!
//! ## Features
//!
//! - **Non-blocking sends**: `send` only enqueues; a dedicated thread writes
//!   messages in FIFO order.
//! - **Continuous reads**: a dedicated thread passes every chunk read from the
//!   device to the data listener unmodified.
//! - **Pluggable devices**: [`serial::SerialDevice`] has a native backend and
//!   an in-memory one for tests.
//! - **Permission fallback**: inaccessible nodes can be opened up through
//!   `su` before giving up.
//!
//! ## Architecture
//!
//! - [`serial`]: connection manager, workers, devices and listeners
//! - [`error`]: custom error types for the crate

pub mod error;
pub mod serial;

/// Re-exports for convenience
pub mod prelude {
    pub use crate::error::*;
    pub use crate::serial::encoding::{DataType, decode_bytes, encode_string};
    pub use crate::serial::{
        DataCallbacks, DataListener, DeviceDescriptor, DevicePermissions, ManagerConfig,
        MemoryDevice, MemoryDeviceHandle, NativeSerialDevice, NoElevation, OpenCallbacks,
        OpenListener, OpenStatus, PortState, SerialDevice, SerialPortManager, SuPermissions,
        Unrestricted,
    };
}
