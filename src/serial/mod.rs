//! # Serial Module
//!
//! Connection management for one serial device: the [`SerialPortManager`]
//! with its send and read workers, the [`SerialDevice`] backends and the
//! listener contract that reports traffic back to the caller.

pub mod encoding;
mod listener;
mod manager;
mod memory;
mod permission;
mod port;
mod read;
mod send;
mod settings;

#[cfg(test)]
pub(crate) mod testing;

pub use listener::{DataCallbacks, DataListener, OpenCallbacks, OpenListener, OpenStatus};
pub use manager::SerialPortManager;
pub use memory::{MemoryDevice, MemoryDeviceHandle};
pub use permission::{
    DevicePermissions, NoElevation, SuPermissions, Unrestricted, has_read_write_access,
};
pub use port::{DeviceDescriptor, NativeSerialDevice, PortState, SerialDevice};
pub use settings::{
    COMMON_BAUD_RATES, DEFAULT_BAUD_RATE, DEFAULT_READ_BUFFER_SIZE, DEFAULT_READ_TIMEOUT,
    DEFAULT_SU_PATH, ManagerConfig,
};
