//! # Error Module
//!
//! This module provides custom error types for the `serial_link` crate.
//! It uses the `thiserror` crate for ergonomic error handling.
//!
//! [`OpenError`] is the taxonomy reported by
//! [`SerialPortManager::open`](crate::serial::SerialPortManager::open) and the
//! open listener. [`SerialLinkError`] covers everything around it.

use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::serial::OpenStatus;

/// Result type alias for `serial_link` operations.
pub type Result<T> = std::result::Result<T, SerialLinkError>;

/// Reasons an open attempt can fail. Both are terminal for that attempt.
#[derive(Debug, Error)]
pub enum OpenError {
    /// The device node is not readable and writable and elevation failed.
    #[error("No read/write permission on serial port '{}'", path.display())]
    NoReadWritePermission { path: PathBuf },

    /// The device backend refused to open, or the workers could not start.
    #[error("Failed to open serial port '{}': {source}", path.display())]
    OpenFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl OpenError {
    /// Creates a new permission error.
    #[must_use]
    pub fn no_permission(path: impl AsRef<Path>) -> Self {
        Self::NoReadWritePermission {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Creates a new open failure.
    #[must_use]
    pub fn open_failed(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::OpenFailed {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    /// The listener-facing reason for this error.
    #[must_use]
    pub fn status(&self) -> OpenStatus {
        match self {
            Self::NoReadWritePermission { .. } => OpenStatus::NoReadWritePermission,
            Self::OpenFailed { .. } => OpenStatus::OpenFailed,
        }
    }
}

/// Main error type for the `serial_link` crate.
#[derive(Debug, Error)]
pub enum SerialLinkError {
    /// Opening the serial port failed.
    #[error(transparent)]
    Open(#[from] OpenError),

    /// Data encoding/decoding error.
    #[error("Data encoding error: {0}")]
    Encoding(String),

    /// Invalid configuration.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SerialLinkError {
    /// Creates a new encoding error.
    #[must_use]
    pub fn encoding(msg: impl Into<String>) -> Self {
        Self::Encoding(msg.into())
    }

    /// Creates a new configuration error.
    #[must_use]
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }
}
