use std::path::PathBuf;
use std::time::Duration;

use crate::error::{Result, SerialLinkError};

/// serial port baud rate
pub const COMMON_BAUD_RATES: &[u32] = &[
    4800, 9600, 19200, 38400, 57600, 115200, 230400, 460800, 500000, 576000, 921600, 1000000,
    1500000, 2000000,
];

/// Default baud rate used by the demo tool and `open_path` callers that don't care
pub const DEFAULT_BAUD_RATE: u32 = 115200;

/// Size of the buffer the read worker hands to each blocking read
pub const DEFAULT_READ_BUFFER_SIZE: usize = 1024;

/// How long a native read may block before the read worker re-checks its stop flag
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_millis(100);

/// `su` binary used to grant access to a device node
#[cfg(target_os = "android")]
pub const DEFAULT_SU_PATH: &str = "/system/bin/su";
#[cfg(not(target_os = "android"))]
pub const DEFAULT_SU_PATH: &str = "/bin/su";

/// manager settings
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ManagerConfig {
    /// capacity of the read worker's buffer, the upper bound of one received chunk
    pub read_buffer_size: usize,
    /// read timeout passed to the native port
    pub read_timeout: Duration,
    /// `su` binary for the permission fallback
    pub su_path: PathBuf,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
            read_timeout: DEFAULT_READ_TIMEOUT,
            su_path: PathBuf::from(DEFAULT_SU_PATH),
        }
    }
}

impl ManagerConfig {
    /// set read buffer size
    #[must_use]
    pub fn with_read_buffer_size(mut self, size: usize) -> Self {
        self.read_buffer_size = size;
        self
    }

    /// set read timeout
    #[must_use]
    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// set su path
    #[must_use]
    pub fn with_su_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.su_path = path.into();
        self
    }

    /// Checks the settings can drive a connection.
    pub fn validate(&self) -> Result<()> {
        if self.read_buffer_size == 0 {
            return Err(SerialLinkError::invalid_config(
                "read buffer size must be non-zero",
            ));
        }
        if self.read_timeout.is_zero() {
            return Err(SerialLinkError::invalid_config(
                "read timeout must be non-zero",
            ));
        }
        Ok(())
    }
}
