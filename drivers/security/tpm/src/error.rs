//! TPM error types

use core::fmt;

/// Result type used throughout the TPM driver.
pub type Result<T> = core::result::Result<T, TpmError>;

/// TPM driver errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TpmError {
    /// A polling loop ran out of time before the chip showed the required bits
    Timeout,
    /// The device is already open
    Busy,
    /// Protocol violation: unexpected status, malformed or short response
    Io,
    /// The TPM 1.2 reported TPM_DEACTIVATED
    Deactivated,
    /// A pending signal aborted a blocking poll
    Interrupted,
    /// Unsupported locality or argument
    InvalidArgument,
    /// Close without a matching open
    InvalidState,
    /// The interface lacks the required capabilities
    NotSupported,
    /// Nothing answers at the register window
    NoDevice,
    /// A response frame declared more bytes than the buffers hold
    Overflow,
    /// Unknown ioctl
    NotTty,
}

/// NetBSD errno values returned through the character device.
pub mod errno {
    pub const EINTR: i32 = 4;
    pub const EIO: i32 = 5;
    pub const ENXIO: i32 = 6;
    pub const EBUSY: i32 = 16;
    pub const EINVAL: i32 = 22;
    pub const ENOTTY: i32 = 25;
    pub const ETIMEDOUT: i32 = 60;
    pub const ENOTSUP: i32 = 86;
}

impl TpmError {
    /// Errno reported to userspace for this error.
    pub fn errno(self) -> i32 {
        match self {
            TpmError::Timeout => errno::ETIMEDOUT,
            TpmError::Busy => errno::EBUSY,
            TpmError::Io | TpmError::Overflow => errno::EIO,
            TpmError::Deactivated | TpmError::NoDevice => errno::ENXIO,
            TpmError::Interrupted => errno::EINTR,
            TpmError::InvalidArgument | TpmError::InvalidState => errno::EINVAL,
            TpmError::NotSupported => errno::ENOTSUP,
            TpmError::NotTty => errno::ENOTTY,
        }
    }
}

impl fmt::Display for TpmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TpmError::Timeout => write!(f, "operation timed out"),
            TpmError::Busy => write!(f, "device busy"),
            TpmError::Io => write!(f, "I/O error"),
            TpmError::Deactivated => write!(f, "TPM is deactivated"),
            TpmError::Interrupted => write!(f, "interrupted"),
            TpmError::InvalidArgument => write!(f, "invalid argument"),
            TpmError::InvalidState => write!(f, "invalid state"),
            TpmError::NotSupported => write!(f, "interface not supported"),
            TpmError::NoDevice => write!(f, "no device"),
            TpmError::Overflow => write!(f, "response too large"),
            TpmError::NotTty => write!(f, "inappropriate ioctl"),
        }?;
        write!(f, " (errno {})", self.errno())
    }
}
