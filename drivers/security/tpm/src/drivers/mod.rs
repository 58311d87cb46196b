//! TPM transports
//!
//! A transport moves command and response frames between memory and the
//! chip. Only TIS 1.2 exists today; a CRB transport would implement the same
//! [`TpmInterface`] without touching the codec, the entropy feed or the
//! character device.

pub mod tis;

use crate::device::InterfaceVersion;
use crate::error::Result;
use crate::regs::IntfCaps;

/// Direction of one half of a command/response exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Read,
    Write,
}

/// How [`TpmInterface::read`] decides it is done.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadMode {
    /// Stop at the first burst boundary once at least 6 bytes are in, enough
    /// for tag and length. Used to fetch the response header.
    Header,
    /// Keep reading until the buffer is full. Used for the payload once the
    /// header length is known.
    Exact,
}

/// Identity registers read once at init.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceIdentity {
    pub caps: IntfCaps,
    pub device_id: u32,
    pub revision: u8,
}

/// Transport operations, called with the device lock held.
///
/// Every successful [`start`](Self::start) must be followed by exactly one
/// [`end`](Self::end) in the same direction, whatever happens in between:
/// only `end` hands the chip back to the ready state and releases the
/// locality. Use [`transaction`] rather than pairing them by hand.
pub trait TpmInterface: Send {
    fn version(&self) -> InterfaceVersion;

    /// Read identity registers, take locality 0 and abort any command the
    /// chip was working on.
    fn init(&mut self) -> Result<DeviceIdentity>;

    fn start(&mut self, dir: Direction) -> Result<()>;

    /// Returns the number of bytes placed in `buf`.
    fn read(&mut self, buf: &mut [u8], mode: ReadMode) -> Result<usize>;

    fn write(&mut self, buf: &[u8]) -> Result<()>;

    /// Close the half started by `start(dir)`. Always performs its register
    /// side effects. A `prior` error is returned in preference to any error
    /// `end` detects itself.
    fn end(&mut self, dir: Direction, prior: Result<()>) -> Result<()>;
}

/// Run `body` between `start(dir)` and `end(dir, _)`.
///
/// If `start` fails nothing was opened and the error is returned as is.
/// Otherwise `end` runs exactly once, with the outcome of `body`, and the
/// first error wins.
pub fn transaction<I, T, F>(intf: &mut I, dir: Direction, body: F) -> Result<T>
where
    I: TpmInterface + ?Sized,
    F: FnOnce(&mut I) -> Result<T>,
{
    intf.start(dir)?;
    let result = body(intf);
    let status = match &result {
        Ok(_) => Ok(()),
        Err(e) => Err(*e),
    };
    intf.end(dir, status)?;
    result
}
