//! `/dev/tpm` character device
//!
//! Raw passthrough for a single userspace client (a TSS stack): `write`
//! sends a command frame as is, `read` returns the next response frame.
//! Frames are not interpreted beyond the response length field.

use log::debug;
use static_assertions::assert_eq_size;
use zerocopy::{AsBytes, FromBytes, FromZeroes};

use crate::commands::{TpmHeader, TPM_HEADER_SIZE};
use crate::device::TpmDevice;
use crate::drivers::{transaction, Direction, ReadMode, TpmInterface};
use crate::error::{Result, TpmError};

/// Largest frame moved in one read or write.
pub const TPM_BUFSIZ: usize = 1024;

/// Version of the ioctl interface reported by GETINFO.
pub const TPM_API_VERSION: u32 = 1;

/// `_IOR('N', 0, struct tpm_ioc_getinfo)`
pub const TPM_IOC_GETINFO: u64 = 0x4018_4e00;

/// GETINFO result, laid out as userspace expects it.
#[derive(AsBytes, FromZeroes, FromBytes, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[repr(C)]
pub struct TpmIocGetInfo {
    pub api_version: u32,
    pub tpm_version: u32,
    pub itf_version: u32,
    pub device_id: u32,
    pub device_rev: u32,
    pub device_caps: u32,
}

assert_eq_size!(TpmIocGetInfo, [u8; 24]);

/// Character-device entry points.
pub trait CharDevice {
    /// Exclusive: a second open fails with [`TpmError::Busy`].
    fn open(&self) -> Result<()>;

    fn close(&self) -> Result<()>;

    /// Read one response frame into `buf`; nothing is copied on failure.
    fn read(&self, buf: &mut [u8]) -> Result<usize>;

    /// Send up to [`TPM_BUFSIZ`] bytes of `buf` as one command.
    fn write(&self, buf: &[u8]) -> Result<usize>;

    /// `data` is the ioctl argument buffer.
    fn ioctl(&self, cmd: u64, data: &mut [u8]) -> Result<()>;
}

impl<I: TpmInterface> CharDevice for TpmDevice<I> {
    fn open(&self) -> Result<()> {
        let mut locked = self.lock();
        if locked.busy {
            return Err(TpmError::Busy);
        }
        locked.busy = true;
        Ok(())
    }

    fn close(&self) -> Result<()> {
        let mut locked = self.lock();
        if !locked.busy {
            return Err(TpmError::InvalidState);
        }
        locked.busy = false;
        Ok(())
    }

    fn read(&self, buf: &mut [u8]) -> Result<usize> {
        let mut scratch = [0u8; TPM_BUFSIZ];
        let limit = buf.len().min(TPM_BUFSIZ);

        let mut locked = self.lock();
        let len = transaction(&mut locked.intf, Direction::Read, |intf| {
            let cnt = intf.read(&mut scratch[..TPM_HEADER_SIZE], ReadMode::Header)?;
            if cnt != TPM_HEADER_SIZE {
                return Err(TpmError::Io);
            }

            let hdr = TpmHeader::read_from(&scratch[..TPM_HEADER_SIZE]).ok_or(TpmError::Io)?;
            let len = hdr.length();
            if len > limit {
                debug!("{}: response of {} bytes exceeds {}", self.name(), len, limit);
                return Err(TpmError::Overflow);
            }
            if len < TPM_HEADER_SIZE {
                return Err(TpmError::Io);
            }

            intf.read(&mut scratch[TPM_HEADER_SIZE..len], ReadMode::Exact)?;
            Ok(len)
        })?;
        drop(locked);

        buf[..len].copy_from_slice(&scratch[..len]);
        Ok(len)
    }

    fn write(&self, buf: &[u8]) -> Result<usize> {
        let n = buf.len().min(TPM_BUFSIZ);
        if n == 0 {
            return Ok(0);
        }
        let mut scratch = [0u8; TPM_BUFSIZ];
        scratch[..n].copy_from_slice(&buf[..n]);

        let mut locked = self.lock();
        transaction(&mut locked.intf, Direction::Write, |intf| intf.write(&scratch[..n]))?;
        Ok(n)
    }

    fn ioctl(&self, cmd: u64, data: &mut [u8]) -> Result<()> {
        match cmd {
            TPM_IOC_GETINFO => self
                .get_info()
                .write_to_prefix(data)
                .ok_or(TpmError::InvalidArgument),
            _ => Err(TpmError::NotTty),
        }
    }
}
