//! TPM response handling
//!
//! Runs the fixed command/response exchanges the driver issues on its own:
//! GetRandom for the entropy feed and SaveState / Shutdown on suspend. Each
//! exchange is one write transaction followed by one read transaction; the
//! header is read first and validated before the payload is pulled in.

use log::{debug, error, trace};
use zerocopy::{AsBytes, FromBytes, FromZeroes};

use crate::commands::{
    self, RandomFrame, Tpm12GetRandomResponse, Tpm20GetRandomResponse, TpmHeader, RANDOM_BYTES,
    TPM2_RC_FMT1, TPM2_RC_WARN, TPM_DEACTIVATED, TPM_HEADER_SIZE, TPM_NON_FATAL,
};
use crate::device::TpmVersion;
use crate::drivers::{transaction, Direction, ReadMode, TpmInterface};
use crate::error::{Result, TpmError};

/// Bits of entropy credited per byte returned by the chip.
pub const ENTROPY_BITS_PER_BYTE: u32 = 8 / 2;

/// Random bytes returned by one GetRandom exchange.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct RandomBytes {
    buf: [u8; RANDOM_BYTES],
    len: usize,
}

impl RandomBytes {
    pub fn as_slice(&self) -> &[u8] {
        &self.buf[..self.len]
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Conservative estimate: half a bit per bit of data.
    pub fn entropy_bits(&self) -> u32 {
        self.len as u32 * ENTROPY_BITS_PER_BYTE
    }
}

impl core::fmt::Debug for RandomBytes {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("RandomBytes").field("len", &self.len).finish()
    }
}

/// Map a nonzero return code onto the driver's view of it. `None` means the
/// chip is busy and the request may be retried later.
pub fn classify(version: TpmVersion, code: u32) -> Option<TpmError> {
    match version {
        TpmVersion::Tpm12 if code & TPM_NON_FATAL != 0 => None,
        TpmVersion::Tpm12 if code == TPM_DEACTIVATED => Some(TpmError::Deactivated),
        // Warnings are format-zero codes carrying both the VER1 and WARN bits.
        TpmVersion::Tpm20 if code & (TPM2_RC_FMT1 | TPM2_RC_WARN) == TPM2_RC_WARN => None,
        _ => Some(TpmError::Io),
    }
}

/// Read and decode the response header into the front of `buf`.
fn read_header<I: TpmInterface + ?Sized>(intf: &mut I, buf: &mut [u8]) -> Result<TpmHeader> {
    let nread = intf.read(&mut buf[..TPM_HEADER_SIZE], ReadMode::Header)?;
    if nread != TPM_HEADER_SIZE {
        debug!("tpm: short response header ({} bytes)", nread);
        return Err(TpmError::Io);
    }
    TpmHeader::read_from(&buf[..TPM_HEADER_SIZE]).ok_or(TpmError::Io)
}

/// Issue one GetRandom for [`RANDOM_BYTES`] bytes.
///
/// `Ok(None)` means the chip asked to be tried again later. Every other
/// failure, including a deactivated TPM, is an error.
pub fn get_random<I: TpmInterface + ?Sized>(
    intf: &mut I,
    version: TpmVersion,
) -> Result<Option<RandomBytes>> {
    match version {
        TpmVersion::Tpm12 => exchange_random::<Tpm12GetRandomResponse, I>(intf),
        TpmVersion::Tpm20 => exchange_random::<Tpm20GetRandomResponse, I>(intf),
    }
}

fn exchange_random<F, I>(intf: &mut I) -> Result<Option<RandomBytes>>
where
    F: RandomFrame,
    I: TpmInterface + ?Sized,
{
    let command = F::command(RANDOM_BYTES);
    transaction(intf, Direction::Write, |i| i.write(command.as_bytes()))?;

    transaction(intf, Direction::Read, |i| {
        let mut response = F::new_zeroed();
        let buf = response.as_bytes_mut();
        let hdr = read_header(i, buf)?;

        if hdr.tag() != F::VERSION.response_tag() {
            error!("tpm: GetRandom: bad response tag {:#06x}", hdr.tag());
            return Err(TpmError::Io);
        }
        if hdr.code() != 0 {
            return match classify(F::VERSION, hdr.code()) {
                None => {
                    debug!("tpm: GetRandom: busy, code {:#x}", hdr.code());
                    Ok(None)
                }
                Some(err) => {
                    error!("tpm: GetRandom failed, code {:#x}", hdr.code());
                    Err(err)
                }
            };
        }

        let length = hdr.length();
        if length < F::DATA_OFFSET || length > buf.len() {
            error!("tpm: GetRandom: bad response length {}", length);
            debug!("tpm: header {:02x?}", &buf[..TPM_HEADER_SIZE]);
            return Err(TpmError::Io);
        }
        i.read(&mut buf[TPM_HEADER_SIZE..length], ReadMode::Exact)?;

        // Never trust randomBytesSize beyond what the frame holds.
        let len = response.declared_size().min(length - F::DATA_OFFSET);
        trace!("tpm: GetRandom returned {} bytes", len);

        let mut out = RandomBytes { buf: [0; RANDOM_BYTES], len };
        out.buf[..len].copy_from_slice(&response.data()[..len]);
        Ok(Some(out))
    })
}

/// Send the suspend command for `version` and check the chip accepted it.
pub fn save_state<I: TpmInterface + ?Sized>(intf: &mut I, version: TpmVersion) -> Result<()> {
    match version {
        TpmVersion::Tpm12 => exchange_suspend(intf, version, commands::tpm12_save_state().as_bytes()),
        TpmVersion::Tpm20 => {
            exchange_suspend(intf, version, commands::tpm20_shutdown_state().as_bytes())
        }
    }
}

/// The reply must be a bare header: right tag, exact length, zero code.
fn exchange_suspend<I: TpmInterface + ?Sized>(
    intf: &mut I,
    version: TpmVersion,
    command: &[u8],
) -> Result<()> {
    transaction(intf, Direction::Write, |i| i.write(command))?;

    let hdr = transaction(intf, Direction::Read, |i| {
        let mut buf = [0u8; TPM_HEADER_SIZE];
        read_header(i, &mut buf)
    })?;

    if hdr.tag() != version.response_tag()
        || hdr.length() != TPM_HEADER_SIZE
        || hdr.code() != 0
    {
        error!(
            "tpm: suspend command rejected: tag {:#06x} length {} code {:#x}",
            hdr.tag(),
            hdr.length(),
            hdr.code()
        );
        return Err(TpmError::Io);
    }
    Ok(())
}
