//! TPM command frames
//!
//! Fixed-size wire structures for the handful of commands the driver issues
//! itself. Every multi-byte field is big-endian on the wire; the zerocopy
//! byte-order wrappers keep the structs unaligned so they map 1:1 onto the
//! FIFO byte stream.

use core::mem::{offset_of, size_of};

use static_assertions::assert_eq_size;
use zerocopy::byteorder::{BigEndian, U16, U32};
use zerocopy::{AsBytes, FromBytes, FromZeroes};

use crate::device::TpmVersion;

// TPM 1.2
pub const TPM_TAG_RQU_COMMAND: u16 = 0x00c1;
pub const TPM_TAG_RSP_COMMAND: u16 = 0x00c4;
pub const TPM_ORD_GET_RANDOM: u32 = 0x0000_0046;
pub const TPM_ORD_SAVE_STATE: u32 = 0x0000_0098;
/// Response code bit: transient condition, try again later
pub const TPM_NON_FATAL: u32 = 0x0000_0800;
pub const TPM_DEACTIVATED: u32 = 6;

// TPM 2.0
pub const TPM2_ST_NO_SESSIONS: u16 = 0x8001;
pub const TPM2_CC_GET_RANDOM: u32 = 0x0000_017b;
pub const TPM2_CC_SHUTDOWN: u32 = 0x0000_0145;
pub const TPM2_SU_STATE: u16 = 0x0001;
/// Response code bits of the warning class (TPM_RC_WARN | TPM_RC_VER1)
pub const TPM2_RC_WARN: u32 = 0x0000_0900;
/// Format-one response code (parameter, handle or session error)
pub const TPM2_RC_FMT1: u32 = 0x0000_0080;

/// Random bytes asked for per GetRandom command.
pub const RANDOM_BYTES: usize = 64;

/// Command and response header.
#[derive(FromZeroes, FromBytes, AsBytes, Clone, Copy, Debug, PartialEq, Eq)]
#[repr(C)]
pub struct TpmHeader {
    pub tag: U16<BigEndian>,
    pub length: U32<BigEndian>,
    /// Ordinal on a command, return code on a response
    pub code: U32<BigEndian>,
}

assert_eq_size!(TpmHeader, [u8; 10]);

pub const TPM_HEADER_SIZE: usize = size_of::<TpmHeader>();

impl TpmHeader {
    pub fn new(tag: u16, length: usize, code: u32) -> Self {
        Self {
            tag: U16::new(tag),
            length: U32::new(length as u32),
            code: U32::new(code),
        }
    }

    pub fn tag(&self) -> u16 {
        self.tag.get()
    }

    pub fn length(&self) -> usize {
        self.length.get() as usize
    }

    pub fn code(&self) -> u32 {
        self.code.get()
    }
}

impl TpmVersion {
    /// Tag every response of this generation carries.
    pub const fn response_tag(self) -> u16 {
        match self {
            TpmVersion::Tpm12 => TPM_TAG_RSP_COMMAND,
            TpmVersion::Tpm20 => TPM2_ST_NO_SESSIONS,
        }
    }
}

/// TPM_GetRandom request.
#[derive(FromZeroes, FromBytes, AsBytes, Clone, Copy, Debug)]
#[repr(C)]
pub struct Tpm12GetRandomCommand {
    pub hdr: TpmHeader,
    pub bytes_requested: U32<BigEndian>,
}

/// TPM_GetRandom response, sized for [`RANDOM_BYTES`].
#[derive(FromZeroes, FromBytes, AsBytes, Clone, Copy, Debug)]
#[repr(C)]
pub struct Tpm12GetRandomResponse {
    pub hdr: TpmHeader,
    pub random_bytes_size: U32<BigEndian>,
    pub bytes: [u8; RANDOM_BYTES],
}

/// TPM2_GetRandom request.
#[derive(FromZeroes, FromBytes, AsBytes, Clone, Copy, Debug)]
#[repr(C)]
pub struct Tpm20GetRandomCommand {
    pub hdr: TpmHeader,
    pub bytes_requested: U16<BigEndian>,
}

/// TPM2_GetRandom response, sized for [`RANDOM_BYTES`].
#[derive(FromZeroes, FromBytes, AsBytes, Clone, Copy, Debug)]
#[repr(C)]
pub struct Tpm20GetRandomResponse {
    pub hdr: TpmHeader,
    pub random_bytes_size: U16<BigEndian>,
    pub bytes: [u8; RANDOM_BYTES],
}

/// TPM2_Shutdown request.
#[derive(FromZeroes, FromBytes, AsBytes, Clone, Copy, Debug)]
#[repr(C)]
pub struct Tpm20ShutdownCommand {
    pub hdr: TpmHeader,
    pub shutdown_type: U16<BigEndian>,
}

assert_eq_size!(Tpm12GetRandomCommand, [u8; 14]);
assert_eq_size!(Tpm12GetRandomResponse, [u8; 78]);
assert_eq_size!(Tpm20GetRandomCommand, [u8; 12]);
assert_eq_size!(Tpm20GetRandomResponse, [u8; 76]);
assert_eq_size!(Tpm20ShutdownCommand, [u8; 12]);

/// A GetRandom response layout and the request that produces it.
pub trait RandomFrame: AsBytes + FromBytes + FromZeroes {
    type Command: AsBytes;

    const VERSION: TpmVersion;

    /// Offset of the random bytes, header included. Also the shortest
    /// length a successful response may declare.
    const DATA_OFFSET: usize;

    fn command(nbytes: usize) -> Self::Command;

    fn header(&self) -> &TpmHeader;

    /// randomBytesSize as reported by the chip, unchecked.
    fn declared_size(&self) -> usize;

    fn data(&self) -> &[u8; RANDOM_BYTES];
}

impl RandomFrame for Tpm12GetRandomResponse {
    type Command = Tpm12GetRandomCommand;

    const VERSION: TpmVersion = TpmVersion::Tpm12;
    const DATA_OFFSET: usize = offset_of!(Tpm12GetRandomResponse, bytes);

    fn command(nbytes: usize) -> Tpm12GetRandomCommand {
        Tpm12GetRandomCommand {
            hdr: TpmHeader::new(
                TPM_TAG_RQU_COMMAND,
                size_of::<Tpm12GetRandomCommand>(),
                TPM_ORD_GET_RANDOM,
            ),
            bytes_requested: U32::new(nbytes as u32),
        }
    }

    fn header(&self) -> &TpmHeader {
        &self.hdr
    }

    fn declared_size(&self) -> usize {
        self.random_bytes_size.get() as usize
    }

    fn data(&self) -> &[u8; RANDOM_BYTES] {
        &self.bytes
    }
}

impl RandomFrame for Tpm20GetRandomResponse {
    type Command = Tpm20GetRandomCommand;

    const VERSION: TpmVersion = TpmVersion::Tpm20;
    const DATA_OFFSET: usize = offset_of!(Tpm20GetRandomResponse, bytes);

    fn command(nbytes: usize) -> Tpm20GetRandomCommand {
        Tpm20GetRandomCommand {
            hdr: TpmHeader::new(
                TPM2_ST_NO_SESSIONS,
                size_of::<Tpm20GetRandomCommand>(),
                TPM2_CC_GET_RANDOM,
            ),
            bytes_requested: U16::new(nbytes as u16),
        }
    }

    fn header(&self) -> &TpmHeader {
        &self.hdr
    }

    fn declared_size(&self) -> usize {
        usize::from(self.random_bytes_size.get())
    }

    fn data(&self) -> &[u8; RANDOM_BYTES] {
        &self.bytes
    }
}

/// TPM_SaveState, the TPM 1.2 suspend command.
pub fn tpm12_save_state() -> TpmHeader {
    TpmHeader::new(TPM_TAG_RQU_COMMAND, TPM_HEADER_SIZE, TPM_ORD_SAVE_STATE)
}

/// TPM2_Shutdown(TPM_SU_STATE), the TPM 2.0 suspend command.
pub fn tpm20_shutdown_state() -> Tpm20ShutdownCommand {
    Tpm20ShutdownCommand {
        hdr: TpmHeader::new(
            TPM2_ST_NO_SESSIONS,
            size_of::<Tpm20ShutdownCommand>(),
            TPM2_CC_SHUTDOWN,
        ),
        shutdown_type: U16::new(TPM2_SU_STATE),
    }
}
