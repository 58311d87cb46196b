//! Attachment-time configuration

use crate::device::TpmVersion;

/// Default for every TIS polling stage, in milliseconds.
pub const TPM_DEFAULT_TMO_MS: u32 = 2000;

/// Upper bounds for the TIS polling loops, in milliseconds.
///
/// Every loop polls at 1 ms granularity, so a timeout of `n` ms is at most
/// `n` sleeps (plus one grace tick on the `VALID` wait).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TisTimeouts {
    /// Waiting for ACCESS to report `VALID | ACTIVE_LOCALITY`
    pub access_ms: u32,
    /// Waiting for `CMD_READY` after an abort
    pub ready_ms: u32,
    /// Waiting for `VALID` / `DATA_AVAIL`
    pub read_ms: u32,
    /// Waiting for a nonzero burst count
    pub burst_ms: u32,
}

impl TisTimeouts {
    /// Same bound for every stage.
    pub const fn uniform(ms: u32) -> Self {
        Self {
            access_ms: ms,
            ready_ms: ms,
            read_ms: ms,
            burst_ms: ms,
        }
    }
}

impl Default for TisTimeouts {
    fn default() -> Self {
        Self::uniform(TPM_DEFAULT_TMO_MS)
    }
}

/// Per-device configuration handed over by the bus attachment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TpmConfig {
    /// Device name, used for logging and as the entropy source name
    pub name: &'static str,
    /// TPM generation, decided by the firmware tables
    pub version: TpmVersion,
    pub timeouts: TisTimeouts,
}

impl TpmConfig {
    pub const fn new(name: &'static str, version: TpmVersion) -> Self {
        Self {
            name,
            version,
            timeouts: TisTimeouts::uniform(TPM_DEFAULT_TMO_MS),
        }
    }

    pub const fn with_timeouts(mut self, timeouts: TisTimeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    pub const fn with_version(mut self, version: TpmVersion) -> Self {
        self.version = version;
        self
    }
}

impl Default for TpmConfig {
    fn default() -> Self {
        Self::new("tpm0", TpmVersion::Tpm12)
    }
}
