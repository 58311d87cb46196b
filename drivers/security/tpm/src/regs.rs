//! TIS 1.2 register layout (locality 0 window)

use bitflags::bitflags;

/// Access register
pub const TPM_ACCESS: usize = 0x0000;
/// Interface capability register
pub const TPM_INTF_CAPABILITY: usize = 0x0014;
/// Status register; bytes +1 and +2 hold the burst count
pub const TPM_STS: usize = 0x0018;
/// Command/response FIFO
pub const TPM_DATA: usize = 0x0024;
/// Vendor and device id
pub const TPM_ID: usize = 0x0f00;
/// Revision id
pub const TPM_REV: usize = 0x0f04;
/// Size of the register window for one locality
pub const TPM_SIZE: usize = 0x5000;

bitflags! {
    /// TPM_ACCESS bits
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Access: u8 {
        const ESTABLISHMENT   = 0x01;
        const REQUEST_USE     = 0x02;
        const REQUEST_PENDING = 0x04;
        const SEIZE           = 0x08;
        const SEIZED          = 0x10;
        const ACTIVE_LOCALITY = 0x20;
        const VALID           = 0x80;
    }
}

impl Access {
    /// Both bits a granted locality reports.
    pub const OWNED: Access = Access::VALID.union(Access::ACTIVE_LOCALITY);

    pub fn is_owned(self) -> bool {
        self.contains(Self::OWNED)
    }
}

bitflags! {
    /// Low byte of TPM_STS
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Status: u8 {
        const RESP_RETRY  = 0x02;
        const DATA_EXPECT = 0x08;
        const DATA_AVAIL  = 0x10;
        const GO          = 0x20;
        const CMD_READY   = 0x40;
        const VALID       = 0x80;
    }
}

bitflags! {
    /// TPM_INTF_CAPABILITY bits
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct IntfCaps: u32 {
        const DATA_AVAIL_INT      = 0x001;
        const STS_VALID_INT       = 0x002;
        const LOCALITY_CHANGE_INT = 0x004;
        const INT_LEVEL_HIGH      = 0x008;
        const INT_LEVEL_LOW       = 0x010;
        const INT_EDGE_RISING     = 0x020;
        const INT_EDGE_FALLING    = 0x040;
        const CMD_READY_INT       = 0x080;
        const BURST_COUNT_STATIC  = 0x100;

        // Interface version and transfer size live in the upper bits.
        const _ = !0;
    }
}

/// Capabilities an interface must advertise to be attached.
pub const TPM_CAPS_REQUIRED: IntfCaps = IntfCaps::DATA_AVAIL_INT
    .union(IntfCaps::LOCALITY_CHANGE_INT)
    .union(IntfCaps::INT_LEVEL_LOW);
