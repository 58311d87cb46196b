//! Register access capability
//!
//! The bus attachment (ACPI, FDT, ISA) maps the TIS window and hands the
//! driver something implementing [`RegisterAccess`]. Offsets are relative to
//! the start of the locality 0 window.

/// A pending signal aborted an interruptible sleep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Interrupted;

impl From<Interrupted> for crate::error::TpmError {
    fn from(_: Interrupted) -> Self {
        crate::error::TpmError::Interrupted
    }
}

/// bus_space-style access to the TIS registers plus the two wait primitives
/// the transport needs.
pub trait RegisterAccess: Send {
    /// Byte-wide register read
    fn read_1(&self, offset: usize) -> u8;

    /// Word-wide register read
    fn read_4(&self, offset: usize) -> u32;

    /// Byte-wide register write
    fn write_1(&self, offset: usize, value: u8);

    /// Busy-wait for `ms` milliseconds. Usable before the device is attached.
    fn delay_ms(&self, ms: u32);

    /// Sleep for `ms` milliseconds, waking early with [`Interrupted`] if a
    /// signal is pending for the calling thread.
    fn sleep_ms(&self, ms: u32) -> Result<(), Interrupted>;
}

/// Raw MMIO mapping of a TIS window, for early attachment without a
/// scheduler. Its sleeps cannot be interrupted.
pub struct Mmio {
    base: usize,
}

impl Mmio {
    /// # Safety
    /// `base` must point to a mapped, uncached TIS register window of at
    /// least [`crate::regs::TPM_SIZE`] bytes that stays mapped for the
    /// lifetime of the returned value.
    pub const unsafe fn new(base: usize) -> Self {
        Self { base }
    }
}

impl RegisterAccess for Mmio {
    fn read_1(&self, offset: usize) -> u8 {
        unsafe { core::ptr::read_volatile((self.base + offset) as *const u8) }
    }

    fn read_4(&self, offset: usize) -> u32 {
        unsafe { core::ptr::read_volatile((self.base + offset) as *const u32) }
    }

    fn write_1(&self, offset: usize, value: u8) {
        unsafe { core::ptr::write_volatile((self.base + offset) as *mut u8, value) }
    }

    fn delay_ms(&self, ms: u32) {
        // Uncalibrated spin: wrap `Mmio` when a timer source is available.
        for _ in 0..ms {
            for _ in 0..100_000 {
                core::hint::spin_loop();
            }
        }
    }

    fn sleep_ms(&self, ms: u32) -> Result<(), Interrupted> {
        self.delay_ms(ms);
        Ok(())
    }
}
