//! TIS 1.2 (TPM Interface Specification) transport
//!
//! Commands are pushed through the DATA FIFO in bursts, completion is polled
//! on the status register at 1 ms granularity. Interrupts are advertised by
//! the chip but not used.

use log::trace;

use super::{DeviceIdentity, Direction, ReadMode, TpmInterface};
use crate::bus::RegisterAccess;
use crate::config::TisTimeouts;
use crate::device::InterfaceVersion;
use crate::error::{Result, TpmError};
use crate::regs::{
    Access, IntfCaps, Status, TPM_ACCESS, TPM_CAPS_REQUIRED, TPM_DATA, TPM_ID,
    TPM_INTF_CAPABILITY, TPM_REV, TPM_STS,
};

/// How many times `wait_for` asks the chip to resend its status before
/// giving up.
const STATUS_RETRIES: u32 = 3;

/// A header read may stop once this many bytes are in (tag + length).
const HEADER_PEEK: usize = 6;

pub struct Tis12<B> {
    bus: B,
    timeouts: TisTimeouts,
}

impl<B: RegisterAccess> Tis12<B> {
    pub fn new(bus: B, timeouts: TisTimeouts) -> Self {
        Self { bus, timeouts }
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }

    /// Check that a TIS 1.2 chip answers at `bus` before attaching.
    ///
    /// Runs without a device instance, so it busy-waits with the delay
    /// primitive instead of sleeping.
    pub fn probe(bus: &B, timeouts: &TisTimeouts) -> Result<()> {
        let cap = bus.read_4(TPM_INTF_CAPABILITY);
        if cap == u32::MAX {
            return Err(TpmError::NoDevice);
        }
        if !IntfCaps::from_bits_retain(cap).contains(TPM_CAPS_REQUIRED) {
            return Err(TpmError::NotSupported);
        }

        bus.write_1(TPM_ACCESS, Access::REQUEST_USE.bits());

        let mut tmo = timeouts.access_ms;
        while !Access::from_bits_truncate(bus.read_1(TPM_ACCESS)).is_owned() {
            if tmo == 0 {
                return Err(TpmError::Timeout);
            }
            tmo -= 1;
            bus.delay_ms(1);
        }

        if bus.read_4(TPM_ID) == u32::MAX {
            return Err(TpmError::NoDevice);
        }
        Ok(())
    }

    fn access(&self) -> Access {
        Access::from_bits_truncate(self.bus.read_1(TPM_ACCESS))
    }

    fn status(&self) -> Status {
        Status::from_bits_truncate(self.bus.read_1(TPM_STS))
    }

    fn set_status(&self, bits: Status) {
        self.bus.write_1(TPM_STS, bits.bits());
    }

    /// Take ownership of `locality`. Only locality 0 is supported.
    pub fn request_locality(&mut self, locality: u8) -> Result<()> {
        if locality != 0 {
            return Err(TpmError::InvalidArgument);
        }
        if self.access().is_owned() {
            return Ok(());
        }

        self.bus.write_1(TPM_ACCESS, Access::REQUEST_USE.bits());

        let mut to = self.timeouts.access_ms;
        while !self.access().is_owned() {
            if to == 0 {
                trace!("tis: locality 0 not granted after {} ms", self.timeouts.access_ms);
                return Err(TpmError::Timeout);
            }
            to -= 1;
            self.bus.sleep_ms(1)?;
        }
        Ok(())
    }

    /// Give locality 0 back.
    pub fn release_locality(&mut self) {
        self.bus.write_1(TPM_ACCESS, Access::ACTIVE_LOCALITY.bits());
    }

    /// Bytes the FIFO can move right now. `Ok(0)` means it stayed empty for
    /// the whole burst timeout.
    pub fn burst_count(&mut self) -> Result<u16> {
        for _ in 0..self.timeouts.burst_ms {
            // Burst count is bits 23:8 of TPM_STS.
            let burst = u16::from(self.bus.read_1(TPM_STS + 1))
                | u16::from(self.bus.read_1(TPM_STS + 2)) << 8;
            if burst != 0 {
                return Ok(burst);
            }
            self.bus.sleep_ms(1)?;
        }
        Ok(0)
    }

    /// Poll until every bit of `mask` is set or `ticks` sleeps have passed.
    /// Returns the last status seen either way.
    fn poll(&mut self, mask: Status, ticks: u32) -> Result<Status> {
        let mut to = ticks;
        loop {
            let status = self.status();
            if status.contains(mask) || to == 0 {
                return Ok(status);
            }
            to -= 1;
            self.bus.sleep_ms(1)?;
        }
    }

    /// Wait for all of `bits`.
    ///
    /// `VALID` is awaited on its own first, with one tick of grace, then the
    /// remaining bits together. If those are still missing and `VALID` was
    /// asked for, the chip is told to resend its status and the whole wait
    /// starts over, at most [`STATUS_RETRIES`] times.
    pub fn wait_for(&mut self, bits: Status, timeout_ms: u32) -> Result<Status> {
        let mut retry = STATUS_RETRIES;
        loop {
            let mut todo = bits;
            if todo.contains(Status::VALID) {
                self.poll(Status::VALID, timeout_ms.saturating_add(1))?;
                todo.remove(Status::VALID);
            }

            let status = self.poll(todo, timeout_ms)?;
            if status.contains(todo) {
                return Ok(status);
            }

            if retry > 0 && bits.contains(Status::VALID) {
                retry -= 1;
                trace!("tis: status {:?} lacks {:?}, asking for retry", status, todo);
                self.set_status(Status::RESP_RETRY);
                continue;
            }
            return Err(TpmError::Timeout);
        }
    }

    fn fifo_burst(&mut self) -> Result<usize> {
        match self.burst_count()? {
            0 => Err(TpmError::Timeout),
            n => Ok(usize::from(n)),
        }
    }
}

impl<B: RegisterAccess> TpmInterface for Tis12<B> {
    fn version(&self) -> InterfaceVersion {
        InterfaceVersion::Tis12
    }

    fn init(&mut self) -> Result<DeviceIdentity> {
        let ident = DeviceIdentity {
            caps: IntfCaps::from_bits_retain(self.bus.read_4(TPM_INTF_CAPABILITY)),
            device_id: self.bus.read_4(TPM_ID),
            revision: self.bus.read_1(TPM_REV),
        };

        self.request_locality(0)?;

        // Abort whatever it thought it was doing.
        self.set_status(Status::CMD_READY);

        Ok(ident)
    }

    fn start(&mut self, dir: Direction) -> Result<()> {
        if dir == Direction::Read {
            let read_ms = self.timeouts.read_ms;
            self.wait_for(Status::DATA_AVAIL | Status::VALID, read_ms)?;
            return Ok(());
        }

        self.request_locality(0)?;
        if self.status().contains(Status::CMD_READY) {
            return Ok(());
        }

        // Abort the previous command and restart.
        self.set_status(Status::CMD_READY);
        let ready_ms = self.timeouts.ready_ms;
        self.wait_for(Status::CMD_READY, ready_ms)?;
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8], mode: ReadMode) -> Result<usize> {
        let read_ms = self.timeouts.read_ms;
        let mut count = 0;

        while count < buf.len() {
            self.wait_for(Status::DATA_AVAIL | Status::VALID, read_ms)?;

            let n = (buf.len() - count).min(self.fifo_burst()?);
            for byte in &mut buf[count..count + n] {
                *byte = self.bus.read_1(TPM_DATA);
            }
            count += n;

            if mode == ReadMode::Header && count >= HEADER_PEEK {
                break;
            }
        }

        Ok(count)
    }

    fn write(&mut self, buf: &[u8]) -> Result<()> {
        let Some((&last, body)) = buf.split_last() else {
            return Ok(());
        };
        self.request_locality(0)?;

        let read_ms = self.timeouts.read_ms;
        let mut sent = 0;
        while sent < body.len() {
            let n = (body.len() - sent).min(self.fifo_burst()?);
            for &byte in &body[sent..sent + n] {
                self.bus.write_1(TPM_DATA, byte);
            }
            sent += n;

            let status = self.wait_for(Status::VALID, read_ms)?;
            if !status.contains(Status::DATA_EXPECT) {
                trace!("tis: chip stopped expecting data after {} of {} bytes", sent, buf.len());
                return Err(TpmError::Io);
            }
        }

        // The final byte must be the one that satisfies the chip.
        self.bus.write_1(TPM_DATA, last);
        let status = self.wait_for(Status::VALID, read_ms)?;
        if status.contains(Status::DATA_EXPECT) {
            trace!("tis: chip still expects data after {} bytes", buf.len());
            return Err(TpmError::Io);
        }
        Ok(())
    }

    fn end(&mut self, dir: Direction, prior: Result<()>) -> Result<()> {
        let outcome = match dir {
            Direction::Read => {
                let read_ms = self.timeouts.read_ms;
                let drained = self.wait_for(Status::VALID, read_ms).and_then(|status| {
                    // Leftover response bytes mean the frame was misparsed.
                    if prior.is_ok() && status.contains(Status::DATA_AVAIL) {
                        Err(TpmError::Io)
                    } else {
                        Ok(())
                    }
                });

                self.set_status(Status::CMD_READY);
                self.release_locality();
                drained
            }
            Direction::Write => {
                let outcome = if prior.is_ok() && self.status().contains(Status::DATA_EXPECT) {
                    Err(TpmError::Io)
                } else {
                    Ok(())
                };

                // GO hands the command to the chip; CMD_READY throws it away.
                if prior.is_ok() && outcome.is_ok() {
                    self.set_status(Status::GO);
                } else {
                    self.set_status(Status::CMD_READY);
                }
                outcome
            }
        };

        prior.and(outcome)
    }
}
