//! Simulated TIS 1.2 chip for tests
//!
//! Follows the TIS state machine closely enough for the driver: locality
//! grant, idle / ready / reception / completion phases, DATA_EXPECT driven by
//! the length field of the incoming command, and a pluggable responder that
//! runs when GO is written. Time is simulated: sleeps and delays advance a
//! millisecond counter instead of blocking.

use alloc::boxed::Box;
use alloc::sync::Arc;
use alloc::vec::Vec;
use spin::Mutex;

use crate::bus::{Interrupted, RegisterAccess};
use crate::regs::{
    Access, Status, TPM_ACCESS, TPM_CAPS_REQUIRED, TPM_DATA, TPM_ID, TPM_INTF_CAPABILITY,
    TPM_REV, TPM_SIZE, TPM_STS,
};

pub type Responder = Box<dyn FnMut(&[u8]) -> Vec<u8> + Send>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Ready,
    Reception,
    Completion,
}

pub struct ChipState {
    pub caps: u32,
    pub device_id: u32,
    pub revision: u8,
    pub burst: u16,

    pub locality_granted: bool,
    pub deny_locality: bool,
    pub phase: Phase,
    pub fifo_in: Vec<u8>,
    pub fifo_out: Vec<u8>,
    pub out_pos: usize,

    /// Drop DATA_EXPECT once this many command bytes arrived
    pub stop_expect_after: Option<usize>,
    /// Hide DATA_AVAIL until this many RESP_RETRY writes were seen
    pub data_avail_after_retries: Option<usize>,
    pub responder: Option<Responder>,

    pub clock_ms: u64,
    pub sleeps: usize,
    /// Interruptible sleeps fail once the clock reaches this value
    pub interrupt_at_ms: Option<u64>,

    pub sts_writes: Vec<Status>,
    pub access_writes: Vec<Access>,
    /// Every command the chip executed
    pub commands: Vec<Vec<u8>>,
    pub retries: usize,
}

impl ChipState {
    fn declared_len(&self) -> Option<usize> {
        let len = self.fifo_in.get(2..6)?;
        Some(u32::from_be_bytes([len[0], len[1], len[2], len[3]]) as usize)
    }

    fn expecting(&self) -> bool {
        if let Some(limit) = self.stop_expect_after {
            if self.fifo_in.len() >= limit {
                return false;
            }
        }
        match self.declared_len() {
            Some(len) => self.fifo_in.len() < len,
            None => true,
        }
    }

    fn status(&self) -> Status {
        let mut sts = Status::VALID;
        match self.phase {
            Phase::Idle => {}
            Phase::Ready => sts |= Status::CMD_READY,
            Phase::Reception => {
                if self.expecting() {
                    sts |= Status::DATA_EXPECT;
                }
            }
            Phase::Completion => {
                let withheld = self
                    .data_avail_after_retries
                    .map_or(false, |n| self.retries < n);
                if self.out_pos < self.fifo_out.len() && !withheld {
                    sts |= Status::DATA_AVAIL;
                }
            }
        }
        sts
    }

    fn burst(&self) -> u16 {
        match self.phase {
            Phase::Idle => 0,
            _ => self.burst,
        }
    }

    fn write_status(&mut self, value: u8) {
        let bits = Status::from_bits_truncate(value);
        self.sts_writes.push(bits);

        if bits.contains(Status::CMD_READY) {
            self.phase = Phase::Ready;
            self.fifo_in.clear();
            self.fifo_out.clear();
            self.out_pos = 0;
        } else if bits.contains(Status::GO) {
            if self.phase == Phase::Reception && !self.expecting() {
                let cmd = core::mem::take(&mut self.fifo_in);
                self.fifo_out = match self.responder.as_mut() {
                    Some(respond) => respond(&cmd),
                    None => Vec::new(),
                };
                self.out_pos = 0;
                self.commands.push(cmd);
                self.phase = Phase::Completion;
            }
        } else if bits.contains(Status::RESP_RETRY) {
            self.retries += 1;
            self.out_pos = 0;
        }
    }
}

/// Handle on a simulated chip; clones share the same state.
#[derive(Clone)]
pub struct Chip(Arc<Mutex<ChipState>>);

impl Chip {
    pub fn new() -> Self {
        Chip(Arc::new(Mutex::new(ChipState {
            caps: TPM_CAPS_REQUIRED.bits() | 0x100,
            device_id: 0x000b_15d1,
            revision: 0x10,
            burst: 16,
            locality_granted: false,
            deny_locality: false,
            phase: Phase::Idle,
            fifo_in: Vec::new(),
            fifo_out: Vec::new(),
            out_pos: 0,
            stop_expect_after: None,
            data_avail_after_retries: None,
            responder: None,
            clock_ms: 0,
            sleeps: 0,
            interrupt_at_ms: None,
            sts_writes: Vec::new(),
            access_writes: Vec::new(),
            commands: Vec::new(),
            retries: 0,
        })))
    }

    /// Inspect or reconfigure the chip.
    pub fn with<R>(&self, f: impl FnOnce(&mut ChipState) -> R) -> R {
        f(&mut self.0.lock())
    }

    pub fn set_responder(&self, responder: impl FnMut(&[u8]) -> Vec<u8> + Send + 'static) {
        self.with(|st| st.responder = Some(Box::new(responder)));
    }
}

impl RegisterAccess for Chip {
    fn read_1(&self, offset: usize) -> u8 {
        assert!(offset < TPM_SIZE);
        let mut st = self.0.lock();
        match offset {
            TPM_ACCESS => {
                let mut access = Access::VALID;
                if st.locality_granted {
                    access |= Access::ACTIVE_LOCALITY;
                }
                access.bits()
            }
            TPM_STS => st.status().bits(),
            o if o == TPM_STS + 1 => st.burst() as u8,
            o if o == TPM_STS + 2 => (st.burst() >> 8) as u8,
            TPM_DATA => {
                if st.phase == Phase::Completion && st.out_pos < st.fifo_out.len() {
                    let b = st.fifo_out[st.out_pos];
                    st.out_pos += 1;
                    b
                } else {
                    0xff
                }
            }
            TPM_REV => st.revision,
            _ => 0xff,
        }
    }

    fn read_4(&self, offset: usize) -> u32 {
        let st = self.0.lock();
        match offset {
            TPM_INTF_CAPABILITY => st.caps,
            TPM_ID => st.device_id,
            _ => u32::MAX,
        }
    }

    fn write_1(&self, offset: usize, value: u8) {
        let mut st = self.0.lock();
        match offset {
            TPM_ACCESS => {
                let bits = Access::from_bits_truncate(value);
                st.access_writes.push(bits);
                if bits.contains(Access::REQUEST_USE) && !st.deny_locality {
                    st.locality_granted = true;
                }
                if bits.contains(Access::ACTIVE_LOCALITY) {
                    st.locality_granted = false;
                }
            }
            TPM_STS => st.write_status(value),
            TPM_DATA => {
                if st.phase == Phase::Ready {
                    st.phase = Phase::Reception;
                }
                if st.phase == Phase::Reception {
                    st.fifo_in.push(value);
                }
            }
            _ => {}
        }
    }

    fn delay_ms(&self, ms: u32) {
        self.0.lock().clock_ms += u64::from(ms);
    }

    fn sleep_ms(&self, ms: u32) -> Result<(), Interrupted> {
        let mut st = self.0.lock();
        if let Some(at) = st.interrupt_at_ms {
            if st.clock_ms >= at {
                return Err(Interrupted);
            }
        }
        st.clock_ms += u64::from(ms);
        st.sleeps += 1;
        Ok(())
    }
}

/// Build a response frame: header with the computed length, then `body`.
pub fn frame(tag: u16, code: u32, body: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(10 + body.len());
    out.extend_from_slice(&tag.to_be_bytes());
    out.extend_from_slice(&((10 + body.len()) as u32).to_be_bytes());
    out.extend_from_slice(&code.to_be_bytes());
    out.extend_from_slice(body);
    out
}

fn ordinal(cmd: &[u8]) -> u32 {
    cmd.get(6..10)
        .map(|c| u32::from_be_bytes([c[0], c[1], c[2], c[3]]))
        .unwrap_or(0)
}

/// TPM 1.2 firmware answering GetRandom with `random` and SaveState with
/// success; anything else gets TPM_BAD_ORDINAL.
pub fn tpm12_firmware(random: Vec<u8>) -> impl FnMut(&[u8]) -> Vec<u8> + Send + 'static {
    move |cmd: &[u8]| match ordinal(cmd) {
        0x46 => {
            let mut body = (random.len() as u32).to_be_bytes().to_vec();
            body.extend_from_slice(&random);
            frame(0x00c4, 0, &body)
        }
        0x98 => frame(0x00c4, 0, &[]),
        _ => frame(0x00c4, 0x0a, &[]),
    }
}

/// TPM 2.0 firmware answering GetRandom with `random` and Shutdown with
/// success; anything else gets TPM_RC_COMMAND_CODE.
pub fn tpm20_firmware(random: Vec<u8>) -> impl FnMut(&[u8]) -> Vec<u8> + Send + 'static {
    move |cmd: &[u8]| match ordinal(cmd) {
        0x17b => {
            let mut body = (random.len() as u16).to_be_bytes().to_vec();
            body.extend_from_slice(&random);
            frame(0x8001, 0, &body)
        }
        0x145 => frame(0x8001, 0, &[]),
        _ => frame(0x8001, 0x143, &[]),
    }
}
