//! Per-chip driver state
//!
//! One [`TpmDevice`] exists per attached chip. Its mutex serializes every
//! transaction on the chip: the character device, the entropy worker and the
//! suspend hook all go through it.

use alloc::sync::Arc;

use log::{error, info, trace};
use spin::{Mutex, MutexGuard};

use crate::bus::RegisterAccess;
use crate::cdev::{TpmIocGetInfo, TPM_API_VERSION};
use crate::config::TpmConfig;
use crate::drivers::tis::Tis12;
use crate::drivers::{DeviceIdentity, TpmInterface};
use crate::error::Result;
use crate::random::{self, EntropySink, RngState, WorkQueue, TPM_RND_FLAGS};
use crate::response;

/// TPM generation, fixed at attach time.
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TpmVersion {
    Tpm12 = 0,
    Tpm20 = 1,
}

/// Register transport generation.
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterfaceVersion {
    Tis12 = 0,
}

/// State guarded by the device lock.
pub(crate) struct Locked<I> {
    pub(crate) intf: I,
    /// Set while a userspace client holds the device open
    pub(crate) busy: bool,
}

pub struct TpmDevice<I> {
    config: TpmConfig,
    ident: DeviceIdentity,
    itf_version: InterfaceVersion,
    inner: Mutex<Locked<I>>,
    rng: RngState,
    sink: Arc<dyn EntropySink>,
    queue: Arc<dyn WorkQueue>,
}

impl<B: RegisterAccess> TpmDevice<Tis12<B>> {
    /// Probe for a TIS 1.2 chip behind `bus` and attach it.
    pub fn attach_tis(
        config: TpmConfig,
        bus: B,
        sink: Arc<dyn EntropySink>,
        queue: Arc<dyn WorkQueue>,
    ) -> Result<Self> {
        Tis12::probe(&bus, &config.timeouts)?;
        Self::attach(config, Tis12::new(bus, config.timeouts), sink, queue)
    }
}

impl<I: TpmInterface> TpmDevice<I> {
    /// Initialize the transport and register the entropy source.
    pub fn attach(
        config: TpmConfig,
        mut intf: I,
        sink: Arc<dyn EntropySink>,
        queue: Arc<dyn WorkQueue>,
    ) -> Result<Self> {
        let ident = intf.init()?;
        info!(
            "{}: device {:#010x} rev {:#x}",
            config.name, ident.device_id, ident.revision
        );

        sink.attach_source(config.name, TPM_RND_FLAGS);

        Ok(Self {
            config,
            ident,
            itf_version: intf.version(),
            inner: Mutex::new(Locked { intf, busy: false }),
            rng: RngState::new(),
            sink,
            queue,
        })
    }

    /// Unregister the entropy source and hand the transport back.
    pub fn detach(self) -> I {
        self.sink.detach_source(self.config.name);
        self.inner.into_inner().intf
    }

    pub fn name(&self) -> &'static str {
        self.config.name
    }

    pub fn version(&self) -> TpmVersion {
        self.config.version
    }

    pub fn identity(&self) -> DeviceIdentity {
        self.ident
    }

    pub fn rng_disabled(&self) -> bool {
        self.rng.is_disabled()
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, Locked<I>> {
        self.inner.lock()
    }

    /// Entropy pool callback: the pool wants `nbytes` more bytes.
    pub fn rng_get(&self, nbytes: usize) {
        if self.rng.request(nbytes) {
            trace!("{}: scheduling entropy worker for {} bytes", self.config.name, nbytes);
            self.queue.enqueue();
        }
    }

    /// Work queue entry point.
    pub fn rng_work(&self) {
        let nbytes = self.rng.take();
        // A request may have been queued before the previous run disabled
        // the source.
        if nbytes == 0 || self.rng.is_disabled() {
            return;
        }

        let mut locked = self.inner.lock();
        random::harvest(
            &mut locked.intf,
            self.config.version,
            nbytes,
            &self.rng,
            self.sink.as_ref(),
            self.config.name,
        );
    }

    /// Power hook: tell the chip to save its state before sleep.
    pub fn suspend(&self) -> bool {
        let mut locked = self.inner.lock();
        match response::save_state(&mut locked.intf, self.config.version) {
            Ok(()) => true,
            Err(err) => {
                error!("{}: suspend failed: {}", self.config.name, err);
                false
            }
        }
    }

    /// Power hook: firmware restores the TPM, nothing to do.
    pub fn resume(&self) -> bool {
        true
    }

    pub fn get_info(&self) -> TpmIocGetInfo {
        TpmIocGetInfo {
            api_version: TPM_API_VERSION,
            tpm_version: self.config.version as u32,
            itf_version: self.itf_version as u32,
            device_id: self.ident.device_id,
            device_rev: u32::from(self.ident.revision),
            device_caps: self.ident.caps.bits(),
        }
    }
}
