//! Entropy feed
//!
//! The kernel entropy pool calls [`RngState::request`] (through
//! `TpmDevice::rng_get`) when it wants more bytes. Requests are coalesced:
//! while one is pending a new one is dropped, and the worker only ever sees
//! the count recorded first. The worker runs from a work queue, takes the
//! device lock and issues GetRandom until the request is covered. The first
//! hard failure disables the source for good.

use core::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use bitflags::bitflags;
use log::{trace, warn};

use crate::device::TpmVersion;
use crate::drivers::TpmInterface;
use crate::response;

bitflags! {
    /// Entropy source registration flags (rndsource)
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct RndFlags: u32 {
        const NO_ESTIMATE    = 0x0000_0100;
        const NO_COLLECT     = 0x0000_0200;
        const FAST           = 0x0000_0400;
        const HAS_CB         = 0x0000_0800;
        const COLLECT_TIME   = 0x0000_1000;
        const COLLECT_VALUE  = 0x0000_2000;
        const ESTIMATE_TIME  = 0x0000_4000;
        const ESTIMATE_VALUE = 0x0000_8000;
    }
}

/// Flags a TPM source registers with.
pub const TPM_RND_FLAGS: RndFlags = RndFlags::COLLECT_VALUE
    .union(RndFlags::ESTIMATE_VALUE)
    .union(RndFlags::HAS_CB);

/// The kernel entropy pool, as seen by a source.
pub trait EntropySink: Send + Sync {
    fn attach_source(&self, name: &str, flags: RndFlags);

    fn detach_source(&self, name: &str);

    /// Mix `data` into the pool, crediting `entropy_bits`.
    fn add_data(&self, name: &str, data: &[u8], entropy_bits: u32);
}

/// Deferred-work primitive. `enqueue` must arrange for one later call to
/// `TpmDevice::rng_work` from thread context; the caller guarantees at most
/// one enqueue is outstanding.
pub trait WorkQueue: Send + Sync {
    fn enqueue(&self);
}

/// Lock-free part of the entropy feed.
#[derive(Debug, Default)]
pub struct RngState {
    pending: AtomicU32,
    disabled: AtomicBool,
}

impl RngState {
    pub const fn new() -> Self {
        Self {
            pending: AtomicU32::new(0),
            disabled: AtomicBool::new(false),
        }
    }

    pub fn is_disabled(&self) -> bool {
        self.disabled.load(Ordering::Acquire)
    }

    pub fn disable(&self) {
        self.disabled.store(true, Ordering::Release);
    }

    pub fn pending(&self) -> u32 {
        self.pending.load(Ordering::Acquire)
    }

    /// Record a request for `nbytes`. Returns `true` if the caller must
    /// schedule the worker, `false` if the source is disabled or a request is
    /// already pending.
    pub fn request(&self, nbytes: usize) -> bool {
        if self.is_disabled() {
            return false;
        }
        // Keep nbytes * 8 representable as a bit count.
        let n = nbytes.min((u32::MAX / 8) as usize) as u32;
        if n == 0 {
            return false;
        }
        self.pending
            .compare_exchange(0, n, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Claim the pending count, leaving room for a new request.
    pub fn take(&self) -> u32 {
        self.pending.swap(0, Ordering::AcqRel)
    }
}

/// Feed the pool until `nbytes` worth of entropy has been collected or a
/// GetRandom fails. Called with the device lock held. Nothing is sent once
/// the source is disabled.
///
/// Returns the number of GetRandom exchanges issued.
pub fn harvest<I: TpmInterface + ?Sized>(
    intf: &mut I,
    version: TpmVersion,
    nbytes: u32,
    state: &RngState,
    sink: &dyn EntropySink,
    name: &str,
) -> usize {
    let mut remaining = nbytes;
    let mut rounds = 0;

    while remaining > 0 && !state.is_disabled() {
        rounds += 1;
        let bits = match response::get_random(intf, version) {
            Ok(Some(random)) => {
                sink.add_data(name, random.as_slice(), random.entropy_bits());
                random.entropy_bits()
            }
            // Busy: nothing credited, try again next round.
            Ok(None) => 0,
            Err(err) => {
                warn!("{}: disabling entropy source ({})", name, err);
                state.disable();
                break;
            }
        };
        remaining -= remaining.min((bits / 8).max(1));
    }

    trace!("{}: entropy round done after {} GetRandom", name, rounds);
    rounds
}
