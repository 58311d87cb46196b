//! Trusted Platform Module (TPM) driver
//!
//! Drives TPM 1.2 and TPM 2.0 chips over the TIS 1.2 memory-mapped register
//! interface. Provides:
//! - the TIS transport (locality, burst count, status polling, FIFO I/O)
//! - GetRandom framing for both TPM generations
//! - an entropy feed into the kernel pool
//! - SaveState / Shutdown on suspend
//! - the `/dev/tpm` passthrough character device

#![cfg_attr(not(test), no_std)]

extern crate alloc;

pub mod bus;
pub mod cdev;
pub mod commands;
pub mod config;
pub mod device;
pub mod drivers;
pub mod error;
pub mod random;
pub mod regs;
pub mod response;

#[cfg(test)]
mod sim;

pub use bus::{Interrupted, RegisterAccess};
pub use cdev::{CharDevice, TpmIocGetInfo, TPM_API_VERSION, TPM_BUFSIZ, TPM_IOC_GETINFO};
pub use config::{TisTimeouts, TpmConfig};
pub use device::{InterfaceVersion, TpmDevice, TpmVersion};
pub use drivers::tis::Tis12;
pub use drivers::{transaction, DeviceIdentity, Direction, ReadMode, TpmInterface};
pub use error::{Result, TpmError};
pub use random::{EntropySink, RndFlags, WorkQueue};
