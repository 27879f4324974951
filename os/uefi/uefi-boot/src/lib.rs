//! # UEFI Boot Pipeline
//!
//! Loads a fixed-address ELF64 kernel, gathers the platform facts it needs,
//! and hands over control with boot services terminated.
//!
//! ```text
//! ┌──────────────────┐   ┌──────────────────┐   ┌──────────────┐   ┌──────────────────┐
//! │ Kernel Image     │──▶│ Platform         │──▶│ Boot Info    │──▶│ Handoff          │
//! │ Loader  (elf)    │   │ Discovery        │   │ Assembler    │   │ Controller       │
//! └──────────────────┘   └──────────────────┘   └──────────────┘   └──────────────────┘
//!  PT_LOAD → paddr        GOP, PSF1 font,         KernelBootInfo     ExitBootServices,
//!                         ACPI RSDP, mmap                            jump to e_entry
//! ```
//!
//! All firmware access goes through the [`firmware::Firmware`] capability
//! trait, so the pipeline can run against real boot services or a simulation.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

extern crate alloc;

pub mod assembler;
pub mod config;
pub mod discovery;
pub mod elf;
pub mod firmware;
pub mod handoff;

use crate::assembler::assemble;
use crate::config::BootConfig;
use crate::discovery::{DiscoveryError, discover_platform};
use crate::elf::loader::{LoaderError, load_kernel};
use crate::firmware::{EntryTrampoline, Firmware};
use crate::handoff::{FirmwareActive, HandoffError};
use core::convert::Infallible;
use log::info;
use uefi::Status;

#[derive(Debug, thiserror::Error)]
pub enum BootError {
    #[error(transparent)]
    Loader(#[from] LoaderError),
    #[error(transparent)]
    Discovery(#[from] DiscoveryError),
    #[error(transparent)]
    Handoff(#[from] HandoffError),
}

impl From<BootError> for Status {
    fn from(value: BootError) -> Self {
        match value {
            BootError::Loader(e) => e.into(),
            BootError::Discovery(e) => e.into(),
            BootError::Handoff(e) => e.into(),
        }
    }
}

/// Load the kernel, discover the platform and assemble the boot information.
///
/// On success the memory map has just been captured; the caller must not
/// allocate or free anything before calling
/// [`FirmwareActive::exit_boot_services`].
///
/// # Errors
/// A missing or malformed kernel, a failed segment allocation, or a memory
/// map that cannot be captured.
pub fn prepare_handoff<'fw, F: Firmware>(
    firmware: &'fw mut F,
    config: &BootConfig,
) -> Result<FirmwareActive<'fw, F>, BootError> {
    let kernel = load_kernel(firmware, config.kernel_path)?;
    let entry = kernel.entry;
    // Release the segment list now; freeing after the snapshot would stale the key.
    drop(kernel);

    let resources = discover_platform(firmware, config)?;
    let boot_info = assemble(resources);
    info!("Kernel boot info assembled: {:?}", boot_info.record());

    Ok(FirmwareActive::new(firmware, boot_info, entry))
}

/// Run the whole pipeline. Returns only if booting failed before the jump.
///
/// # Errors
/// Every [`BootError`]; after boot services are terminated nothing can fail.
pub fn boot<F: Firmware, T: EntryTrampoline>(
    firmware: &mut F,
    trampoline: &T,
    config: &BootConfig,
) -> Result<Infallible, BootError> {
    let active = prepare_handoff(firmware, config)?;
    let terminated = active.exit_boot_services(config.max_exit_attempts)?;
    terminated.enter_kernel(trampoline)
}
