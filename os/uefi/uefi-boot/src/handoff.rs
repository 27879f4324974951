//! # Handoff Controller
//!
//! Two states, one transition, no way back:
//!
//! ```text
//! FirmwareActive ──exit_boot_services()──▶ FirmwareTerminated ──enter_kernel()──▶ kernel
//!   (allocation ok)                          (no firmware left)                    (never returns)
//! ```
//!
//! `ExitBootServices` is keyed by the last memory map snapshot. If the firmware
//! rejects the key, the map changed since the snapshot; the map is re-queried
//! into the buffer already handed to the kernel and termination is retried
//! a bounded number of times.

use crate::assembler::AssembledBootInfo;
use crate::discovery::DiscoveryError;
use crate::firmware::{EntryTrampoline, Firmware};
use kernel_info::boot::KernelBootInfo;
use log::{info, warn};
use uefi::Status;

#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub enum HandoffError {
    #[error("ExitBootServices rejected the memory map key {attempts} times")]
    StaleMemoryMapKey { attempts: usize },
    #[error("ExitBootServices failed: {0:?}")]
    Rejected(Status),
    #[error("Refreshing the memory map failed: {0}")]
    MemoryMap(#[from] DiscoveryError),
}

impl From<HandoffError> for Status {
    fn from(value: HandoffError) -> Self {
        match value {
            HandoffError::StaleMemoryMapKey { .. } => Self::INVALID_PARAMETER,
            HandoffError::Rejected(status) => status,
            HandoffError::MemoryMap(e) => e.into(),
        }
    }
}

/// Boot services are available; allocation is still permitted.
pub struct FirmwareActive<'fw, F: Firmware> {
    firmware: &'fw mut F,
    boot_info: AssembledBootInfo,
    entry: u64,
}

/// Boot services are gone. Only the loaded kernel and its boot information
/// remain.
#[derive(Debug)]
pub struct FirmwareTerminated {
    boot_info: &'static KernelBootInfo,
    entry: u64,
}

impl<'fw, F: Firmware> FirmwareActive<'fw, F> {
    pub const fn new(firmware: &'fw mut F, boot_info: AssembledBootInfo, entry: u64) -> Self {
        Self {
            firmware,
            boot_info,
            entry,
        }
    }

    #[must_use]
    pub fn boot_info(&self) -> &KernelBootInfo {
        self.boot_info.record()
    }

    #[must_use]
    pub const fn entry(&self) -> u64 {
        self.entry
    }

    /// Terminate boot services using the captured map key.
    ///
    /// A rejected key (`INVALID_PARAMETER`) triggers a memory map refresh and
    /// another attempt, up to `max_attempts` calls in total. The firmware is
    /// always called at least once.
    ///
    /// # Errors
    /// [`HandoffError::StaleMemoryMapKey`] when the attempts are used up,
    /// [`HandoffError::Rejected`] for any other firmware failure and
    /// [`HandoffError::MemoryMap`] if the refresh fails.
    pub fn exit_boot_services(
        self,
        max_attempts: usize,
    ) -> Result<FirmwareTerminated, HandoffError> {
        let Self {
            firmware,
            mut boot_info,
            entry,
        } = self;

        let max_attempts = max_attempts.max(1);
        info!("Exiting boot services ...");
        let mut key = boot_info.memory_map_meta().map_key;

        for attempt in 1..=max_attempts {
            match firmware.terminate_services(key) {
                Ok(()) => {
                    // No firmware from here on; logging must not reach the UEFI console.
                    info!("Boot services exited, we're now flying by instruments.");
                    return Ok(FirmwareTerminated {
                        boot_info: boot_info.into_record(),
                        entry,
                    });
                }
                Err(status) if status == Status::INVALID_PARAMETER => {
                    warn!("Memory map key {:#x} is stale (attempt {attempt})", key.0);
                    if attempt < max_attempts {
                        key = boot_info.refresh_memory_map(firmware)?;
                    }
                }
                Err(status) => return Err(HandoffError::Rejected(status)),
            }
        }

        Err(HandoffError::StaleMemoryMapKey {
            attempts: max_attempts,
        })
    }
}

impl FirmwareTerminated {
    #[must_use]
    pub const fn boot_info(&self) -> &'static KernelBootInfo {
        self.boot_info
    }

    #[must_use]
    pub const fn entry(&self) -> u64 {
        self.entry
    }

    /// Jump into the kernel. Nothing after this call is reachable.
    pub fn enter_kernel<T: EntryTrampoline>(self, trampoline: &T) -> ! {
        info!("About to jump into the kernel at {:#x}", self.entry);

        // SAFETY: `entry` is the validated entry point of the image whose
        // segments were loaded, and boot services are terminated.
        unsafe { trampoline.enter(self.entry, self.boot_info) }
    }
}
