//! # UEFI Kernel Loader
//!
//! UEFI application that boots the kernel: it loads `\kernel.elf` from the
//! volume it was started from, places the kernel's segments at their physical
//! addresses, collects framebuffer, font, ACPI and memory map information,
//! exits boot services and jumps to the kernel entry point.
//!
//! ```text
//! efi_main
//!   ├─ uefi::helpers::init, logger
//!   ├─ uefi_boot::prepare_handoff      (load, discover, assemble)
//!   ├─ FirmwareActive::exit_boot_services
//!   ├─ trace_boot_info                 (debugcon only)
//!   └─ FirmwareTerminated::enter_kernel
//! ```
//!
//! All decisions live in the `uefi-boot` crate; this binary only binds its
//! capability traits to real boot services.
//!
//! ## Debug output
//!
//! Log records go to the UEFI console until `ExitBootServices` and to QEMU's
//! debug console (port `0x402`) throughout, when built with the `qemu` feature.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![no_main]
#![allow(unsafe_code)]
extern crate alloc;

mod firmware;
mod framebuffer;
mod logger;
mod memory;
mod tracing;

use crate::firmware::{UefiFirmware, Win64Trampoline};
use crate::logger::UefiLogger;
use crate::tracing::trace_boot_info;
use log::{LevelFilter, error, info};
use uefi::prelude::*;
use uefi_boot::config::BootConfig;
use uefi_boot::{BootError, prepare_handoff};

static LOGGER: UefiLogger = UefiLogger::new(LevelFilter::Debug);

#[entry]
fn efi_main() -> Status {
    if uefi::helpers::init().is_err() {
        return Status::UNSUPPORTED;
    }

    if LOGGER.install().is_err() {
        uefi::println!("A logger is already installed");
        return Status::ALREADY_STARTED;
    }

    info!("UEFI Loader reporting to QEMU");

    let config = BootConfig::DEFAULT;
    let mut firmware = UefiFirmware::new(&LOGGER);

    let active = match prepare_handoff(&mut firmware, &config) {
        Ok(active) => active,
        Err(e) => return fail(e),
    };

    let terminated = match active.exit_boot_services(config.max_exit_attempts) {
        Ok(terminated) => terminated,
        Err(e) => return fail(e.into()),
    };

    // Off we pop.
    trace_boot_info(terminated.boot_info(), terminated.entry());
    terminated.enter_kernel(&Win64Trampoline)
}

fn fail(e: BootError) -> Status {
    error!("Boot failed: {e}");
    e.into()
}
