//! # QEMU Debug Console
//!
//! Byte sink for QEMU's `-debugcon` device (I/O port `0x402`). It needs no
//! firmware services and no allocation, so it keeps working after
//! `ExitBootServices` when the UEFI console is gone.
//!
//! ```bash
//! qemu-system-x86_64 ... -debugcon file:debugcon.log
//! ```
//!
//! With the `enabled` feature switched off (or on targets without port I/O)
//! [`debugcon_print!`] compiles to a no-op.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

use core::fmt::{self, Write};

/// The port number for QEMU's debug console.
pub const DEBUGCON_PORT: u16 = 0x402;

/// [`fmt::Write`] adapter over the debug console port.
pub struct DebugconSink;

impl DebugconSink {
    /// Write a single byte to the debug console.
    #[inline]
    pub fn put_byte(byte: u8) {
        #[cfg(all(feature = "enabled", target_arch = "x86_64"))]
        unsafe {
            core::arch::asm!(
                "out dx, al",
                in("dx") DEBUGCON_PORT,
                in("al") byte,
                options(nomem, nostack, preserves_flags)
            );
        }

        #[cfg(not(all(feature = "enabled", target_arch = "x86_64")))]
        let _ = byte;
    }
}

impl Write for DebugconSink {
    #[inline]
    fn write_str(&mut self, s: &str) -> fmt::Result {
        s.bytes().for_each(Self::put_byte);
        Ok(())
    }
}

#[doc(hidden)]
#[inline]
pub fn debugcon_write(args: fmt::Arguments) {
    // Best-effort output; the sink itself never fails.
    let _ = DebugconSink.write_fmt(args);
}

/// Print `format!`-style arguments to the debug console without allocating.
#[macro_export]
macro_rules! debugcon_print {
    ($($arg:tt)*) => {{
        $crate::debugcon_write(core::format_args!($($arg)*));
    }};
}
