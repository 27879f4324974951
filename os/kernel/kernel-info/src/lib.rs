//! # Boot Handoff ABI
//!
//! Data structures shared between the UEFI loader and the kernel. Everything
//! in here crosses the boot boundary as raw memory, so every type is
//! `#[repr(C)]` and built from fixed-size integers.
//!
//! ## Contents
//!
//! ### Boot Information ([`boot`])
//! * [`KernelBootInfo`](boot::KernelBootInfo): the single record the kernel
//!   receives as its only argument.
//! * [`FramebufferInfo`](boot::FramebufferInfo): snapshot of the active GOP mode.
//! * [`KernelEntryFn`](boot::KernelEntryFn): signature of the kernel entry point.
//!
//! ### Bitmap Font ([`font`])
//! * [`Psf1Header`](font::Psf1Header) and [`PsfFont`](font::PsfFont): the PSF1
//!   console font handed over for early text output.
//!
//! ## Record Layout
//!
//! ```text
//! offset  field
//! 0x00    framebuffer      *const FramebufferInfo   (0 = headless)
//! 0x08    font             *const PsfFont           (0 = no font)
//! 0x10    mmap_ptr         *const u8                (raw EFI_MEMORY_DESCRIPTOR array)
//! 0x18    mmap_size        u64                      (bytes)
//! 0x20    mmap_desc_size   u64                      (descriptor stride)
//! 0x28    rsdp_addr        *const c_void            (0 = no ACPI)
//! ```
//!
//! Pointers are identity-mapped physical addresses. The kernel must check each
//! pointer field for zero before dereferencing it; the accessors on
//! [`KernelBootInfo`](boot::KernelBootInfo) do exactly that.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![deny(unsafe_code)]

pub mod boot;
pub mod font;

/// Size of a UEFI page in bytes.
pub const PAGE_SIZE: u64 = 4096;
