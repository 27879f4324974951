//! # Kernel Boot Information

use core::num::NonZeroU64;

/// Kernel function pointer.
///
/// # ABI
/// The ABI is defined as `win64` since the kernel is called from a UEFI
/// (PE/COFF) application. The boot information record is the only argument.
#[cfg(target_arch = "x86_64")]
pub type KernelEntryFn = extern "win64" fn(*const KernelBootInfo) -> !;

/// Information the kernel needs right after `ExitBootServices`.
///
/// The field order is part of the ABI. Every pointer is an identity-mapped
/// physical address and may be 0; use the accessors to test for presence.
#[repr(C)]
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct KernelBootInfo {
    /// Pointer to a [`FramebufferInfo`], or 0 on headless platforms.
    pub framebuffer: u64,

    /// Pointer to a [`PsfFont`](crate::font::PsfFont), or 0 if no font was loaded.
    pub font: u64,

    /// Pointer to the raw UEFI memory map buffer (array of `EFI_MEMORY_DESCRIPTOR` bytes).
    pub mmap_ptr: u64,

    /// Length of the memory map in **bytes**.
    pub mmap_size: u64,

    /// Stride of a single memory descriptor in bytes. Can be larger than
    /// `size_of::<EFI_MEMORY_DESCRIPTOR>()`; always step by this value.
    pub mmap_desc_size: u64,

    /// ACPI RSDP physical address, or 0 if the platform has no ACPI.
    pub rsdp_addr: u64,
}

impl KernelBootInfo {
    /// A record with every field zeroed.
    pub const EMPTY: Self = Self {
        framebuffer: 0,
        font: 0,
        mmap_ptr: 0,
        mmap_size: 0,
        mmap_desc_size: 0,
        rsdp_addr: 0,
    };

    #[must_use]
    pub const fn framebuffer_addr(&self) -> Option<NonZeroU64> {
        NonZeroU64::new(self.framebuffer)
    }

    #[must_use]
    pub const fn font_addr(&self) -> Option<NonZeroU64> {
        NonZeroU64::new(self.font)
    }

    #[must_use]
    pub const fn rsdp_addr(&self) -> Option<NonZeroU64> {
        NonZeroU64::new(self.rsdp_addr)
    }

    /// Number of descriptors in the memory map, or 0 if the stride is unknown.
    #[must_use]
    pub const fn mmap_descriptor_count(&self) -> u64 {
        if self.mmap_desc_size == 0 {
            0
        } else {
            self.mmap_size / self.mmap_desc_size
        }
    }
}

#[repr(C)]
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct FramebufferInfo {
    /// Linear framebuffer base address (CPU physical address). Valid to write after `ExitBootServices`.
    pub framebuffer_ptr: u64,

    /// Total framebuffer size in **bytes**.
    pub framebuffer_size: u64,

    /// Visible width in **pixels**.
    pub framebuffer_width: u64,

    /// Visible height in **pixels**.
    pub framebuffer_height: u64,

    /// Pixels per scanline (a.k.a. stride). May be >= width due to padding.
    pub framebuffer_stride: u64,

    /// Pixel format tag. If `BltOnly`, you cannot draw directly.
    pub framebuffer_format: BootPixelFormat,

    /// Pixel bit masks (only meaningful when `framebuffer_format == Bitmask`).
    pub framebuffer_masks: BootPixelMasks,
}

/// Pixel format tag compatible with UEFI GOP.
/// We avoid Rust enums with payloads across the ABI boundary.
#[repr(u32)]
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum BootPixelFormat {
    /// 8:8:8 stored as R,G,B in low-to-high bytes.
    Rgb = 0,
    /// 8:8:8 stored as B,G,R in low-to-high bytes.
    Bgr = 1,
    /// See the masks in [`BootPixelMasks`].
    Bitmask = 2,
    /// No linear framebuffer available.
    BltOnly = 3,
}

/// Bit masks for [`BootPixelFormat::Bitmask`]; zero for every other format.
#[repr(C)]
#[derive(Debug, Default, Copy, Clone, Eq, PartialEq)]
pub struct BootPixelMasks {
    pub red_mask: u32,
    pub green_mask: u32,
    pub blue_mask: u32,
    pub alpha_mask: u32,
}
