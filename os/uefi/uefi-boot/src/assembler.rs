//! # Boot Information Assembler
//!
//! Packs the loader's and discovery's results into the [`KernelBootInfo`]
//! record. Assembly is infallible and performs no allocation: the record's
//! storage was reserved during discovery, and every owned buffer is leaked
//! in place so its address can be handed to the kernel.

extern crate alloc;

use crate::discovery::memory_map::{MemoryMapSnapshot, refresh_memory_map};
use crate::discovery::{DiscoveryError, PlatformResources};
use crate::firmware::{Firmware, MemoryMapKey, MemoryMapMeta};
use alloc::boxed::Box;
use core::mem::MaybeUninit;
use kernel_info::boot::{FramebufferInfo, KernelBootInfo};

/// Uninitialized storage for the boot information record.
#[derive(Debug)]
pub struct BootInfoSlot(Box<MaybeUninit<KernelBootInfo>>);

impl BootInfoSlot {
    #[must_use]
    pub fn reserve() -> Self {
        Self(Box::new_uninit())
    }

    fn fill(self, info: KernelBootInfo) -> &'static mut KernelBootInfo {
        Box::leak(self.0).write(info)
    }
}

/// The assembled record plus the memory map buffer it points to.
///
/// Everything in here is leaked and now logically owned by the kernel; the
/// loader only touches it again to refresh the memory map after a rejected
/// `ExitBootServices`.
#[derive(Debug)]
pub struct AssembledBootInfo {
    record: &'static mut KernelBootInfo,
    memory_map: &'static mut [u8],
    meta: MemoryMapMeta,
}

impl AssembledBootInfo {
    #[must_use]
    pub fn record(&self) -> &KernelBootInfo {
        self.record
    }

    #[must_use]
    pub const fn memory_map_meta(&self) -> MemoryMapMeta {
        self.meta
    }

    /// Re-query the memory map into the already handed-out buffer and update
    /// the record. Returns the new map key.
    pub(crate) fn refresh_memory_map<F: Firmware>(
        &mut self,
        firmware: &mut F,
    ) -> Result<MemoryMapKey, DiscoveryError> {
        let meta = refresh_memory_map(firmware, self.memory_map)?;
        self.meta = meta;
        self.record.mmap_size = meta.map_size as u64;
        self.record.mmap_desc_size = meta.desc_size as u64;
        Ok(meta.map_key)
    }

    pub(crate) fn into_record(self) -> &'static KernelBootInfo {
        self.record
    }
}

/// Write the discovered resources into the reserved record.
#[must_use]
pub fn assemble(resources: PlatformResources) -> AssembledBootInfo {
    let PlatformResources {
        framebuffer,
        font,
        rsdp_addr,
        boot_info,
        memory_map: MemoryMapSnapshot { buffer, meta },
    } = resources;

    let memory_map = buffer.leak();

    let record = boot_info.fill(KernelBootInfo {
        framebuffer: framebuffer.map_or(0, |fb| {
            core::ptr::from_ref::<FramebufferInfo>(Box::leak(fb)) as u64
        }),
        font: font.map_or(0, |font| font.leak()),
        mmap_ptr: memory_map.as_ptr() as u64,
        mmap_size: meta.map_size as u64,
        mmap_desc_size: meta.desc_size as u64,
        rsdp_addr: rsdp_addr.unwrap_or(0),
    });

    AssembledBootInfo {
        record,
        memory_map,
        meta,
    }
}
