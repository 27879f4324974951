//! # Boot Services Binding
//!
//! Implements the pipeline's [`Firmware`] capability on top of the `uefi`
//! crate. The memory map and `ExitBootServices` go through the raw boot
//! services table, because the pipeline must query the map into a buffer it
//! owns and later hand that exact buffer to the kernel.

extern crate alloc;

use crate::framebuffer::current_framebuffer;
use crate::logger::UefiLogger;
use alloc::vec::Vec;
use kernel_info::PAGE_SIZE;
use kernel_info::boot::{FramebufferInfo, KernelBootInfo, KernelEntryFn};
use uefi::boot::{self, AllocateType, MemoryType};
use uefi::proto::media::file::{File, FileAttribute, FileMode, RegularFile};
use uefi::{CString16, Handle, Status};
use uefi_boot::firmware::{
    BootFile, ConfigurationTable, EntryTrampoline, Firmware, MemoryMapError, MemoryMapKey,
    MemoryMapMeta,
};

/// A regular file on the volume the loader was started from.
pub struct UefiFile(RegularFile);

impl BootFile for UefiFile {
    fn read(&mut self, buffer: &mut [u8]) -> Result<usize, Status> {
        self.0.read(buffer).map_err(|e| e.status())
    }

    fn set_position(&mut self, position: u64) -> Result<(), Status> {
        self.0.set_position(position).map_err(|e| e.status())
    }

    fn size(&mut self) -> Result<u64, Status> {
        let position = self.0.get_position().map_err(|e| e.status())?;
        self.0
            .set_position(RegularFile::END_OF_FILE)
            .map_err(|e| e.status())?;
        let size = self.0.get_position().map_err(|e| e.status())?;
        self.0.set_position(position).map_err(|e| e.status())?;
        Ok(size)
    }
}

/// Boot services as seen from the loader image.
///
/// Holds no firmware resources between calls: every protocol is opened and
/// closed inside the call that needs it, so nothing is released once the
/// memory map has been captured.
pub struct UefiFirmware {
    image: Handle,
    logger: &'static UefiLogger,
}

impl UefiFirmware {
    pub fn new(logger: &'static UefiLogger) -> Self {
        Self {
            image: boot::image_handle(),
            logger,
        }
    }
}

impl Firmware for UefiFirmware {
    type File = UefiFile;

    fn open_file(&mut self, path: &str) -> Result<UefiFile, Status> {
        let path = CString16::try_from(path).map_err(|_| Status::INVALID_PARAMETER)?;
        let mut sfs = boot::get_image_file_system(self.image).map_err(|e| e.status())?;
        let mut volume = sfs.open_volume().map_err(|e| e.status())?;
        let handle = volume
            .open(&path, FileMode::Read, FileAttribute::empty())
            .map_err(|e| e.status())?;
        handle
            .into_regular_file()
            .map(UefiFile)
            .ok_or(Status::NOT_FOUND)
    }

    fn allocate_pool(&mut self, len: usize) -> Result<Vec<u8>, Status> {
        // The global allocator is backed by the boot services pool; reserve
        // fallibly so an exhausted pool comes back as a status.
        let mut buffer = Vec::new();
        buffer
            .try_reserve_exact(len)
            .map_err(|_| Status::OUT_OF_RESOURCES)?;
        buffer.resize(len, 0);
        Ok(buffer)
    }

    fn allocate_pages_at(
        &mut self,
        address: u64,
        pages: usize,
        memory_type: MemoryType,
    ) -> Result<&'static mut [u8], Status> {
        let len = usize::try_from(PAGE_SIZE)
            .ok()
            .and_then(|page| page.checked_mul(pages))
            .ok_or(Status::BAD_BUFFER_SIZE)?;
        let base = boot::allocate_pages(AllocateType::Address(address), memory_type, pages)
            .map_err(|e| e.status())?;

        // SAFETY: the firmware just handed us `pages` pages at `base`, which are
        // identity-mapped while boot services run and never freed.
        Ok(unsafe { core::slice::from_raw_parts_mut(base.as_ptr(), len) })
    }

    fn query_memory_map(&mut self, buffer: &mut [u8]) -> Result<MemoryMapMeta, MemoryMapError> {
        let st = uefi::table::system_table_raw()
            .ok_or(MemoryMapError::Firmware(Status::NOT_READY))?;

        let mut map_size = buffer.len();
        let mut map_key = 0usize;
        let mut desc_size = 0usize;
        let mut desc_version = 0u32;

        // SAFETY: the system table is valid while boot services run, and the
        // firmware writes at most `map_size` bytes into `buffer`.
        let status = unsafe {
            let bs = st.as_ref().boot_services;
            ((*bs).get_memory_map)(
                &raw mut map_size,
                buffer.as_mut_ptr().cast(),
                &raw mut map_key,
                &raw mut desc_size,
                &raw mut desc_version,
            )
        };

        if status == Status::BUFFER_TOO_SMALL {
            return Err(MemoryMapError::BufferTooSmall {
                required: map_size,
                desc_size,
            });
        }
        if status.is_error() {
            return Err(MemoryMapError::Firmware(status));
        }

        Ok(MemoryMapMeta {
            map_size,
            desc_size,
            desc_version,
            map_key: MemoryMapKey(map_key),
        })
    }

    fn configuration_tables(&mut self) -> Vec<ConfigurationTable> {
        uefi::system::with_config_table(|tables| {
            tables
                .iter()
                .map(|entry| ConfigurationTable {
                    guid: entry.guid,
                    address: entry.address as usize as u64,
                })
                .collect()
        })
    }

    fn framebuffer(&mut self) -> Option<FramebufferInfo> {
        current_framebuffer()
    }

    fn terminate_services(&mut self, key: MemoryMapKey) -> Result<(), Status> {
        let st = uefi::table::system_table_raw().ok_or(Status::NOT_READY)?;

        // The console goes away with the first attempt, successful or not.
        self.logger.detach_console();

        // SAFETY: called with the key of the map captured into the buffer
        // the kernel receives; nothing is allocated or freed in between.
        let status = unsafe {
            let bs = st.as_ref().boot_services;
            ((*bs).exit_boot_services)(self.image.as_ptr(), key.0)
        };
        if status.is_error() {
            Err(status)
        } else {
            Ok(())
        }
    }
}

/// Calls the kernel entry point with the `win64` calling convention.
pub struct Win64Trampoline;

impl EntryTrampoline for Win64Trampoline {
    unsafe fn enter(&self, entry: u64, boot_info: &'static KernelBootInfo) -> ! {
        let Ok(entry) = usize::try_from(entry) else {
            unreachable!("kernel entry {entry:#x} exceeds the address space");
        };
        // SAFETY: the caller guarantees `entry` is the loaded kernel's entry point.
        let kernel: KernelEntryFn = unsafe { core::mem::transmute::<usize, KernelEntryFn>(entry) };
        kernel(boot_info)
    }
}
