//! # Firmware Capabilities
//!
//! The boot pipeline never talks to UEFI directly. Everything it needs from the
//! firmware is expressed by the [`Firmware`] and [`BootFile`] traits, and the
//! final jump by [`EntryTrampoline`]. The UEFI application implements them on
//! top of the `uefi` crate; tests implement them with a simulated firmware.

use alloc::vec::Vec;
use kernel_info::boot::{FramebufferInfo, KernelBootInfo};
use uefi::boot::MemoryType;
use uefi::{Guid, Status};

/// A file opened on the boot volume.
pub trait BootFile {
    /// Read up to `buffer.len()` bytes from the current position.
    /// Returns the number of bytes read; 0 means end of file.
    ///
    /// # Errors
    /// The firmware status of a failed read, e.g. [`Status::DEVICE_ERROR`].
    fn read(&mut self, buffer: &mut [u8]) -> Result<usize, Status>;

    /// Move the read position to the absolute byte offset `position`.
    ///
    /// # Errors
    /// The firmware status of a failed seek.
    fn set_position(&mut self, position: u64) -> Result<(), Status>;

    /// File size in bytes.
    ///
    /// # Errors
    /// The firmware status if the size cannot be determined.
    fn size(&mut self) -> Result<u64, Status>;
}

/// Read until `buf` is full or the file ends; returns the bytes read.
///
/// # Errors
/// The status of the first failed [`BootFile::read`].
pub fn read_fully<B: BootFile>(file: &mut B, buf: &mut [u8]) -> Result<usize, Status> {
    let mut filled = 0;
    while filled < buf.len() {
        let read = file.read(&mut buf[filled..])?;
        if read == 0 {
            break;
        }
        filled += read;
    }
    Ok(filled)
}

/// Token proving that a memory map snapshot is still current.
///
/// Any allocation performed by the firmware after the snapshot invalidates it.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct MemoryMapKey(pub usize);

/// Describes the memory map most recently written into a caller buffer.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct MemoryMapMeta {
    /// Bytes of the buffer actually occupied by descriptors.
    pub map_size: usize,
    /// Stride of one descriptor.
    pub desc_size: usize,
    pub desc_version: u32,
    pub map_key: MemoryMapKey,
}

impl MemoryMapMeta {
    #[must_use]
    pub const fn descriptor_count(&self) -> usize {
        if self.desc_size == 0 {
            0
        } else {
            self.map_size / self.desc_size
        }
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub enum MemoryMapError {
    /// Expected answer to a size probe: the buffer must hold `required` bytes.
    #[error("memory map needs {required} bytes ({desc_size} bytes per descriptor)")]
    BufferTooSmall { required: usize, desc_size: usize },
    #[error("memory map query failed: {0:?}")]
    Firmware(Status),
}

/// One entry of the firmware's configuration table list.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct ConfigurationTable {
    pub guid: Guid,
    pub address: u64,
}

/// Boot services consumed by the pipeline.
///
/// Every method is only valid while boot services are active; after a
/// successful [`Firmware::terminate_services`] none of them may be called.
pub trait Firmware {
    type File: BootFile;

    /// Open a file relative to the boot volume root.
    ///
    /// # Errors
    /// [`Status::NOT_FOUND`] if the file does not exist.
    fn open_file(&mut self, path: &str) -> Result<Self::File, Status>;

    /// Allocate a zero-filled scratch buffer from pool memory.
    ///
    /// # Errors
    /// [`Status::OUT_OF_RESOURCES`] if the pool cannot satisfy `len` bytes.
    fn allocate_pool(&mut self, len: usize) -> Result<Vec<u8>, Status>;

    /// Allocate `pages` pages starting exactly at the physical `address`
    /// and return the (identity-mapped) region.
    ///
    /// The contents of the region are unspecified.
    ///
    /// # Errors
    /// A firmware status (typically [`Status::NOT_FOUND`] or
    /// [`Status::OUT_OF_RESOURCES`]) if the range is not available.
    fn allocate_pages_at(
        &mut self,
        address: u64,
        pages: usize,
        memory_type: MemoryType,
    ) -> Result<&'static mut [u8], Status>;

    /// Write the current memory map into `buffer`.
    ///
    /// # Errors
    /// [`MemoryMapError::BufferTooSmall`] if `buffer` cannot hold the map;
    /// this is the expected result of a size probe with an empty buffer.
    fn query_memory_map(&mut self, buffer: &mut [u8]) -> Result<MemoryMapMeta, MemoryMapError>;

    /// The firmware's configuration table list, in firmware order.
    fn configuration_tables(&mut self) -> Vec<ConfigurationTable>;

    /// Snapshot of the active graphics output mode, if there is one.
    fn framebuffer(&mut self) -> Option<FramebufferInfo>;

    /// Terminate boot services.
    ///
    /// # Errors
    /// [`Status::INVALID_PARAMETER`] if `key` no longer matches the memory map.
    fn terminate_services(&mut self, key: MemoryMapKey) -> Result<(), Status>;
}

/// The one-way jump into the kernel.
pub trait EntryTrampoline {
    /// Call `entry` with `boot_info` as its only argument.
    ///
    /// # Safety
    /// `entry` must be the entry point of a loaded kernel image and boot
    /// services must already be terminated. Control never comes back.
    unsafe fn enter(&self, entry: u64, boot_info: &'static KernelBootInfo) -> !;
}
