//! # UEFI Memory Map Snapshot

extern crate alloc;

use crate::config::BootConfig;
use crate::discovery::DiscoveryError;
use crate::firmware::{Firmware, MemoryMapError, MemoryMapMeta};
use alloc::vec::Vec;
use log::{debug, info, warn};

/// Memory map descriptors together with the key that was current when they
/// were written.
#[derive(Debug)]
pub struct MemoryMapSnapshot {
    /// Owned descriptor buffer; may be longer than `meta.map_size`.
    pub buffer: Vec<u8>,
    pub meta: MemoryMapMeta,
}

impl MemoryMapSnapshot {
    /// The bytes occupied by descriptors.
    #[must_use]
    pub fn descriptors(&self) -> &[u8] {
        &self.buffer[..self.meta.map_size.min(self.buffer.len())]
    }
}

/// Capture the memory map with the two-phase size-then-fill protocol.
///
/// The first query uses an empty buffer; the firmware answers with
/// [`MemoryMapError::BufferTooSmall`] and the required size. A buffer of that
/// size plus [`BootConfig::mmap_slack_descriptors`] descriptors is allocated
/// and the map is queried again. Should the firmware still report a larger
/// map (the allocation itself changed it), the buffer is re-allocated, up to
/// [`BootConfig::mmap_fill_attempts`] times.
///
/// Any allocation made after this call returns invalidates the key.
///
/// # Errors
/// [`DiscoveryError::MemoryMap`] for unexpected firmware failures,
/// [`DiscoveryError::MemoryMapAllocation`] if the buffer cannot be allocated
/// and [`DiscoveryError::MemoryMapUnstable`] if the map never fits.
pub fn capture_memory_map<F: Firmware>(
    firmware: &mut F,
    config: &BootConfig,
) -> Result<MemoryMapSnapshot, DiscoveryError> {
    let (mut required, mut desc_size) = match firmware.query_memory_map(&mut []) {
        Err(MemoryMapError::BufferTooSmall {
            required,
            desc_size,
        }) => (required, desc_size),
        Ok(meta) => (meta.map_size, meta.desc_size),
        Err(MemoryMapError::Firmware(status)) => return Err(DiscoveryError::MemoryMap(status)),
    };

    for attempt in 1..=config.mmap_fill_attempts {
        let len = config
            .mmap_slack_descriptors
            .checked_mul(desc_size)
            .and_then(|slack| slack.checked_add(required))
            .ok_or(DiscoveryError::SizeOverflow)?;

        debug!("Allocating {len} bytes for a memory map of {required} bytes");
        let mut buffer = firmware
            .allocate_pool(len)
            .map_err(|status| DiscoveryError::MemoryMapAllocation { len, status })?;

        match firmware.query_memory_map(&mut buffer) {
            Ok(meta) => {
                info!(
                    "Memory map captured: {} descriptors of {} bytes, key={:#x}",
                    meta.descriptor_count(),
                    meta.desc_size,
                    meta.map_key.0
                );
                return Ok(MemoryMapSnapshot { buffer, meta });
            }
            Err(MemoryMapError::BufferTooSmall {
                required: grown,
                desc_size: size,
            }) => {
                warn!(
                    "Memory map grew to {grown} bytes while allocating its buffer (attempt {attempt})"
                );
                required = grown;
                desc_size = size;
            }
            Err(MemoryMapError::Firmware(status)) => {
                return Err(DiscoveryError::MemoryMap(status));
            }
        }
    }

    Err(DiscoveryError::MemoryMapUnstable {
        attempts: config.mmap_fill_attempts,
    })
}

/// Re-query the memory map into an existing buffer without allocating.
///
/// Used after a rejected `ExitBootServices`, where the firmware forbids
/// further allocations.
///
/// # Errors
/// [`DiscoveryError::MemoryMapOutgrewBuffer`] if the slack is exhausted.
pub fn refresh_memory_map<F: Firmware>(
    firmware: &mut F,
    buffer: &mut [u8],
) -> Result<MemoryMapMeta, DiscoveryError> {
    match firmware.query_memory_map(buffer) {
        Ok(meta) => {
            debug!(
                "Memory map refreshed: {} bytes, key={:#x}",
                meta.map_size, meta.map_key.0
            );
            Ok(meta)
        }
        Err(MemoryMapError::BufferTooSmall { required, .. }) => {
            Err(DiscoveryError::MemoryMapOutgrewBuffer {
                required,
                available: buffer.len(),
            })
        }
        Err(MemoryMapError::Firmware(status)) => Err(DiscoveryError::MemoryMap(status)),
    }
}
