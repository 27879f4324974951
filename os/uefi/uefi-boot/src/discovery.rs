//! # Platform Resource Discovery
//!
//! Gathers what the kernel needs to know about the platform while boot
//! services are still around: framebuffer geometry, a console font, the ACPI
//! root pointer and the memory map.
//!
//! Only the memory map is mandatory. It is also captured last, because every
//! allocation or free after the snapshot invalidates its key.

use crate::assembler::BootInfoSlot;
use crate::config::BootConfig;
use crate::firmware::Firmware;
use alloc::boxed::Box;
use kernel_info::boot::FramebufferInfo;
use log::{info, warn};
use uefi::Status;

pub mod acpi;
pub mod font;
pub mod framebuffer;
pub mod memory_map;

use acpi::find_rsdp_addr;
use font::{FontResource, load_font};
use framebuffer::snapshot_framebuffer;
use memory_map::{MemoryMapSnapshot, capture_memory_map};

#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub enum DiscoveryError {
    #[error("The firmware failed to report the memory map: {0:?}")]
    MemoryMap(Status),
    #[error("Allocating {len} bytes for the memory map failed: {status:?}")]
    MemoryMapAllocation { len: usize, status: Status },
    #[error("The memory map kept growing over {attempts} attempts")]
    MemoryMapUnstable { attempts: usize },
    #[error("The memory map needs {required} bytes but only {available} are reserved")]
    MemoryMapOutgrewBuffer { required: usize, available: usize },
    #[error("The memory map buffer size overflows")]
    SizeOverflow,
}

impl From<DiscoveryError> for Status {
    fn from(value: DiscoveryError) -> Self {
        match value {
            DiscoveryError::MemoryMap(status) => status,
            DiscoveryError::MemoryMapAllocation { .. } | DiscoveryError::SizeOverflow => {
                Self::OUT_OF_RESOURCES
            }
            DiscoveryError::MemoryMapUnstable { .. }
            | DiscoveryError::MemoryMapOutgrewBuffer { .. } => Self::BUFFER_TOO_SMALL,
        }
    }
}

/// Everything discovery produced, owned until the assembler hands it over.
#[derive(Debug)]
pub struct PlatformResources {
    pub framebuffer: Option<Box<FramebufferInfo>>,
    pub font: Option<FontResource>,
    pub rsdp_addr: Option<u64>,
    /// Storage for the boot information record, reserved before the memory
    /// map snapshot so that assembly does not allocate.
    pub boot_info: BootInfoSlot,
    pub memory_map: MemoryMapSnapshot,
}

/// Run all discovery steps; the memory map snapshot comes last.
///
/// # Errors
/// Only memory map failures are reported; all other resources degrade to
/// "absent".
pub fn discover_platform<F: Firmware>(
    firmware: &mut F,
    config: &BootConfig,
) -> Result<PlatformResources, DiscoveryError> {
    let framebuffer = snapshot_framebuffer(firmware);
    let font = load_font(firmware, config.font_path);

    let tables = firmware.configuration_tables();
    let rsdp_addr = find_rsdp_addr(&tables);
    drop(tables);
    match rsdp_addr {
        Some(addr) => info!("ACPI RSDP at {addr:#x}"),
        None => warn!("No ACPI RSDP in the configuration table"),
    }

    let boot_info = BootInfoSlot::reserve();

    // No allocation and no free from here on until the handoff.
    let memory_map = capture_memory_map(firmware, config)?;

    Ok(PlatformResources {
        framebuffer,
        font,
        rsdp_addr,
        boot_info,
        memory_map,
    })
}
