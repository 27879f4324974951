//! # GOP for the Kernel

extern crate alloc;

use crate::firmware::Firmware;
use alloc::boxed::Box;
use kernel_info::boot::{BootPixelFormat, FramebufferInfo};
use log::{info, warn};

/// Take a snapshot of the active graphics mode.
///
/// The mode is left as the firmware configured it. Headless platforms yield
/// `None` and boot continues without a framebuffer.
pub fn snapshot_framebuffer<F: Firmware>(firmware: &mut F) -> Option<Box<FramebufferInfo>> {
    let Some(fb) = firmware.framebuffer() else {
        warn!("No graphics output available; continuing headless");
        return None;
    };

    info!(
        "Framebuffer: {}x{} px, stride {} px, {} bytes at {:#x}",
        fb.framebuffer_width,
        fb.framebuffer_height,
        fb.framebuffer_stride,
        fb.framebuffer_size,
        fb.framebuffer_ptr
    );

    if fb.framebuffer_format == BootPixelFormat::BltOnly {
        warn!("Graphics mode has no linear framebuffer (BltOnly)");
    }

    Some(Box::new(fb))
}
