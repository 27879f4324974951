//! # GOP for the Kernel

use kernel_info::boot::{BootPixelFormat, BootPixelMasks, FramebufferInfo};
use log::debug;
use uefi::boot::{self, ScopedProtocol};
use uefi::proto::console::gop::{GraphicsOutput, PixelFormat};

/// Describe the graphics mode the firmware left active, if any.
///
/// The mode is not changed. The protocol is closed again before returning.
pub fn current_framebuffer() -> Option<FramebufferInfo> {
    let mut gop = match get_gop() {
        Ok(gop) => gop,
        Err(e) => {
            debug!("No Graphics Output Protocol: {e:?}");
            return None;
        }
    };

    let mode = gop.current_mode_info();
    let (framebuffer_width, framebuffer_height) = mode.resolution();

    let (framebuffer_format, framebuffer_masks) = match (mode.pixel_format(), mode.pixel_bitmask())
    {
        (PixelFormat::Rgb, _) => (BootPixelFormat::Rgb, BootPixelMasks::default()),
        (PixelFormat::Bgr, _) => (BootPixelFormat::Bgr, BootPixelMasks::default()),
        (PixelFormat::Bitmask, Some(mask)) => (
            BootPixelFormat::Bitmask,
            BootPixelMasks {
                red_mask: mask.red,
                green_mask: mask.green,
                blue_mask: mask.blue,
                alpha_mask: mask.reserved,
            },
        ),
        (PixelFormat::Bitmask | PixelFormat::BltOnly, _) => {
            (BootPixelFormat::BltOnly, BootPixelMasks::default())
        }
    };

    let (framebuffer_ptr, framebuffer_size) = if framebuffer_format == BootPixelFormat::BltOnly {
        (0, 0)
    } else {
        let mut fb = gop.frame_buffer();
        (fb.as_mut_ptr() as u64, fb.size() as u64)
    };

    Some(FramebufferInfo {
        framebuffer_ptr,
        framebuffer_size,
        framebuffer_width: framebuffer_width as u64,
        framebuffer_height: framebuffer_height as u64,
        framebuffer_stride: mode.stride() as u64,
        framebuffer_format,
        framebuffer_masks,
    })
}

/// Fetch the Graphics Output Protocol (GOP).
fn get_gop() -> uefi::Result<ScopedProtocol<GraphicsOutput>> {
    let handle = boot::get_handle_for_protocol::<GraphicsOutput>()?;
    boot::open_protocol_exclusive::<GraphicsOutput>(handle)
}
