//! # Trace output
//!
//! Last words of the loader, written straight to the debug console after
//! boot services are gone.

use kernel_info::boot::{BootPixelFormat, FramebufferInfo, KernelBootInfo};
use kernel_info::font::PsfFont;
use qemu_debugcon::debugcon_print;

pub fn trace_boot_info(boot_info: &KernelBootInfo, entry: u64) {
    debugcon_print!("Boot Info in UEFI Loader:\n");
    debugcon_print!(
        "   BI ptr = {:018x}, entry = {entry:018x}\n",
        core::ptr::from_ref(boot_info) as usize
    );
    debugcon_print!(" MMAP ptr = {:018x}", boot_info.mmap_ptr);
    debugcon_print!(", MMAP size = {}", boot_info.mmap_size);
    debugcon_print!(", MMAP desc size = {}", boot_info.mmap_desc_size);
    debugcon_print!(", descriptors = {}\n", boot_info.mmap_descriptor_count());
    debugcon_print!(" RSDP = {:018x}\n", boot_info.rsdp_addr);

    if let Some(addr) = boot_info.framebuffer_addr() {
        // SAFETY: the assembler stores the address of a leaked `FramebufferInfo`.
        let fb = unsafe { &*(addr.get() as *const FramebufferInfo) };
        debugcon_print!("   FB ptr = {:018x}", fb.framebuffer_ptr);
        debugcon_print!(", FB size = {}", fb.framebuffer_size);
        debugcon_print!(
            ", FB {}x{} stride {}",
            fb.framebuffer_width,
            fb.framebuffer_height,
            fb.framebuffer_stride
        );
        debugcon_print!(", FB format = ");
        match fb.framebuffer_format {
            BootPixelFormat::Rgb => debugcon_print!("RGB\n"),
            BootPixelFormat::Bgr => debugcon_print!("BGR\n"),
            BootPixelFormat::Bitmask => debugcon_print!("Bitmask\n"),
            BootPixelFormat::BltOnly => debugcon_print!("BltOnly\n"),
        }
    } else {
        debugcon_print!("   FB: none\n");
    }

    if let Some(addr) = boot_info.font_addr() {
        // SAFETY: the assembler stores the address of a leaked `PsfFont`.
        let font = unsafe { &*(addr.get() as *const PsfFont) };
        debugcon_print!(
            " Font = {:018x}, {} glyphs of {} bytes\n",
            font.glyph_ptr,
            font.header.glyph_count(),
            font.header.charsize
        );
    } else {
        debugcon_print!(" Font: none\n");
    }
}
