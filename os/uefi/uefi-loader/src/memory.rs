//! # Boot Services Heap

use core::alloc::{GlobalAlloc, Layout};
use core::ptr::{self, NonNull, null_mut};
use uefi::boot::{self, MemoryType};

/// Backs Rust's global allocator with the UEFI boot services pool.
///
/// Only usable while boot services are active. The pipeline stops allocating
/// and freeing once the memory map has been captured; everything handed to
/// the kernel is leaked, so `dealloc` never runs after `ExitBootServices`.
///
/// Pool memory is 8-byte aligned. Larger alignments are served by
/// over-allocating and storing the original pool pointer in the word right
/// before the returned block.
pub struct BootPoolAllocator;

#[global_allocator]
static GLOBAL_ALLOC: BootPoolAllocator = BootPoolAllocator;

const HEADER: usize = size_of::<usize>();

unsafe impl GlobalAlloc for BootPoolAllocator {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        let align = layout.align().max(HEADER);
        let Some(total) = layout
            .size()
            .max(1)
            .checked_add(align)
            .and_then(|v| v.checked_add(HEADER))
        else {
            return null_mut();
        };

        let Ok(raw) = boot::allocate_pool(MemoryType::LOADER_DATA, total) else {
            return null_mut();
        };

        let raw = raw.as_ptr();
        let offset = (raw as usize + HEADER).next_multiple_of(align) - raw as usize;

        // SAFETY: `offset <= HEADER + align - 1 < total`, so the block and its
        // header lie inside the pool allocation.
        unsafe {
            let block = raw.add(offset);
            ptr::write_unaligned(block.sub(HEADER).cast::<*mut u8>(), raw);
            block
        }
    }

    unsafe fn dealloc(&self, ptr: *mut u8, _layout: Layout) {
        let Some(block) = NonNull::new(ptr) else {
            return;
        };

        // SAFETY: `alloc` stored the pool pointer right before the block.
        let raw = unsafe { ptr::read_unaligned(block.as_ptr().sub(HEADER).cast::<*mut u8>()) };
        if let Some(raw) = NonNull::new(raw) {
            // SAFETY: `raw` came from `allocate_pool` and is freed exactly once.
            let _ = unsafe { boot::free_pool(raw) };
        }
    }
}
