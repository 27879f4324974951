//! # ELF file handling

pub mod loader;
pub mod parser;

pub use kernel_info::PAGE_SIZE;

#[inline]
pub(crate) const fn align_down_u64(x: u64, a: u64) -> u64 {
    // 'a' must be a power of two
    x & !(a - 1)
}

#[inline]
pub(crate) const fn align_up_u64(x: u64, a: u64) -> Option<u64> {
    // 'a' must be a power of two
    match x.checked_add(a - 1) {
        Some(v) => Some(v & !(a - 1)),
        None => None,
    }
}
