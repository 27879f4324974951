//! # ELF Segment Loader
//!
//! Streams a kernel image from the boot volume and places every `PT_LOAD`
//! segment at the physical address its program header asks for. This is not a
//! relocating loader: if the firmware cannot hand out exactly that address,
//! loading fails.

extern crate alloc;

use crate::elf::parser::{EHDR_SIZE, ElfError, ElfHeader, PFlags, ProgramHeader, program_headers};
use crate::elf::{PAGE_SIZE, align_down_u64, align_up_u64};
use crate::firmware::{BootFile, Firmware, read_fully};
use alloc::vec::Vec;
use log::{debug, info};
use uefi::Status;
use uefi::boot::MemoryType;

#[derive(Debug, thiserror::Error)]
pub enum LoaderError {
    #[error("The kernel image {path} could not be opened: {status:?}")]
    MissingKernel { path: &'static str, status: Status },
    #[error("The kernel image is not a supported ELF executable: {0}")]
    Format(#[from] ElfError),
    #[error("A file operation on the kernel image failed: {0:?}")]
    Io(Status),
    #[error("Read {actual} of {expected} bytes at file offset {offset:#x}")]
    Truncated {
        offset: u64,
        expected: usize,
        actual: usize,
    },
    #[error("A segment's file size {filesz:#x} exceeds its memory size {memsz:#x}")]
    SegmentSizeMismatch { filesz: u64, memsz: u64 },
    #[error("A pointer arithmetic operation failed due to an underflow or overflow")]
    PointerArithmetic,
    #[error("A provided memory address is out of bounds for the architecture")]
    AddressOutOfBounds,
    #[error("Allocating {pages} pages at {address:#x} failed: {status:?}")]
    PhysicalAllocationFailed {
        address: u64,
        pages: usize,
        status: Status,
    },
    #[error("A pool allocation of {len} bytes failed: {status:?}")]
    PoolAllocationFailed { len: usize, status: Status },
}

impl From<LoaderError> for Status {
    fn from(value: LoaderError) -> Self {
        match value {
            LoaderError::MissingKernel { .. } => Self::NOT_FOUND,
            LoaderError::Format(e) => e.into(),
            LoaderError::Io(status) => status,
            LoaderError::Truncated { .. } => Self::END_OF_FILE,
            LoaderError::PhysicalAllocationFailed { .. }
            | LoaderError::PoolAllocationFailed { .. } => Self::OUT_OF_RESOURCES,
            LoaderError::SegmentSizeMismatch { .. }
            | LoaderError::PointerArithmetic
            | LoaderError::AddressOutOfBounds => Self::LOAD_ERROR,
        }
    }
}

/// A segment that now lives at its final physical address.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct LoadedSegment {
    /// Page-aligned physical base actually allocated.
    pub phys_base: u64,
    /// Number of pages allocated from `phys_base`.
    pub pages: usize,
    /// Physical address requested by the program header.
    pub paddr: u64,
    pub filesz: u64,
    pub memsz: u64,
    /// ELF `p_flags`.
    pub flags: PFlags,
}

/// Outcome of a successful kernel load.
#[derive(Debug, Clone)]
pub struct LoadedKernel {
    /// `e_entry` of the validated header, called directly at handoff.
    pub entry: u64,
    pub segments: Vec<LoadedSegment>,
}

/// Open, validate and load the kernel image at `path`.
///
/// # Errors
/// [`LoaderError::MissingKernel`] before any parsing if the file does not
/// exist, [`LoaderError::Io`] carrying the firmware status if it exists but
/// cannot be opened, [`LoaderError::Format`] if the header is rejected, and any error of
/// [`load_segment`] for the first segment that fails. Segments loaded before a
/// failure are left in place.
pub fn load_kernel<F: Firmware>(
    firmware: &mut F,
    path: &'static str,
) -> Result<LoadedKernel, LoaderError> {
    info!("Attempting to load {path} ...");
    let mut file = firmware.open_file(path).map_err(|status| {
        if status == Status::NOT_FOUND {
            LoaderError::MissingKernel { path, status }
        } else {
            LoaderError::Io(status)
        }
    })?;

    let header = read_elf_header(&mut file)?;
    debug!(
        "ELF header: entry={:#x}, phoff={:#x}, phnum={}, phentsize={}",
        header.e_entry, header.e_phoff, header.e_phnum, header.e_phentsize
    );

    let headers = read_program_headers(firmware, &mut file, &header)?;

    let mut segments = Vec::new();
    for ph in headers.iter().filter(|ph| ph.is_load()) {
        if let Some(segment) = load_segment(firmware, &mut file, ph)? {
            segments.push(segment);
        }
    }

    info!(
        "Kernel loaded: entry={:#x}, segments={}",
        header.e_entry,
        segments.len()
    );

    Ok(LoadedKernel {
        entry: header.e_entry,
        segments,
    })
}

/// Read and validate the ELF header at the start of `file`.
///
/// # Errors
/// [`LoaderError::Format`] for any header the loader cannot run, before
/// anything beyond the first [`EHDR_SIZE`] bytes is read.
pub fn read_elf_header<B: BootFile>(file: &mut B) -> Result<ElfHeader, LoaderError> {
    let mut raw = [0u8; EHDR_SIZE];
    file.set_position(0).map_err(LoaderError::Io)?;
    let read = read_fully(file, &mut raw).map_err(LoaderError::Io)?;
    Ok(ElfHeader::parse(&raw[..read])?)
}

/// Read the program header table declared by `header`.
///
/// The table must lie within the file; this is checked before the table
/// buffer is allocated, so a header cannot request more memory than the
/// file size.
///
/// # Errors
/// [`LoaderError::Truncated`] if the file ends inside the table,
/// [`LoaderError::PoolAllocationFailed`] if no buffer can be allocated.
pub fn read_program_headers<F: Firmware>(
    firmware: &mut F,
    file: &mut F::File,
    header: &ElfHeader,
) -> Result<Vec<ProgramHeader>, LoaderError> {
    let len = header.program_header_table_len()?;

    let file_size = file.size().map_err(LoaderError::Io)?;
    let available =
        usize::try_from(file_size.saturating_sub(header.e_phoff)).unwrap_or(usize::MAX);
    if available < len {
        return Err(LoaderError::Truncated {
            offset: header.e_phoff,
            expected: len,
            actual: available,
        });
    }

    let mut table = firmware
        .allocate_pool(len)
        .map_err(|status| LoaderError::PoolAllocationFailed { len, status })?;

    file.set_position(header.e_phoff).map_err(LoaderError::Io)?;
    let read = read_fully(file, &mut table).map_err(LoaderError::Io)?;
    if read != len {
        return Err(LoaderError::Truncated {
            offset: header.e_phoff,
            expected: len,
            actual: read,
        });
    }

    let headers = program_headers(&table, usize::from(header.e_phentsize))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(headers)
}

/// Allocate the pages for one `PT_LOAD` segment at its physical address and
/// fill them from the file.
///
/// The region is zeroed first, so everything between `p_filesz` and the end
/// of the last page reads as zero. Segments with `p_memsz == 0` are skipped
/// and yield `None`.
///
/// # Errors
/// [`LoaderError::PhysicalAllocationFailed`] if the firmware cannot provide
/// the exact address, [`LoaderError::Truncated`] if the file is shorter than
/// the segment claims.
pub fn load_segment<F: Firmware>(
    firmware: &mut F,
    file: &mut F::File,
    ph: &ProgramHeader,
) -> Result<Option<LoadedSegment>, LoaderError> {
    if ph.p_memsz == 0 {
        debug!("Skipping empty PT_LOAD segment at {:#x}", ph.p_paddr);
        return Ok(None);
    }

    if ph.p_filesz > ph.p_memsz {
        return Err(LoaderError::SegmentSizeMismatch {
            filesz: ph.p_filesz,
            memsz: ph.p_memsz,
        });
    }

    // Page-rounded allocation window (physical)
    let alloc_start = align_down_u64(ph.p_paddr, PAGE_SIZE);
    let phys_end = ph
        .p_paddr
        .checked_add(ph.p_memsz)
        .ok_or(LoaderError::PointerArithmetic)?;
    let alloc_end = align_up_u64(phys_end, PAGE_SIZE).ok_or(LoaderError::PointerArithmetic)?;
    let pages = usize::try_from((alloc_end - alloc_start) / PAGE_SIZE)
        .map_err(|_| LoaderError::AddressOutOfBounds)?;

    let memory_type = if ph.p_flags.execute() {
        MemoryType::LOADER_CODE
    } else {
        MemoryType::LOADER_DATA
    };

    debug!(
        "PT_LOAD: paddr={:#x} filesz={:#x} memsz={:#x} -> {pages} pages at {alloc_start:#x}",
        ph.p_paddr, ph.p_filesz, ph.p_memsz
    );

    let region = firmware
        .allocate_pages_at(alloc_start, pages, memory_type)
        .map_err(|status| LoaderError::PhysicalAllocationFailed {
            address: alloc_start,
            pages,
            status,
        })?;

    // Zero the full region (BSS tail)
    region.fill(0);

    if ph.p_filesz != 0 {
        let in_page = usize::try_from(ph.p_paddr - alloc_start)
            .map_err(|_| LoaderError::AddressOutOfBounds)?;
        let file_len =
            usize::try_from(ph.p_filesz).map_err(|_| LoaderError::AddressOutOfBounds)?;
        let end = in_page
            .checked_add(file_len)
            .ok_or(LoaderError::PointerArithmetic)?;
        let dst = region
            .get_mut(in_page..end)
            .ok_or(LoaderError::AddressOutOfBounds)?;

        file.set_position(ph.p_offset).map_err(LoaderError::Io)?;
        let read = read_fully(file, dst).map_err(LoaderError::Io)?;
        if read != file_len {
            return Err(LoaderError::Truncated {
                offset: ph.p_offset,
                expected: file_len,
                actual: read,
            });
        }
    }

    Ok(Some(LoadedSegment {
        phys_base: alloc_start,
        pages,
        paddr: ph.p_paddr,
        filesz: ph.p_filesz,
        memsz: ph.p_memsz,
        flags: ph.p_flags,
    }))
}
