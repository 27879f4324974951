//! # ELF Header Parsing
//!
//! Explicit little-endian decoders for the ELF64 file header and program
//! headers. Nothing is reinterpreted in place; every field is read from a
//! byte slice whose length has been checked first.

extern crate alloc;

use uefi::Status;

/// Size of the ELF64 file header.
pub const EHDR_SIZE: usize = 64;

/// Size of an ELF64 program header as this decoder understands it.
/// Files may declare larger entries; the extra bytes are ignored.
pub const PHDR_SIZE: usize = 56;

pub const PT_LOAD: u32 = 1;

const EI_MAGIC_BYTES: [u8; 4] = [0x7F, b'E', b'L', b'F'];
const ELFCLASS64: u8 = 2;
const ELFDATA2LSB: u8 = 1;
const ET_EXEC: u16 = 2;
const EM_X86_64: u16 = 62;
const EV_CURRENT: u32 = 1;

#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub enum ElfError {
    #[error("Need {expected} bytes to decode, got {actual}")]
    Truncated { expected: usize, actual: usize },
    #[error("The ELF magic bytes do not match")]
    BadMagic,
    #[error("ELF class {0} is not ELFCLASS64")]
    UnsupportedClass(u8),
    #[error("ELF data encoding {0} is not little-endian")]
    UnsupportedEndianness(u8),
    #[error("ELF type {0} is not a fixed-address executable (ET_EXEC)")]
    UnsupportedType(u16),
    #[error("ELF machine {0} is not x86-64")]
    UnsupportedMachine(u16),
    #[error("ELF version {0} is not EV_CURRENT")]
    UnsupportedVersion(u32),
    #[error("Program header entries of {0} bytes are smaller than an ELF64 program header")]
    UnsupportedProgramHeaderSize(u16),
    #[error("The program header table size overflows")]
    ProgramHeaderTableOverflow,
}

impl From<ElfError> for Status {
    fn from(_: ElfError) -> Self {
        Self::UNSUPPORTED
    }
}

/// The fields of the ELF64 file header the loader acts on.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct ElfHeader {
    pub magic: [u8; 4],
    pub class: u8,
    pub data: u8,
    pub e_type: u16,
    pub e_machine: u16,
    pub e_version: u32,
    pub e_entry: u64,
    pub e_phoff: u64,
    pub e_phentsize: u16,
    pub e_phnum: u16,
}

impl ElfHeader {
    /// Decode the raw header fields without judging them.
    ///
    /// # Errors
    /// [`ElfError::Truncated`] if `bytes` is shorter than [`EHDR_SIZE`].
    pub fn decode(bytes: &[u8]) -> Result<Self, ElfError> {
        let b = bytes.first_chunk::<EHDR_SIZE>().ok_or(ElfError::Truncated {
            expected: EHDR_SIZE,
            actual: bytes.len(),
        })?;

        Ok(Self {
            magic: field(b, 0),
            class: b[4],
            data: b[5],
            e_type: u16::from_le_bytes(field(b, 16)),
            e_machine: u16::from_le_bytes(field(b, 18)),
            e_version: u32::from_le_bytes(field(b, 20)),
            e_entry: u64::from_le_bytes(field(b, 24)),
            e_phoff: u64::from_le_bytes(field(b, 32)),
            e_phentsize: u16::from_le_bytes(field(b, 54)),
            e_phnum: u16::from_le_bytes(field(b, 56)),
        })
    }

    /// Decode and validate a header. See [`ElfHeader::validate`].
    ///
    /// # Errors
    /// Any [`ElfError`] from decoding or validation.
    pub fn parse(bytes: &[u8]) -> Result<Self, ElfError> {
        let header = Self::decode(bytes)?;
        header.validate()?;
        Ok(header)
    }

    /// Check that this is a 64-bit little-endian x86-64 `ET_EXEC` image of the
    /// current ELF version. Checks run in that order and stop at the first
    /// mismatch; none of them looks at the program header table.
    ///
    /// # Errors
    /// The [`ElfError`] naming the first mismatching field.
    pub const fn validate(&self) -> Result<(), ElfError> {
        if self.magic[0] != EI_MAGIC_BYTES[0]
            || self.magic[1] != EI_MAGIC_BYTES[1]
            || self.magic[2] != EI_MAGIC_BYTES[2]
            || self.magic[3] != EI_MAGIC_BYTES[3]
        {
            return Err(ElfError::BadMagic);
        }
        if self.class != ELFCLASS64 {
            return Err(ElfError::UnsupportedClass(self.class));
        }
        if self.data != ELFDATA2LSB {
            return Err(ElfError::UnsupportedEndianness(self.data));
        }
        if self.e_type != ET_EXEC {
            return Err(ElfError::UnsupportedType(self.e_type));
        }
        if self.e_machine != EM_X86_64 {
            return Err(ElfError::UnsupportedMachine(self.e_machine));
        }
        if self.e_version != EV_CURRENT {
            return Err(ElfError::UnsupportedVersion(self.e_version));
        }
        Ok(())
    }

    /// Byte size of the program header table: `e_phnum * e_phentsize`.
    ///
    /// The file-declared entry size is honored even if it differs from
    /// [`PHDR_SIZE`], as long as an entry can hold a full program header.
    ///
    /// # Errors
    /// [`ElfError::UnsupportedProgramHeaderSize`] for entries that are too small.
    pub fn program_header_table_len(&self) -> Result<usize, ElfError> {
        if usize::from(self.e_phentsize) < PHDR_SIZE {
            return Err(ElfError::UnsupportedProgramHeaderSize(self.e_phentsize));
        }
        usize::from(self.e_phnum)
            .checked_mul(usize::from(self.e_phentsize))
            .ok_or(ElfError::ProgramHeaderTableOverflow)
    }
}

/// One program header table entry.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct ProgramHeader {
    pub p_type: u32,
    pub p_flags: PFlags,
    pub p_offset: u64,
    pub p_vaddr: u64,
    pub p_paddr: u64,
    pub p_filesz: u64,
    pub p_memsz: u64,
    pub p_align: u64,
}

impl ProgramHeader {
    /// Decode a program header from the first [`PHDR_SIZE`] bytes of `bytes`.
    ///
    /// # Errors
    /// [`ElfError::Truncated`] if fewer bytes are available.
    pub fn decode(bytes: &[u8]) -> Result<Self, ElfError> {
        let b = bytes.first_chunk::<PHDR_SIZE>().ok_or(ElfError::Truncated {
            expected: PHDR_SIZE,
            actual: bytes.len(),
        })?;

        Ok(Self {
            p_type: u32::from_le_bytes(field(b, 0)),
            p_flags: PFlags::from_bits(u32::from_le_bytes(field(b, 4))),
            p_offset: u64::from_le_bytes(field(b, 8)),
            p_vaddr: u64::from_le_bytes(field(b, 16)),
            p_paddr: u64::from_le_bytes(field(b, 24)),
            p_filesz: u64::from_le_bytes(field(b, 32)),
            p_memsz: u64::from_le_bytes(field(b, 40)),
            p_align: u64::from_le_bytes(field(b, 48)),
        })
    }

    #[must_use]
    pub const fn is_load(&self) -> bool {
        self.p_type == PT_LOAD
    }
}

/// Decode every entry of a program header table read from the file.
///
/// `table` must be exactly `e_phnum * e_phentsize` bytes long; entries are
/// `entry_size` bytes apart.
pub fn program_headers(
    table: &[u8],
    entry_size: usize,
) -> impl Iterator<Item = Result<ProgramHeader, ElfError>> + '_ {
    table
        .chunks_exact(entry_size.max(1))
        .map(ProgramHeader::decode)
}

/// Bitfield wrapper for `Elf64_Phdr.p_flags` (32-bit)
///
/// Layout (LSB→MSB):
/// - bit 0: execute
/// - bit 1: write
/// - bit 2: read
/// - bits 3..31: reserved (must be zero for standard flags)
#[bitfield_struct::bitfield(u32)]
#[derive(PartialEq, Eq)]
pub struct PFlags {
    #[bits(1)]
    pub execute: bool,
    #[bits(1)]
    pub write: bool,
    #[bits(1)]
    pub read: bool,
    #[bits(29)]
    __: u32,
}

#[inline]
fn field<const W: usize, const N: usize>(bytes: &[u8; N], at: usize) -> [u8; W] {
    let mut raw = [0u8; W];
    raw.copy_from_slice(&bytes[at..at + W]);
    raw
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_header() -> [u8; EHDR_SIZE] {
        let mut b = [0u8; EHDR_SIZE];
        b[0..4].copy_from_slice(&EI_MAGIC_BYTES);
        b[4] = ELFCLASS64;
        b[5] = ELFDATA2LSB;
        b[6] = 1;
        b[16..18].copy_from_slice(&ET_EXEC.to_le_bytes());
        b[18..20].copy_from_slice(&EM_X86_64.to_le_bytes());
        b[20..24].copy_from_slice(&EV_CURRENT.to_le_bytes());
        b[24..32].copy_from_slice(&0x10_1000u64.to_le_bytes());
        b[32..40].copy_from_slice(&64u64.to_le_bytes());
        b[54..56].copy_from_slice(&(PHDR_SIZE as u16).to_le_bytes());
        b[56..58].copy_from_slice(&3u16.to_le_bytes());
        b
    }

    #[test]
    fn decodes_valid_header() {
        let header = ElfHeader::parse(&valid_header()).expect("valid header");
        assert_eq!(header.e_entry, 0x10_1000);
        assert_eq!(header.e_phoff, 64);
        assert_eq!(header.e_phnum, 3);
        assert_eq!(header.program_header_table_len(), Ok(3 * PHDR_SIZE));
    }

    #[test]
    fn rejects_short_input() {
        assert_eq!(
            ElfHeader::parse(&[0x7F, b'E', b'L', b'F']),
            Err(ElfError::Truncated {
                expected: EHDR_SIZE,
                actual: 4
            })
        );
    }

    #[test]
    fn each_identity_field_is_checked() {
        let cases: [(usize, &[u8], ElfError); 6] = [
            (1, b"X", ElfError::BadMagic),
            (4, &[1], ElfError::UnsupportedClass(1)),
            (5, &[2], ElfError::UnsupportedEndianness(2)),
            (16, &[3, 0], ElfError::UnsupportedType(3)),
            (18, &[183, 0], ElfError::UnsupportedMachine(183)),
            (20, &[0, 0, 0, 0], ElfError::UnsupportedVersion(0)),
        ];

        for (offset, patch, expected) in cases {
            let mut b = valid_header();
            b[offset..offset + patch.len()].copy_from_slice(patch);
            assert_eq!(ElfHeader::parse(&b), Err(expected), "patch at {offset}");
        }
    }

    #[test]
    fn honors_declared_entry_size() {
        let mut b = valid_header();
        b[54..56].copy_from_slice(&64u16.to_le_bytes());
        let header = ElfHeader::parse(&b).unwrap();
        assert_eq!(header.program_header_table_len(), Ok(3 * 64));

        b[54..56].copy_from_slice(&32u16.to_le_bytes());
        let header = ElfHeader::parse(&b).unwrap();
        assert_eq!(
            header.program_header_table_len(),
            Err(ElfError::UnsupportedProgramHeaderSize(32))
        );
    }

    #[test]
    fn decodes_program_headers_with_padding() {
        let mut table = [0u8; 2 * 64];
        table[0..4].copy_from_slice(&PT_LOAD.to_le_bytes());
        table[4..8].copy_from_slice(&0b101u32.to_le_bytes());
        table[24..32].copy_from_slice(&0x20_0000u64.to_le_bytes());
        table[32..40].copy_from_slice(&0x10u64.to_le_bytes());
        table[40..48].copy_from_slice(&0x20u64.to_le_bytes());
        // second entry: PT_NOTE
        table[64..68].copy_from_slice(&4u32.to_le_bytes());

        let headers: Result<alloc::vec::Vec<_>, _> = program_headers(&table, 64).collect();
        let headers = headers.unwrap();
        assert_eq!(headers.len(), 2);
        assert!(headers[0].is_load());
        assert!(headers[0].p_flags.execute());
        assert!(headers[0].p_flags.read());
        assert!(!headers[0].p_flags.write());
        assert_eq!(headers[0].p_paddr, 0x20_0000);
        assert_eq!(headers[0].p_filesz, 0x10);
        assert_eq!(headers[0].p_memsz, 0x20);
        assert!(!headers[1].is_load());
    }
}
