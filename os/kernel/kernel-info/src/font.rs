//! # PSF1 Console Font

/// Magic bytes at the start of every PSF1 font file.
pub const PSF1_MAGIC: [u8; 2] = [0x36, 0x04];

/// Mode bit selecting a 512 glyph table instead of 256 glyphs.
pub const PSF1_MODE512: u8 = 0x01;

/// On-disk header of a PSF1 font.
#[repr(C)]
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct Psf1Header {
    /// Must equal [`PSF1_MAGIC`].
    pub magic: [u8; 2],
    /// Mode flags; see [`PSF1_MODE512`].
    pub mode: u8,
    /// Bytes per glyph cell (equals the glyph height for 8 pixel wide glyphs).
    pub charsize: u8,
}

impl Psf1Header {
    /// Encoded size of the header in bytes.
    pub const SIZE: usize = 4;

    /// Number of glyphs in the table that follows the header.
    #[must_use]
    pub const fn glyph_count(&self) -> usize {
        if self.mode & PSF1_MODE512 != 0 {
            512
        } else {
            256
        }
    }

    /// Size of the glyph table in bytes.
    #[must_use]
    pub const fn glyph_table_len(&self) -> usize {
        self.charsize as usize * self.glyph_count()
    }

    #[must_use]
    pub const fn has_valid_magic(&self) -> bool {
        self.magic[0] == PSF1_MAGIC[0] && self.magic[1] == PSF1_MAGIC[1]
    }
}

/// Font resource handed to the kernel.
#[repr(C)]
#[derive(Debug, Clone)]
pub struct PsfFont {
    pub header: Psf1Header,
    /// Physical address of the glyph bitmap table.
    pub glyph_ptr: u64,
    /// Length of the glyph table in bytes; `header.glyph_table_len()`.
    pub glyph_len: u64,
}
