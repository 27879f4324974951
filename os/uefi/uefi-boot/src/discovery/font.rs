//! # PSF1 Console Font
//!
//! Loads the bitmap font the kernel uses for early text output. A missing or
//! malformed font is never fatal; the kernel simply receives no font.

extern crate alloc;

use crate::firmware::{BootFile, Firmware, read_fully};
use alloc::boxed::Box;
use alloc::vec::Vec;
use kernel_info::font::{PSF1_MAGIC, Psf1Header, PsfFont};
use log::{info, warn};
use uefi::Status;

#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub enum FontError {
    #[error("The font file could not be opened: {0:?}")]
    Missing(Status),
    #[error("A file operation on the font failed: {0:?}")]
    Io(Status),
    #[error("Font signature {0:02x?} is not PSF1")]
    BadMagic([u8; 2]),
    #[error("Font declares an empty glyph cell")]
    EmptyGlyphCell,
    #[error("Read {actual} of {expected} font bytes")]
    Truncated { expected: usize, actual: usize },
    #[error("A pool allocation of {len} bytes failed: {status:?}")]
    Allocation { len: usize, status: Status },
}

/// A loaded font: the record handed to the kernel and the glyph table it
/// points into.
#[derive(Debug)]
pub struct FontResource {
    record: Box<PsfFont>,
    glyphs: Vec<u8>,
}

impl FontResource {
    fn new(header: Psf1Header, glyphs: Vec<u8>) -> Self {
        // The glyph buffer's heap address stays put when the Vec is moved.
        let record = Box::new(PsfFont {
            header,
            glyph_ptr: glyphs.as_ptr() as u64,
            glyph_len: glyphs.len() as u64,
        });
        Self { record, glyphs }
    }

    #[must_use]
    pub fn header(&self) -> &Psf1Header {
        &self.record.header
    }

    #[must_use]
    pub fn glyphs(&self) -> &[u8] {
        &self.glyphs
    }

    /// Give up ownership of record and glyph table and return the address of
    /// the record. Neither is ever freed.
    pub(crate) fn leak(self) -> u64 {
        let Self { record, glyphs } = self;
        let _ = glyphs.leak();
        core::ptr::from_ref::<PsfFont>(Box::leak(record)) as u64
    }
}

/// Decode and check the four header bytes of a PSF1 font.
///
/// # Errors
/// [`FontError::BadMagic`] unless the file starts with `36 04`.
pub const fn decode_header(bytes: [u8; Psf1Header::SIZE]) -> Result<Psf1Header, FontError> {
    let header = Psf1Header {
        magic: [bytes[0], bytes[1]],
        mode: bytes[2],
        charsize: bytes[3],
    };

    if !header.has_valid_magic() {
        return Err(FontError::BadMagic(header.magic));
    }
    if header.charsize == 0 {
        return Err(FontError::EmptyGlyphCell);
    }
    Ok(header)
}

/// Open and read the font at `path`.
///
/// # Errors
/// Any [`FontError`]; see [`load_font`] for the forgiving variant.
pub fn read_font<F: Firmware>(firmware: &mut F, path: &str) -> Result<FontResource, FontError> {
    let mut file = firmware.open_file(path).map_err(FontError::Missing)?;

    let mut raw = [0u8; Psf1Header::SIZE];
    file.set_position(0).map_err(FontError::Io)?;
    let read = read_fully(&mut file, &mut raw).map_err(FontError::Io)?;
    if read != raw.len() {
        return Err(FontError::Truncated {
            expected: raw.len(),
            actual: read,
        });
    }
    let header = decode_header(raw)?;

    let len = header.glyph_table_len();
    let mut glyphs = firmware
        .allocate_pool(len)
        .map_err(|status| FontError::Allocation { len, status })?;
    let read = read_fully(&mut file, &mut glyphs).map_err(FontError::Io)?;
    if read != len {
        return Err(FontError::Truncated {
            expected: len,
            actual: read,
        });
    }

    Ok(FontResource::new(header, glyphs))
}

/// Load the font at `path`, or report why not and carry on without one.
pub fn load_font<F: Firmware>(firmware: &mut F, path: &str) -> Option<FontResource> {
    match read_font(firmware, path) {
        Ok(font) => {
            info!(
                "Font {path}: {} glyphs of {} bytes",
                font.header().glyph_count(),
                font.header().charsize
            );
            Some(font)
        }
        Err(e) => {
            warn!("Continuing without console font {path}: {e}");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kernel_info::font::PSF1_MODE512;

    #[test]
    fn accepts_psf1_signature() {
        let header = decode_header([0x36, 0x04, PSF1_MODE512, 16]).unwrap();
        assert_eq!(header.magic, PSF1_MAGIC);
        assert_eq!(header.glyph_table_len(), 512 * 16);
    }

    #[test]
    fn rejects_foreign_signature() {
        // PSF2 magic starts with 72 b5
        assert_eq!(
            decode_header([0x72, 0xb5, 0x4a, 0x86]),
            Err(FontError::BadMagic([0x72, 0xb5]))
        );
        assert_eq!(
            decode_header([0x04, 0x36, 0, 16]),
            Err(FontError::BadMagic([0x04, 0x36]))
        );
    }

    #[test]
    fn rejects_empty_cells() {
        assert_eq!(
            decode_header([0x36, 0x04, 0, 0]),
            Err(FontError::EmptyGlyphCell)
        );
    }

    #[test]
    fn record_points_at_glyphs() {
        let header = decode_header([0x36, 0x04, 0, 8]).unwrap();
        let font = FontResource::new(header, alloc::vec![0xAA; 8 * 256]);
        assert_eq!(font.record.glyph_ptr, font.glyphs().as_ptr() as u64);
        assert_eq!(font.record.glyph_len, 8 * 256);
    }
}
