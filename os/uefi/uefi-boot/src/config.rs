//! # Loader Configuration
//!
//! There is no command line and no configuration file; everything the loader
//! needs to know is fixed at build time in [`BootConfig::DEFAULT`].

/// Build-time knobs of the boot pipeline.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct BootConfig {
    /// Kernel ELF image, relative to the boot volume root.
    pub kernel_path: &'static str,

    /// PSF1 console font, relative to the boot volume root.
    pub font_path: &'static str,

    /// Extra descriptors of headroom added to the memory map buffer.
    ///
    /// Allocating the buffer itself may split a free region, and a failed
    /// `ExitBootServices` must be followed by a re-query into the *same*
    /// buffer because no allocation is allowed at that point.
    pub mmap_slack_descriptors: usize,

    /// How often the allocate-then-fill step is repeated if the firmware
    /// keeps growing the map in between.
    pub mmap_fill_attempts: usize,

    /// Upper bound for `ExitBootServices` calls with a refreshed map key.
    pub max_exit_attempts: usize,
}

impl BootConfig {
    pub const DEFAULT: Self = Self {
        kernel_path: "\\kernel.elf",
        font_path: "\\zap-light16.psf",
        mmap_slack_descriptors: 8,
        mmap_fill_attempts: 4,
        max_exit_attempts: 3,
    };
}

impl Default for BootConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}
