use core::sync::atomic::{AtomicBool, Ordering};
use log::{LevelFilter, Log, Metadata, Record, SetLoggerError};
use qemu_debugcon::debugcon_print;

/// Writes every record to the QEMU debug console and, while boot services
/// are available, mirrors it to the UEFI text console.
pub struct UefiLogger {
    max_level: LevelFilter,
    console: AtomicBool,
}

impl UefiLogger {
    #[must_use]
    pub const fn new(max_level: LevelFilter) -> Self {
        Self {
            max_level,
            console: AtomicBool::new(true),
        }
    }

    /// Register as the global logger. Call this once during early init.
    #[allow(clippy::missing_errors_doc)]
    pub fn install(&'static self) -> Result<(), SetLoggerError> {
        log::set_logger(self)?;
        log::set_max_level(self.max_level);
        Ok(())
    }

    /// Stop writing to the UEFI console. Must happen before the first
    /// `ExitBootServices` call; the console is gone afterwards even if the
    /// call fails.
    pub fn detach_console(&self) {
        self.console.store(false, Ordering::Release);
    }
}

impl Log for UefiLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.max_level
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }

        // Format: "[LEVEL] target: message\n"
        debugcon_print!(
            "[{}] {}: {}\n",
            record.level(),
            record.target(),
            record.args()
        );

        if self.console.load(Ordering::Acquire) {
            uefi::println!(
                "[{}] {}: {}",
                record.level(),
                record.target(),
                record.args()
            );
        }
    }

    fn flush(&self) {
        // no-op for qemu debug port
    }
}
