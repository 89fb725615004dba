use crate::DebugPort;
use crate::qemu_fmt::qemu_write;
use log::{LevelFilter, Log, Metadata, Record, SetLoggerError};

pub struct QemuLogger {
    max_level: LevelFilter,
    port: DebugPort,
}

impl QemuLogger {
    #[must_use]
    pub const fn new(max_level: LevelFilter) -> Self {
        Self {
            max_level,
            port: DebugPort::Qemu,
        }
    }

    #[must_use]
    pub const fn with_port(mut self, port: DebugPort) -> Self {
        self.port = port;
        self
    }

    /// Install as the global logger. Call this once during early init.
    ///
    /// # Errors
    /// Fails if a logger was already installed.
    #[allow(static_mut_refs)]
    pub fn init(self) -> Result<(), SetLoggerError> {
        // No allocator exists this early, so the logger lives in a static.
        static mut LOGGER: Option<QemuLogger> = None;

        let max_level = self.max_level;
        let logger: &'static QemuLogger = unsafe { LOGGER.insert(self) };
        log::set_logger(logger)?;
        log::set_max_level(max_level);
        Ok(())
    }
}

impl Log for QemuLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.max_level
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }

        // "[LEVEL] target: message\n"
        qemu_write(
            self.port,
            format_args!("[{}] {}: {}\n", record.level(), record.target(), record.args()),
        );
    }

    fn flush(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use log::Level;

    #[test]
    fn level_filter_gates_records() {
        let logger = QemuLogger::new(LevelFilter::Info);
        let debug = Metadata::builder().level(Level::Debug).build();
        let warn = Metadata::builder().level(Level::Warn).build();
        assert!(!logger.enabled(&debug));
        assert!(logger.enabled(&warn));
    }
}
