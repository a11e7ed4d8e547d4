pub mod config;
pub mod core;
pub mod daemon;
pub mod host;
pub mod store;
pub mod sync;

use std::sync::atomic::{AtomicBool, Ordering};

/// Whether debug logging is active, shared between the logger filter and the config toggle.
static DEBUG_LOGGING: AtomicBool = AtomicBool::new(false);

pub fn set_debug_logging(enabled: bool) {
    DEBUG_LOGGING.store(enabled, Ordering::Relaxed);
}

pub fn debug_logging() -> bool {
    DEBUG_LOGGING.load(Ordering::Relaxed)
}

/// Route `log` records to the systemd user journal under `identifier`
/// (`journalctl --user -t clerk -f`). Crate targets log at info, or debug
/// when toggled; everything else at warn.
pub fn init_logging(identifier: &str, debug: bool) -> Result<(), Box<dyn std::error::Error>> {
    struct FilteredJournal {
        inner: systemd_journal_logger::JournalLog,
    }

    impl log::Log for FilteredJournal {
        fn enabled(&self, metadata: &log::Metadata) -> bool {
            if metadata.target().starts_with("clerk") || metadata.target().starts_with("sync_check") {
                let max = if debug_logging() { log::LevelFilter::Debug } else { log::LevelFilter::Info };
                metadata.level() <= max
            } else {
                metadata.level() <= log::LevelFilter::Warn
            }
        }
        fn log(&self, record: &log::Record) {
            if self.enabled(record.metadata()) {
                self.inner.log(record);
            }
        }
        fn flush(&self) {
            self.inner.flush();
        }
    }

    let journal = systemd_journal_logger::JournalLog::new()?
        .with_syslog_identifier(identifier.to_string());

    set_debug_logging(debug);

    log::set_boxed_logger(Box::new(FilteredJournal { inner: journal }))?;
    // Global max must be Debug so crate debug logs can pass through when toggled
    log::set_max_level(log::LevelFilter::Debug);
    Ok(())
}
