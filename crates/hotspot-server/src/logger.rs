//! Console logger
//!
//! Level prefix, module path and message, one line per record on stderr.

use log::{LevelFilter, Log, Metadata, Record, SetLoggerError};
use std::io::Write;

/// Variable holding the level name
pub const LOG_ENV: &str = "HOTSPOT_LOG";

struct ConsoleLogger;

static LOGGER: ConsoleLogger = ConsoleLogger;

impl ConsoleLogger {
    fn level_prefix(level: log::Level) -> &'static str {
        match level {
            log::Level::Error => "[ERROR] ",
            log::Level::Warn => "[WARN ] ",
            log::Level::Info => "[INFO ] ",
            log::Level::Debug => "[DEBUG] ",
            log::Level::Trace => "[TRACE] ",
        }
    }
}

impl Log for ConsoleLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }

        let mut out = std::io::stderr().lock();
        let prefix = Self::level_prefix(record.level());
        // Nowhere left to report a failed console write
        let _ = match record.module_path() {
            Some(module) => writeln!(out, "{prefix}[{module}] {}", record.args()),
            None => writeln!(out, "{prefix}{}", record.args()),
        };
    }

    fn flush(&self) {
        let _ = std::io::stderr().flush();
    }
}

/// Parse a level name; unknown names fall back to `Info`
pub fn parse_level(name: Option<&str>) -> LevelFilter {
    name.and_then(|name| name.trim().parse().ok())
        .unwrap_or(LevelFilter::Info)
}

/// Install the console logger at `level`
pub fn init(level: LevelFilter) -> Result<(), SetLoggerError> {
    log::set_logger(&LOGGER)?;
    log::set_max_level(level);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_level() {
        assert_eq!(parse_level(None), LevelFilter::Info);
        assert_eq!(parse_level(Some("debug")), LevelFilter::Debug);
        assert_eq!(parse_level(Some(" WARN ")), LevelFilter::Warn);
        assert_eq!(parse_level(Some("off")), LevelFilter::Off);
        assert_eq!(parse_level(Some("loud")), LevelFilter::Info);
    }
}
