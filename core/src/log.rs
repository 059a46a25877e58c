//! Logging setup. Modules log through the `tracing` macros; this only installs the subscriber.

use tracing::level_filters::LevelFilter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Level {
    Off = 0,
    Trace = 1,
    Debug = 2,
    Warn = 3,
    Error = 4,
}

impl Level {
    fn filter(&self) -> LevelFilter {
        match self {
            Level::Off => LevelFilter::OFF,
            Level::Trace => LevelFilter::TRACE,
            Level::Debug => LevelFilter::DEBUG,
            Level::Warn => LevelFilter::WARN,
            Level::Error => LevelFilter::ERROR,
        }
    }
}

/// Installs a stderr subscriber showing events at `level` and above.
/// Only the first call in a process takes effect, so tests may call it freely.
pub fn log_init(level: Level) {
    let _ = tracing_subscriber::fmt()
        .with_max_level(level.filter())
        .with_writer(std::io::stderr)
        .with_file(true)
        .with_line_number(true)
        .try_init();
}
