use std::{
    fmt, fs,
    fs::OpenOptions,
    io::Write,
    path::{Path, PathBuf},
};

use chrono::Local;

use crate::Result;

/// Severity tag written into the command log.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogLevel {
    Info,
    Warning,
    Error,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LogLevel::Info => "INFO",
            LogLevel::Warning => "WARNING",
            LogLevel::Error => "ERROR",
        };
        f.write_str(s)
    }
}

/// Append-only command log with periodic truncation.
///
/// One line per event, `<timestamp>:<LEVEL>:<message>`. The log-rotation
/// background task calls [`BotLog::rotate`] on its cadence; writers contain
/// their own failures.
#[derive(Clone, Debug)]
pub struct BotLog {
    path: PathBuf,
}

impl BotLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn log(&self, level: LogLevel, message: &str) -> Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;

        let ts = Local::now().format("%Y-%m-%d %H:%M:%S");
        writeln!(file, "{ts}:{level}:{message}")?;
        Ok(())
    }

    /// Truncate the sink and leave a reset marker.
    pub fn rotate(&self) -> Result<()> {
        let ts = Local::now().format("%Y-%m-%d %H:%M:%S");
        fs::write(&self.path, format!("Log file reset at {ts}\n"))?;
        Ok(())
    }
}
