//! Decoupled logging pipeline for the controller.
//!
//! # Architecture
//!
//! ```text
//! log::info!() / warn!() / ...
//!     |
//! [LogCollector] (non-blocking)
//!     | (crossbeam unbounded channel)
//!     v
//! [writer thread] ---> stderr
//!                 \--> <log_dir>/controller-<ts>.log
//! ```
//!
//! The writer is an OS thread, not a tokio task, so records logged from any
//! runtime (or none) reach disk.

use chrono::Local;
use crossbeam_channel::{unbounded, Sender};
use log::{LevelFilter, Log, Metadata, Record};
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// Internal log line or special marker
enum LogMessage {
    Line(LogLine),
    /// Flush marker; the writer acks once everything before it is written.
    Flush(std::sync::mpsc::Sender<()>),
}

/// A log line with metadata
#[derive(Clone, Debug)]
pub struct LogLine {
    pub level: log::Level,
    pub target: String,
    pub message: String,
    pub timestamp: String,
}

impl LogLine {
    pub fn new(level: log::Level, target: impl Into<String>, message: impl Into<String>) -> Self {
        LogLine {
            level,
            target: target.into(),
            message: message.into(),
            timestamp: Local::now().format("%Y-%m-%dT%H:%M:%S%.3f").to_string(),
        }
    }

    fn render(&self) -> String {
        format!("{} {:<5} {}\n", self.timestamp, self.level, self.message)
    }
}

#[derive(Clone)]
pub struct LogCollector {
    tx: Sender<LogMessage>,
    level: LevelFilter,
    log_path: Option<PathBuf>,
}

impl LogCollector {
    /// Start the writer thread. With `log_dir` set, records are also
    /// appended to a fresh `controller-<timestamp>.log` inside it.
    pub fn new(log_dir: Option<&Path>, level: LevelFilter, echo_stderr: bool) -> io::Result<Self> {
        let (log_path, mut file) = match log_dir {
            Some(dir) => {
                let (path, file) = open_session_log(dir)?;
                (Some(path), Some(file))
            }
            None => (None, None),
        };

        let (tx, rx) = unbounded::<LogMessage>();

        std::thread::Builder::new()
            .name("log-writer".to_string())
            .spawn(move || {
                while let Ok(msg) = rx.recv() {
                    match msg {
                        LogMessage::Line(line) => {
                            let rendered = line.render();
                            if echo_stderr {
                                let _ = io::stderr().write_all(rendered.as_bytes());
                            }
                            if let Some(file) = file.as_mut() {
                                let _ = file.write_all(rendered.as_bytes());
                            }
                        }
                        LogMessage::Flush(ack) => {
                            if let Some(file) = file.as_mut() {
                                let _ = file.flush();
                            }
                            let _ = io::stderr().flush();
                            let _ = ack.send(());
                        }
                    }
                }
            })?;

        Ok(LogCollector { tx, level, log_path })
    }

    /// File this collector appends to, if any.
    pub fn log_path(&self) -> Option<&Path> {
        self.log_path.as_deref()
    }

    /// Queue a line (never blocks).
    pub fn push(&self, line: LogLine) {
        let _ = self.tx.send(LogMessage::Line(line));
    }

    /// Block until every line queued before this call is written.
    pub fn flush_blocking(&self) -> Result<(), String> {
        let (ack_tx, ack_rx) = std::sync::mpsc::channel::<()>();
        self.tx
            .send(LogMessage::Flush(ack_tx))
            .map_err(|e| format!("Failed to send flush marker: {}", e))?;
        ack_rx
            .recv()
            .map_err(|e| format!("Flush signal interrupted: {}", e))
    }
}

impl Log for LogCollector {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            self.push(LogLine::new(
                record.level(),
                record.target(),
                record.args().to_string(),
            ));
        }
    }

    fn flush(&self) {
        let _ = self.flush_blocking();
    }
}

fn open_session_log(dir: &Path) -> io::Result<(PathBuf, File)> {
    std::fs::create_dir_all(dir)?;
    let timestamp = Local::now().format("%Y%m%d_%H%M%S");
    let path = dir.join(format!("controller-{}.log", timestamp));
    let file = OpenOptions::new().create(true).append(true).open(&path)?;
    Ok((path, file))
}

/// Install a collector as the process-wide `log` backend.
///
/// Returns a handle sharing the same writer, for flushing at shutdown.
pub fn init_global_logger(level: LevelFilter, log_dir: Option<&Path>) -> io::Result<LogCollector> {
    let collector = LogCollector::new(log_dir, level, true)?;
    log::set_boxed_logger(Box::new(collector.clone()))
        .map_err(|e| io::Error::new(io::ErrorKind::AlreadyExists, e.to_string()))?;
    log::set_max_level(level);
    if let Some(path) = collector.log_path() {
        log::info!("[Log] Writing controller log to {}", path.display());
    }
    Ok(collector)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_creates_session_file() {
        let dir = tempfile::tempdir().unwrap();
        let collector = LogCollector::new(Some(dir.path()), LevelFilter::Info, false).unwrap();
        let path = collector.log_path().unwrap().to_path_buf();
        assert!(path.exists());
        let name = path.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("controller-") && name.ends_with(".log"));
    }

    #[test]
    fn test_flush_waits_for_writer() {
        let dir = tempfile::tempdir().unwrap();
        let collector = LogCollector::new(Some(dir.path()), LevelFilter::Debug, false).unwrap();

        for i in 0..500 {
            collector.push(LogLine::new(log::Level::Info, "test", format!("[Test] line {}", i)));
        }
        collector.flush_blocking().unwrap();

        let content = fs::read_to_string(collector.log_path().unwrap()).unwrap();
        assert_eq!(content.lines().count(), 500);
        assert!(content.contains("[Test] line 499"));
    }

    #[test]
    fn test_level_filter() {
        let collector = LogCollector::new(None, LevelFilter::Warn, false).unwrap();
        let info = Metadata::builder().level(log::Level::Info).build();
        let error = Metadata::builder().level(log::Level::Error).build();
        assert!(!collector.enabled(&info));
        assert!(collector.enabled(&error));
    }
}
