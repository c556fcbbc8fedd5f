//! Command log: a textual transcript of state-changing operations.
//!
//! Each line is `<command> <args>`, optionally prefixed with a local
//! timestamp and ` > `. Lines for `load`, `seek`, `set_marker`, `rm_marker`
//! and `delete` can be replayed with `open`.

use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::warn;

pub trait CommandLog: Send {
    fn record(&mut self, command: &str, args: &str);
}

/// Formats one transcript line without timestamp.
pub fn format_entry(command: &str, args: &str) -> String {
    if args.is_empty() {
        command.to_string()
    } else {
        format!("{command} {args}")
    }
}

/// Writes transcript lines to any writer.
pub struct WriterCommandLog {
    writer: Box<dyn Write + Send>,
    timestamps: bool,
}

impl WriterCommandLog {
    pub fn new(writer: Box<dyn Write + Send>, timestamps: bool) -> Self {
        Self { writer, timestamps }
    }

    pub fn stdout(timestamps: bool) -> Self {
        Self::new(Box::new(io::stdout()), timestamps)
    }

    /// Appends to `path`, creating it if needed.
    pub fn append_to(path: &Path, timestamps: bool) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self::new(Box::new(file), timestamps))
    }
}

impl CommandLog for WriterCommandLog {
    fn record(&mut self, command: &str, args: &str) {
        let entry = format_entry(command, args);
        let line = if self.timestamps {
            format!(
                "{} > {entry}",
                chrono::Local::now().format("%Y-%m-%dT%H:%M:%S%.3f%:z")
            )
        } else {
            entry
        };
        if let Err(e) = writeln!(self.writer, "{line}").and_then(|_| self.writer.flush()) {
            warn!("failed to write transcript line: {e}");
        }
    }
}

/// Keeps transcript lines in memory; clones share the same buffer.
#[derive(Debug, Clone, Default)]
pub struct MemoryCommandLog {
    lines: Arc<Mutex<Vec<String>>>,
}

impl MemoryCommandLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> Vec<String> {
        self.lines
            .lock()
            .map(|lines| lines.clone())
            .unwrap_or_default()
    }

    pub fn clear(&self) {
        if let Ok(mut lines) = self.lines.lock() {
            lines.clear();
        }
    }
}

impl CommandLog for MemoryCommandLog {
    fn record(&mut self, command: &str, args: &str) {
        if let Ok(mut lines) = self.lines.lock() {
            lines.push(format_entry(command, args));
        }
    }
}

/// Discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullCommandLog;

impl CommandLog for NullCommandLog {
    fn record(&mut self, _command: &str, _args: &str) {}
}
