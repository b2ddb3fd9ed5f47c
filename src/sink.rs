//! Appending accepted lines to a target file.

use crate::config::{Config, Encoding};
use crate::report::{Reporter, report};
use chrono::{SecondsFormat, Utc};
use std::fs::OpenOptions;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

/// Writes captured lines to a secondary file, in capture order.
///
/// With annotation enabled each line becomes
/// `[CAPTURED_AT: 2025-01-01T12:00:00.000000+00:00] <line>`.
#[derive(Debug)]
pub struct Sink {
    path: PathBuf,
    add_timestamps: bool,
    encoding: Encoding,
    retries: u32,
    retry_pause: Duration,
    reporter: Reporter,
}

impl Sink {
    pub fn new(path: impl AsRef<Path>, add_timestamps: bool, config: &Config) -> Self {
        let retries = if config.retry_on_error() {
            config.retry_max_attempts()
        } else {
            0
        };
        Sink {
            path: path.as_ref().to_path_buf(),
            add_timestamps,
            encoding: config.encoding(),
            retries,
            retry_pause: config.retry_pause(),
            reporter: Reporter::default(),
        }
    }

    pub(crate) fn with_reporter(mut self, reporter: Reporter) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append `lines`, retrying the batch on failure.
    ///
    /// A batch that still fails after the configured retries is logged and
    /// dropped; the error never reaches the caller.
    pub fn append<S: AsRef<str>>(&self, lines: &[S]) {
        let mut attempt = 0;
        loop {
            match self.write_batch(lines) {
                Ok(()) => return,
                Err(e) if attempt < self.retries => {
                    attempt += 1;
                    report!(
                        self.reporter,
                        Warn,
                        "write to {} failed ({e}), retry {attempt}/{}",
                        self.path.display(),
                        self.retries
                    );
                    thread::sleep(self.retry_pause);
                }
                Err(e) => {
                    report!(
                        self.reporter,
                        Error,
                        "dropping {} line(s) for {}: {e}",
                        lines.len(),
                        self.path.display()
                    );
                    return;
                }
            }
        }
    }

    fn write_batch<S: AsRef<str>>(&self, lines: &[S]) -> io::Result<()> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        let mut out = BufWriter::new(file);
        for line in lines {
            let line = line.as_ref();
            if self.add_timestamps {
                let text = annotate(line, &captured_at());
                out.write_all(&self.encoding.encode(&text))?;
            } else {
                out.write_all(&self.encoding.encode(line))?;
            }
        }
        out.flush()
    }
}

/// Current UTC time in ISO 8601 with microseconds and an explicit offset.
pub(crate) fn captured_at() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, false)
}

pub(crate) fn annotate(line: &str, timestamp: &str) -> String {
    format!("[CAPTURED_AT: {timestamp}] {line}")
}
