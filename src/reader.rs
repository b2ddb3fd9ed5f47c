//! Offset tracking and incremental reads of the source file.

use crate::config::{Config, Encoding};
use crate::report::{Reporter, report};
use std::fs::{self, File};
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

/// Reads the bytes appended to a file since the previous call.
///
/// The offset only moves forward, except when the file is found to be
/// smaller than the offset (rotated or truncated), in which case tailing
/// restarts from byte 0.
///
/// # Examples
///
/// ```
/// use logtap::{Config, TailReader};
/// use std::io::Write;
///
/// let dir = tempfile::tempdir().unwrap();
/// let path = dir.path().join("app.log");
/// std::fs::write(&path, "old\n").unwrap();
///
/// let mut reader = TailReader::new(&path, &Config::default());
/// assert_eq!(reader.offset(), 4);
///
/// let mut file = std::fs::OpenOptions::new().append(true).open(&path).unwrap();
/// file.write_all(b"one\ntwo\n").unwrap();
///
/// assert_eq!(reader.process_change(), vec!["one\n", "two\n"]);
/// assert_eq!(reader.offset(), 12);
/// ```
#[derive(Debug)]
pub struct TailReader {
    path: PathBuf,
    offset: u64,
    encoding: Encoding,
    max_file_size: Option<u64>,
    follow_rotations: bool,
    reporter: Reporter,
}

impl TailReader {
    /// Create a reader positioned at the current end of `path`.
    ///
    /// A file that does not exist yet starts at offset 0, so its whole
    /// content is read once it appears.
    pub fn new(path: impl AsRef<Path>, config: &Config) -> Self {
        let path = path.as_ref().to_path_buf();
        let offset = fs::metadata(&path).map(|m| m.len()).unwrap_or(0);
        TailReader {
            path,
            offset,
            encoding: config.encoding(),
            max_file_size: config.max_file_size(),
            follow_rotations: config.follow_rotations(),
            reporter: Reporter::default(),
        }
    }

    pub(crate) fn with_reporter(mut self, reporter: Reporter) -> Self {
        self.reporter = reporter;
        self
    }

    /// Bytes of the file consumed so far.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read and split everything appended since the last call.
    ///
    /// Lines keep their trailing `\n`. Bytes after the last newline are
    /// returned as a final line without one, except for a UTF-8 character
    /// still being written, which waits for the next call. I/O failures are
    /// logged and yield no lines; the offset is left as it was so the next
    /// call retries.
    pub fn process_change(&mut self) -> Vec<String> {
        match self.read_new() {
            Ok(lines) => lines,
            Err(e) if e.kind() == io::ErrorKind::PermissionDenied => {
                report!(
                    self.reporter,
                    Warn,
                    "permission denied when reading {}, will retry",
                    self.path.display()
                );
                Vec::new()
            }
            Err(e) => {
                report!(
                    self.reporter,
                    Error,
                    "I/O error when reading {}: {e}",
                    self.path.display()
                );
                Vec::new()
            }
        }
    }

    /// Move the offset to the current end of the file without reading.
    ///
    /// Whatever was appended in between is skipped for good.
    pub fn skip_to_end(&mut self) {
        match fs::metadata(&self.path) {
            Ok(meta) => self.offset = meta.len(),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => report!(
                self.reporter,
                Error,
                "I/O error when sizing {}: {e}",
                self.path.display()
            ),
        }
    }

    fn read_new(&mut self) -> io::Result<Vec<String>> {
        let size = match fs::metadata(&self.path) {
            Ok(meta) => meta.len(),
            // Possibly mid-rotation. Try again on the next change.
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };

        if size < self.offset {
            report!(
                self.reporter,
                Info,
                "file rotation detected for {}, resetting position",
                self.path.display()
            );
            self.offset = if self.follow_rotations { 0 } else { size };
        }

        if let Some(limit) = self.max_file_size {
            if size > limit {
                report!(
                    self.reporter,
                    Warn,
                    "{} is {size} bytes, over the {limit} byte limit; skipping to end",
                    self.path.display()
                );
                self.offset = size;
                return Ok(Vec::new());
            }
        }

        if size <= self.offset {
            return Ok(Vec::new());
        }

        let mut file = File::open(&self.path)?;
        file.seek(SeekFrom::Start(self.offset))?;
        let mut bytes = Vec::with_capacity((size - self.offset) as usize);
        // Bytes written after the size was taken belong to the next round.
        file.take(size - self.offset).read_to_end(&mut bytes)?;

        // An unfinished UTF-8 character stays unread until it is complete.
        let complete = self.encoding.complete_len(&bytes);
        bytes.truncate(complete);
        self.offset += complete as u64;
        Ok(split_lines(&self.encoding.decode(&bytes)))
    }
}

/// Split text after every `\n`, keeping the separator on each line.
pub(crate) fn split_lines(text: &str) -> Vec<String> {
    text.split_inclusive('\n').map(str::to_string).collect()
}
