use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// A captured line with the metadata assigned when it was accepted.
///
/// `line` has its trailing `\n` removed; the `\r` of a CRLF ending stays.
/// `sequence_id` is unique and strictly increasing for the lifetime of one
/// interceptor, starting at 0.
///
/// # Examples
///
/// ```
/// use logtap::LineMetadata;
///
/// let entry = LineMetadata::new("ERROR: disk full\n", 1_700_000_000.5, 7);
/// assert_eq!(entry.line, "ERROR: disk full");
/// assert_eq!(entry.sequence_id, 7);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineMetadata {
    /// Line content without the trailing newline.
    pub line: String,

    /// Wall-clock capture time in seconds since the Unix epoch.
    pub timestamp: f64,

    /// Position of this line in the interceptor's capture order.
    pub sequence_id: u64,
}

impl LineMetadata {
    pub fn new(raw_line: &str, timestamp: f64, sequence_id: u64) -> Self {
        LineMetadata {
            line: strip_newline(raw_line).to_string(),
            timestamp,
            sequence_id,
        }
    }
}

/// Strip one trailing `\n`. A `\r` before it is kept.
pub(crate) fn strip_newline(line: &str) -> &str {
    line.strip_suffix('\n').unwrap_or(line)
}

/// Current wall-clock time in fractional seconds since the Unix epoch.
///
/// A clock set before the epoch reads as 0.0.
pub(crate) fn epoch_seconds() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}
