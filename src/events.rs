//! Event log writer and tailer for vigil.
//!
//! Every guard transition and mitigation attempt is appended to a plain
//! text log file, one record per line:
//!
//! ```text
//! 2026-08-06T14:03:21.512Z | WARNING | memory usage 92.4% exceeded 90% threshold
//! ```
//!
//! The writer opens the file in append mode, writes one line, flushes and
//! releases the handle on every call, so a concurrent tailer never observes
//! a partial line. The [`LogTailer`] implements the other half of the
//! protocol: seek to the end, poll for growth, emit complete lines only.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use thiserror::Error;

/// How often the tailer re-checks the file for growth.
const TAIL_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Error accessing the event log file.
#[derive(Debug, Error)]
#[error("event log {}: {source}", path.display())]
pub struct LogError {
    path: PathBuf,
    #[source]
    source: std::io::Error,
}

impl LogError {
    fn new(path: &Path, source: std::io::Error) -> Self {
        Self {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Severity of an event record.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Severity {
    /// State returned to normal or other informational notice
    Info,
    /// A threshold was breached
    Warning,
    /// A mitigation was attempted (successfully or not)
    Action,
}

impl Severity {
    /// Stable tag used in the line format.
    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Info => "INFO",
            Severity::Warning => "WARNING",
            Severity::Action => "ACTION",
        }
    }

    fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "INFO" => Some(Severity::Info),
            "WARNING" => Some(Severity::Warning),
            "ACTION" => Some(Severity::Action),
            _ => None,
        }
    }
}

/// One timestamped event, created at the moment of a transition or action
/// and never mutated afterwards.
#[derive(Clone, Debug, PartialEq)]
pub struct EventRecord {
    pub timestamp: DateTime<Utc>,
    pub severity: Severity,
    pub message: String,
}

impl EventRecord {
    /// Create a record stamped with the current wall clock.
    ///
    /// Embedded line breaks are flattened to spaces so one record always
    /// serializes to exactly one line.
    pub fn new(severity: Severity, message: impl Into<String>) -> Self {
        let message = message
            .into()
            .replace(['\n', '\r'], " ")
            .trim()
            .to_string();
        Self {
            timestamp: Utc::now(),
            severity,
            message,
        }
    }

    /// Serialize to the stable line format (without trailing newline).
    pub fn to_line(&self) -> String {
        format!(
            "{} | {:7} | {}",
            self.timestamp.format("%Y-%m-%dT%H:%M:%S%.3fZ"),
            self.severity.as_str(),
            self.message
        )
    }

    /// Parse a line produced by [`EventRecord::to_line`].
    ///
    /// Returns `None` for lines that do not follow the format; the tailer
    /// passes those through verbatim instead of dropping them.
    pub fn parse_line(line: &str) -> Option<Self> {
        let mut parts = line.splitn(3, " | ");
        let timestamp = parts
            .next()?
            .parse::<DateTime<Utc>>()
            .ok()?;
        let severity = Severity::from_tag(parts.next()?.trim())?;
        let message = parts.next()?.to_string();
        Some(Self {
            timestamp,
            severity,
            message,
        })
    }
}

/// Append-only writer for the event log.
///
/// Holds no open handle between calls; each append is open/write/flush/drop
/// so readers only ever see whole lines and an interrupt cannot lose a
/// record that was already reported as written.
pub struct EventLog {
    path: PathBuf,
}

impl EventLog {
    /// Create the writer, touching the file so startup fails early when the
    /// path is not writable.
    pub fn create(path: impl Into<PathBuf>) -> Result<Self, LogError> {
        let path = path.into();
        OpenOptions::new()
            .append(true)
            .create(true)
            .open(&path)
            .map_err(|e| LogError::new(&path, e))?;
        Ok(Self { path })
    }

    /// Append one record as a single flushed line.
    pub fn append(&self, record: &EventRecord) -> Result<(), LogError> {
        let mut file = OpenOptions::new()
            .append(true)
            .create(true)
            .open(&self.path)
            .map_err(|e| LogError::new(&self.path, e))?;
        let line = record.to_line();
        writeln!(file, "{line}").map_err(|e| LogError::new(&self.path, e))?;
        file.flush().map_err(|e| LogError::new(&self.path, e))?;
        Ok(())
    }
}

/// Incremental reader of a growing log file.
///
/// Never rewinds: it remembers the byte offset of the last complete line it
/// emitted and only reads past it. A file that shrinks underneath it (rotated
/// or truncated) is handled by seeking to the new end and carrying on.
pub struct LogTailer {
    path: PathBuf,
    offset: u64,
    partial: Vec<u8>,
}

impl LogTailer {
    /// Start tailing at the current end of the file.
    ///
    /// A file that does not exist yet starts at offset 0, so the first
    /// lines ever written to it are all emitted.
    pub fn from_end(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let offset = std::fs::metadata(&path).map(|m| m.len()).unwrap_or(0);
        Self {
            path,
            offset,
            partial: Vec::new(),
        }
    }

    /// Start tailing from the beginning of the file.
    pub fn from_start(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            offset: 0,
            partial: Vec::new(),
        }
    }

    /// Collect any lines appended since the last poll.
    ///
    /// Non-blocking. Bytes after the final newline stay buffered until the
    /// line is completed by a later append.
    pub fn poll(&mut self) -> Result<Vec<String>, LogError> {
        let mut file = match File::open(&self.path) {
            Ok(f) => f,
            // Not created yet; nothing to emit.
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(LogError::new(&self.path, e)),
        };

        let len = file
            .metadata()
            .map_err(|e| LogError::new(&self.path, e))?
            .len();

        // Shrink means rotation or truncation: continue from the new end.
        if len < self.offset {
            self.offset = len;
            self.partial.clear();
            return Ok(Vec::new());
        }
        if len == self.offset {
            return Ok(Vec::new());
        }

        file.seek(SeekFrom::Start(self.offset))
            .map_err(|e| LogError::new(&self.path, e))?;
        let mut buf = Vec::with_capacity((len - self.offset) as usize);
        file.take(len - self.offset)
            .read_to_end(&mut buf)
            .map_err(|e| LogError::new(&self.path, e))?;
        self.offset += buf.len() as u64;

        self.partial.extend_from_slice(&buf);

        let mut lines = Vec::new();
        while let Some(newline_at) = self.partial.iter().position(|&b| b == b'\n') {
            let mut line: Vec<u8> = self.partial.drain(..=newline_at).collect();
            line.pop(); // trailing '\n'
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            lines.push(String::from_utf8_lossy(&line).into_owned());
        }

        Ok(lines)
    }

    /// Follow the file until `running` is cleared, handing each newly
    /// completed line to `sink` as it appears.
    pub fn follow(
        &mut self,
        running: &AtomicBool,
        mut sink: impl FnMut(&str),
    ) -> Result<(), LogError> {
        while running.load(Ordering::Relaxed) {
            for line in self.poll()? {
                sink(&line);
            }
            std::thread::sleep(TAIL_POLL_INTERVAL);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn line_format_round_trips() {
        let record = EventRecord::new(Severity::Warning, "memory usage 92.4% exceeded threshold");
        let parsed = EventRecord::parse_line(&record.to_line()).expect("line should parse");
        assert_eq!(parsed.severity, Severity::Warning);
        assert_eq!(parsed.message, record.message);
        // The line format keeps millisecond precision, so a re-serialized
        // record must be byte-identical even though sub-millisecond digits
        // of the original timestamp are gone.
        assert_eq!(parsed.to_line(), record.to_line());
    }

    #[test]
    fn messages_cannot_smuggle_newlines() {
        let record = EventRecord::new(Severity::Info, "first\nsecond\r\nthird");
        let line = record.to_line();
        assert!(!line.contains('\n'));
        assert!(!line.contains('\r'));
        assert_eq!(
            EventRecord::parse_line(&line).expect("should parse").message,
            "first second  third"
        );
    }

    #[test]
    fn severity_tags_are_stable() {
        for severity in [Severity::Info, Severity::Warning, Severity::Action] {
            assert_eq!(Severity::from_tag(severity.as_str()), Some(severity));
        }
        assert_eq!(Severity::from_tag("DEBUG"), None);
    }

    #[test]
    fn malformed_lines_do_not_parse() {
        assert!(EventRecord::parse_line("not a record").is_none());
        assert!(EventRecord::parse_line("2026-08-06T14:03:21.512Z | NOPE | msg").is_none());
    }

    #[test]
    fn tailer_sees_records_appended_to_a_missing_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("vigil.log");

        // The log does not exist yet when the tailer starts.
        let mut tailer = LogTailer::from_end(&path);
        assert!(tailer.poll().expect("poll").is_empty());

        let log = EventLog::create(&path).expect("create log");
        log.append(&EventRecord::new(Severity::Info, "first"))
            .expect("append");
        log.append(&EventRecord::new(Severity::Info, "second"))
            .expect("append");

        let lines = tailer.poll().expect("poll");
        assert_eq!(lines.len(), 2);
        assert!(lines[0].ends_with("first"));
        assert!(lines[1].ends_with("second"));

        // No duplication on subsequent polls.
        assert!(tailer.poll().expect("poll").is_empty());
    }

    #[test]
    fn tailer_from_end_skips_existing_content() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("vigil.log");

        let log = EventLog::create(&path).expect("create log");
        log.append(&EventRecord::new(Severity::Info, "old news"))
            .expect("append");

        let mut tailer = LogTailer::from_end(&path);
        assert!(tailer.poll().expect("poll").is_empty());

        log.append(&EventRecord::new(Severity::Warning, "fresh"))
            .expect("append");
        let lines = tailer.poll().expect("poll");
        assert_eq!(lines.len(), 1);
        assert!(lines[0].ends_with("fresh"));
    }

    #[test]
    fn tailer_holds_partial_lines_until_completed() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("vigil.log");

        let mut tailer = LogTailer::from_start(&path);

        // A writer that is mid-line (no trailing newline yet).
        let mut file = OpenOptions::new()
            .append(true)
            .create(true)
            .open(&path)
            .expect("open");
        write!(file, "half a rec").expect("write");
        file.flush().expect("flush");
        assert!(tailer.poll().expect("poll").is_empty());

        writeln!(file, "ord").expect("write");
        file.flush().expect("flush");
        let lines = tailer.poll().expect("poll");
        assert_eq!(lines, vec!["half a record".to_string()]);
    }

    #[test]
    fn tailer_treats_truncation_as_seek_to_new_end() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("vigil.log");

        let log = EventLog::create(&path).expect("create log");
        log.append(&EventRecord::new(Severity::Info, "before rotation"))
            .expect("append");

        let mut tailer = LogTailer::from_start(&path);
        assert_eq!(tailer.poll().expect("poll").len(), 1);

        // Rotation: the file shrinks to empty under the tailer.
        std::fs::write(&path, b"").expect("truncate");
        assert!(tailer.poll().expect("poll").is_empty());

        log.append(&EventRecord::new(Severity::Info, "after rotation"))
            .expect("append");
        let lines = tailer.poll().expect("poll");
        assert_eq!(lines.len(), 1);
        assert!(lines[0].ends_with("after rotation"));
    }

    #[test]
    fn append_leaves_only_complete_flushed_lines() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("vigil.log");

        let log = EventLog::create(&path).expect("create log");
        log.append(&EventRecord::new(Severity::Action, "memory trim completed"))
            .expect("append");
        log.append(&EventRecord::new(Severity::Info, "emergency cleared"))
            .expect("append");

        // The handle is released after every append; the on-disk content
        // is already whole lines.
        let content = std::fs::read_to_string(&path).expect("read");
        assert!(content.ends_with('\n'));
        assert_eq!(content.lines().count(), 2);
        for line in content.lines() {
            assert!(EventRecord::parse_line(line).is_some());
        }
    }
}
