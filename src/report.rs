//! The Reporter: the `Report` record and its atomic, ASCII-escaped,
//! stable-key JSON persistence.

use std::collections::HashMap;
use std::fmt;
use std::io::Write as _;
use std::path::{Path, PathBuf};

use serde::Serialize;
use thiserror::Error;

use crate::diffbackup::DiffResult;
use crate::engine::{ImageId, Service};

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("failed to write report {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to serialize report: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Status {
    Pending,
    Skipped,
    Success,
    RollingBack,
    Rollback,
    Failed,
}

impl Status {
    fn filename_suffix(self) -> &'static str {
        match self {
            Status::Pending => "pending",
            Status::Skipped => "skipped",
            Status::Success => "success",
            Status::RollingBack => "rolling_back",
            Status::Rollback => "rollback",
            Status::Failed => "failed",
        }
    }

    /// The `SCREAMING_SNAKE_CASE` spelling this variant serializes to.
    pub fn as_str(self) -> &'static str {
        match self {
            Status::Pending => "PENDING",
            Status::Skipped => "SKIPPED",
            Status::Success => "SUCCESS",
            Status::RollingBack => "ROLLING_BACK",
            Status::Rollback => "ROLLBACK",
            Status::Failed => "FAILED",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Serialize)]
pub struct ServiceRecord {
    pub image: String,
}

/// One run's outcome for a single compose file. Fields are serialized in
/// declaration order via `#[derive(Serialize)]` on a plain struct (a Rust
/// struct's field order is stable and free, unlike a dict literal).
#[derive(Debug, Serialize)]
pub struct Report {
    pub timestamp: String,
    pub compose_file: String,
    pub status: Status,
    pub message: String,
    pub ignored_services: Vec<String>,
    pub services: HashMap<String, ServiceRecord>,
    pub before_image_ids: HashMap<String, String>,
    pub after_image_ids: HashMap<String, String>,
    pub changed_services: Vec<String>,
    pub backup_tags: HashMap<String, String>,
    pub verify_ok: Option<bool>,
    pub verify_message: Option<String>,
    pub rollback_verify_ok: Option<bool>,
    pub rollback_verify_message: Option<String>,
}

impl Report {
    fn new(file: &Path, run_timestamp: &str, status: Status, message: impl Into<String>) -> Self {
        Self {
            timestamp: run_timestamp.to_string(),
            compose_file: file.display().to_string(),
            status,
            message: message.into(),
            ignored_services: Vec::new(),
            services: HashMap::new(),
            before_image_ids: HashMap::new(),
            after_image_ids: HashMap::new(),
            changed_services: Vec::new(),
            backup_tags: HashMap::new(),
            verify_ok: None,
            verify_message: None,
            rollback_verify_ok: None,
            rollback_verify_message: None,
        }
    }

    /// A Report for a stack the planner decided to skip, before any engine
    /// mutation took place.
    pub fn skipped(file: &Path, run_timestamp: &str, reason: &str) -> Self {
        Self::new(file, run_timestamp, Status::Skipped, reason)
    }

    /// A Report for a stack the pipeline could not complete; the catch-all
    /// at orchestrator scope produces this.
    pub fn failed(file: &Path, run_timestamp: &str, message: &str) -> Self {
        Self::new(file, run_timestamp, Status::Failed, message)
    }

    /// A Report entering the update path: planned, diffed, not yet sealed.
    pub fn pending(
        file: &Path,
        run_timestamp: &str,
        services: &[Service],
        ignored_services: &[String],
        diff: &DiffResult,
    ) -> Self {
        let mut report = Self::new(file, run_timestamp, Status::Pending, "");
        report.ignored_services = ignored_services.to_vec();
        report.services = services
            .iter()
            .map(|s| (s.name.clone(), ServiceRecord { image: s.image.clone() }))
            .collect();
        report.before_image_ids = image_id_map(&diff.before_ids);
        report.after_image_ids = image_id_map(&diff.after_ids);
        report.changed_services = diff.changed_services.clone();
        report.backup_tags = diff
            .backup_tags
            .iter()
            .map(|(k, v)| (k.clone(), v.to_string()))
            .collect();
        report
    }

    /// Seal with a terminal status and message, without verify fields (the
    /// no-change / SKIPPED path).
    pub fn seal(&mut self, status: Status, message: impl Into<String>) {
        self.status = status;
        self.message = message.into();
    }

    /// Seal with a terminal status plus verify/rollback-verify fields (the
    /// SUCCESS/ROLLBACK/FAILED paths; `rollbackVerify*` is set only when
    /// `verifyOk == false`).
    pub fn seal_verified(
        &mut self,
        status: Status,
        verify_message: String,
        rollback_verify_ok: Option<bool>,
        rollback_verify_message: Option<String>,
    ) {
        self.status = status;
        self.verify_ok = Some(status == Status::Success);
        self.verify_message = Some(verify_message);
        self.rollback_verify_ok = rollback_verify_ok;
        self.rollback_verify_message = rollback_verify_message;
        self.message = match status {
            Status::Success => "update verified".to_string(),
            Status::Rollback => "update failed verification, rollback verified".to_string(),
            Status::Failed => "update and rollback both failed verification".to_string(),
            _ => self.message.clone(),
        };
    }

    fn filename(&self) -> String {
        format!("{}_{}.json", self.timestamp, self.status.filename_suffix())
    }

    /// Write this report to `<dir>/<timestamp>_<status>.json`, then
    /// atomically overwrite `<dir>/latest.json` with the same bytes.
    /// Encoding is stable-key (struct field order), ASCII-escaped,
    /// two-space indented JSON.
    pub fn write(&self, dir: &Path) -> Result<(), ReportError> {
        std::fs::create_dir_all(dir).map_err(|e| ReportError::Io {
            path: dir.to_path_buf(),
            source: e,
        })?;
        let bytes = to_ascii_json(self)?;

        let report_path = dir.join(self.filename());
        atomic_write(&report_path, &bytes)?;

        let latest_path = dir.join("latest.json");
        atomic_write(&latest_path, &bytes)?;

        Ok(())
    }
}

fn image_id_map(ids: &HashMap<String, ImageId>) -> HashMap<String, String> {
    ids.iter().map(|(k, v)| (k.clone(), v.to_string())).collect()
}

/// `serde_json` does not ASCII-escape non-ASCII text by default; wrap
/// `PrettyFormatter` to escape every byte outside the printable ASCII range
/// as `\uXXXX` so report files stay plain ASCII for log shippers that
/// assume it.
struct AsciiEscape<'a> {
    inner: serde_json::ser::PrettyFormatter<'a>,
}

impl<'a> AsciiEscape<'a> {
    fn new() -> Self {
        Self {
            inner: serde_json::ser::PrettyFormatter::with_indent(b"  "),
        }
    }
}

impl<'a> serde_json::ser::Formatter for AsciiEscape<'a> {
    fn write_string_fragment<W: ?Sized>(&mut self, writer: &mut W, fragment: &str) -> std::io::Result<()>
    where
        W: std::io::Write,
    {
        for ch in fragment.chars() {
            if ch.is_ascii() && !ch.is_control() {
                writer.write_all(&[ch as u8])?;
            } else {
                let mut buf = [0u16; 2];
                for unit in ch.encode_utf16(&mut buf) {
                    write!(writer, "\\u{unit:04x}")?;
                }
            }
        }
        Ok(())
    }

    fn write_char_escape<W: ?Sized>(
        &mut self,
        writer: &mut W,
        char_escape: serde_json::ser::CharEscape,
    ) -> std::io::Result<()>
    where
        W: std::io::Write,
    {
        self.inner.write_char_escape(writer, char_escape)
    }

    fn begin_array<W: ?Sized>(&mut self, writer: &mut W) -> std::io::Result<()>
    where
        W: std::io::Write,
    {
        self.inner.begin_array(writer)
    }

    fn end_array<W: ?Sized>(&mut self, writer: &mut W) -> std::io::Result<()>
    where
        W: std::io::Write,
    {
        self.inner.end_array(writer)
    }

    fn begin_array_value<W: ?Sized>(&mut self, writer: &mut W, first: bool) -> std::io::Result<()>
    where
        W: std::io::Write,
    {
        self.inner.begin_array_value(writer, first)
    }

    fn end_array_value<W: ?Sized>(&mut self, writer: &mut W) -> std::io::Result<()>
    where
        W: std::io::Write,
    {
        self.inner.end_array_value(writer)
    }

    fn begin_object<W: ?Sized>(&mut self, writer: &mut W) -> std::io::Result<()>
    where
        W: std::io::Write,
    {
        self.inner.begin_object(writer)
    }

    fn end_object<W: ?Sized>(&mut self, writer: &mut W) -> std::io::Result<()>
    where
        W: std::io::Write,
    {
        self.inner.end_object(writer)
    }

    fn begin_object_key<W: ?Sized>(&mut self, writer: &mut W, first: bool) -> std::io::Result<()>
    where
        W: std::io::Write,
    {
        self.inner.begin_object_key(writer, first)
    }

    fn begin_object_value<W: ?Sized>(&mut self, writer: &mut W) -> std::io::Result<()>
    where
        W: std::io::Write,
    {
        self.inner.begin_object_value(writer)
    }

    fn end_object_value<W: ?Sized>(&mut self, writer: &mut W) -> std::io::Result<()>
    where
        W: std::io::Write,
    {
        self.inner.end_object_value(writer)
    }
}

fn to_ascii_json<T: Serialize>(value: &T) -> Result<Vec<u8>, ReportError> {
    let mut buf = Vec::new();
    let mut ser = serde_json::Serializer::with_formatter(&mut buf, AsciiEscape::new());
    value.serialize(&mut ser)?;
    Ok(buf)
}

fn atomic_write(path: &Path, bytes: &[u8]) -> Result<(), ReportError> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(|e| ReportError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;
    tmp.write_all(bytes).map_err(|e| ReportError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;
    tmp.persist(path).map_err(|e| ReportError::Io {
        path: path.to_path_buf(),
        source: e.error,
    })?;
    Ok(())
}
