//! Append-only JSONL files, one per participant per day.

use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use parking_lot::Mutex;

use super::entry::{LogRecord, Role, RunMetadata};

/// Appends records to `<log_dir>/raw/<date>_<role>-<instance>.jsonl`
pub struct RunLogWriter {
    role: Role,
    instance: String,
    writer: Mutex<BufWriter<File>>,
    path: PathBuf,
}

impl RunLogWriter {
    /// Open (or create) today's file for this participant.
    ///
    /// ```text
    /// <log_dir>/
    /// ├── raw/
    /// │   ├── 2026-10-19_executor-emulator-5554.jsonl
    /// │   └── 2026-10-19_scheduler-6000.jsonl
    /// └── runs/
    ///     └── 2026-10-19T09-30-00_scheduler-6000.json
    /// ```
    pub fn new(log_dir: impl AsRef<Path>, role: Role, instance: impl Into<String>) -> std::io::Result<Self> {
        let instance = instance.into();
        let raw_dir = log_dir.as_ref().join("raw");
        fs::create_dir_all(&raw_dir)?;

        let date = chrono::Local::now().format("%Y-%m-%d");
        let path = raw_dir.join(format!("{}_{}-{}.jsonl", date, role, instance));

        let file = OpenOptions::new().create(true).append(true).open(&path)?;

        Ok(Self {
            role,
            instance,
            writer: Mutex::new(BufWriter::new(file)),
            path,
        })
    }

    /// Participant role
    pub fn role(&self) -> Role {
        self.role
    }

    /// Participant name
    pub fn instance(&self) -> &str {
        &self.instance
    }

    /// File being appended to
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one record and flush
    pub fn write(&self, record: &LogRecord) -> std::io::Result<()> {
        let json = record
            .to_json_line()
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;

        let mut writer = self.writer.lock();
        writeln!(writer, "{}", json)?;
        writer.flush()
    }

    /// Flush buffered data
    pub fn flush(&self) -> std::io::Result<()> {
        self.writer.lock().flush()
    }
}

impl Drop for RunLogWriter {
    fn drop(&mut self) {
        let _ = self.flush();
    }
}

/// Write `metadata` to `<log_dir>/runs/<run_id>.json`
pub fn write_run_metadata(log_dir: impl AsRef<Path>, metadata: &RunMetadata) -> std::io::Result<PathBuf> {
    let runs_dir = log_dir.as_ref().join("runs");
    fs::create_dir_all(&runs_dir)?;

    let path = runs_dir.join(format!("{}.json", metadata.run_id));
    let json = serde_json::to_string_pretty(metadata)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
    fs::write(&path, json)?;

    Ok(path)
}

/// Read every participant's records, merged in timestamp order.
///
/// Lines that do not parse are skipped. A missing directory yields nothing.
pub fn read_all_records(log_dir: impl AsRef<Path>) -> std::io::Result<Vec<LogRecord>> {
    read_records(log_dir, |_| true)
}

/// Like [`read_all_records`], restricted to files whose name starts with `date`
pub fn read_records_for_date(log_dir: impl AsRef<Path>, date: &str) -> std::io::Result<Vec<LogRecord>> {
    read_records(log_dir, |name| name.starts_with(date))
}

fn read_records(
    log_dir: impl AsRef<Path>,
    include: impl Fn(&str) -> bool,
) -> std::io::Result<Vec<LogRecord>> {
    let raw_dir = log_dir.as_ref().join("raw");
    if !raw_dir.exists() {
        return Ok(Vec::new());
    }

    let mut records = Vec::new();
    for entry in fs::read_dir(&raw_dir)? {
        let path = entry?.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if !name.ends_with(".jsonl") || !include(name) {
            continue;
        }

        let content = fs::read_to_string(&path)?;
        records.extend(
            content
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty())
                .filter_map(|line| LogRecord::from_json_line(line).ok()),
        );
    }

    // Stable: records with equal timestamps keep per-file order
    records.sort_by(|a, b| a.ts.cmp(&b.ts));
    Ok(records)
}

/// Render records as a one-line-per-event timeline
pub fn format_timeline(records: &[LogRecord]) -> String {
    let mut out = String::new();
    for record in records {
        let marker = match record.level.as_str() {
            "error" => "!",
            "warn" => "~",
            "info" => ">",
            "debug" => ".",
            _ => "-",
        };
        out.push_str(&format!(
            "{} {} [{}] {}",
            marker,
            record.ts,
            record.participant(),
            record.msg
        ));
        if let Some(fields) = record.fields.as_ref().and_then(|f| f.as_object()) {
            for (key, value) in fields {
                match value.as_str() {
                    Some(s) => out.push_str(&format!(" {}={}", key, s)),
                    None => out.push_str(&format!(" {}={}", key, value)),
                }
            }
        }
        out.push('\n');
    }
    out
}
