//! Run logs shared by executor and scheduler.
//!
//! Each participant appends its tracing events to its own JSONL file, so the
//! two processes never contend for a file. Pointing both at the same
//! directory lets a run be replayed as one merged timeline.
//!
//! ```text
//! logs/
//! ├── raw/                                  # one file per participant per day
//! │   ├── 2026-10-19_executor-emulator-5554.jsonl
//! │   └── 2026-10-19_scheduler-6000.jsonl
//! └── runs/                                 # metadata, one per participant start
//!     └── 2026-10-19T09-30-00_scheduler-6000.json
//! ```
//!
//! ```bash
//! # Everything the executor reported at injection sites
//! jq 'select(.role == "executor" and .msg == "At injection site")' logs/raw/*.jsonl
//!
//! # Merged timeline
//! cat logs/raw/*.jsonl | jq -s 'sort_by(.ts)'
//! ```

pub mod entry;
pub mod layer;
pub mod writer;

pub use entry::{LogRecord, Role, RunMetadata};
pub use layer::{LoggingBuilder, RunLogLayer};
pub use writer::{
    format_timeline, read_all_records, read_records_for_date, write_run_metadata, RunLogWriter,
};
