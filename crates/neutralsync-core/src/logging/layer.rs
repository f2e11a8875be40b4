//! `tracing` layer that mirrors every event into the participant's run log.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_subscriber::layer::{Context, SubscriberExt};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use super::entry::{LogRecord, Role, RunMetadata};
use super::writer::{write_run_metadata, RunLogWriter};

/// Writes each event as a [`LogRecord`] line.
pub struct RunLogLayer {
    writer: Arc<RunLogWriter>,
}

impl RunLogLayer {
    /// Layer appending to this participant's file under `log_dir`
    pub fn new(log_dir: impl AsRef<Path>, role: Role, instance: impl Into<String>) -> std::io::Result<Self> {
        Ok(Self {
            writer: Arc::new(RunLogWriter::new(log_dir, role, instance)?),
        })
    }

    /// File being written
    pub fn log_path(&self) -> &Path {
        self.writer.path()
    }
}

impl<S> Layer<S> for RunLogLayer
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_event(&self, event: &Event<'_>, ctx: Context<'_, S>) {
        let metadata = event.metadata();

        let mut visitor = FieldVisitor::default();
        event.record(&mut visitor);

        let mut record = LogRecord::new(
            metadata.level().as_str().to_lowercase(),
            self.writer.role(),
            self.writer.instance(),
            metadata.target(),
            visitor.message.unwrap_or_default(),
        );

        if !visitor.fields.is_empty() {
            record = record.with_fields(Value::Object(visitor.fields));
        }

        if let Some(scope) = ctx.event_scope(event) {
            let spans: Vec<&str> = scope.from_root().map(|span| span.name()).collect();
            if !spans.is_empty() {
                record = record.with_span(spans.join(" > "));
            }
        }

        // A failing log write must not disturb the code being logged
        let _ = self.writer.write(&record);
    }
}

#[derive(Default)]
struct FieldVisitor {
    message: Option<String>,
    fields: Map<String, Value>,
}

impl FieldVisitor {
    fn insert(&mut self, field: &Field, value: Value) {
        self.fields.insert(field.name().to_string(), value);
    }
}

impl Visit for FieldVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        let mut buf = String::new();
        let _ = write!(buf, "{:?}", value);
        if field.name() == "message" {
            self.message = Some(buf);
        } else {
            self.insert(field, Value::String(buf));
        }
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message = Some(value.to_string());
        } else {
            self.insert(field, Value::String(value.to_string()));
        }
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.insert(field, value.into());
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.insert(field, value.into());
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.insert(field, value.into());
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        if let Some(n) = serde_json::Number::from_f64(value) {
            self.insert(field, Value::Number(n));
        }
    }

    fn record_error(&mut self, field: &Field, value: &(dyn std::error::Error + 'static)) {
        self.insert(field, Value::String(value.to_string()));
    }
}

/// Console logging plus an optional run log, installed as the global default.
#[derive(Debug, Clone)]
pub struct LoggingBuilder {
    role: Role,
    instance: String,
    log_dir: Option<PathBuf>,
    filter: Option<String>,
}

impl LoggingBuilder {
    /// Builder for one participant
    pub fn new(role: Role, instance: impl Into<String>) -> Self {
        Self {
            role,
            instance: instance.into(),
            log_dir: None,
            filter: None,
        }
    }

    /// Also write JSONL records and run metadata under `dir`
    pub fn with_log_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.log_dir = Some(dir.into());
        self
    }

    /// Filter directive; defaults to `RUST_LOG`, then `info`
    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }

    /// Build the run-log layer alone, for manual composition
    pub fn build_layer(&self) -> std::io::Result<Option<RunLogLayer>> {
        self.log_dir
            .as_ref()
            .map(|dir| RunLogLayer::new(dir, self.role, &self.instance))
            .transpose()
    }

    /// Install the subscriber. Returns the run log path, if any.
    pub fn init(self) -> anyhow::Result<Option<PathBuf>> {
        let filter = match &self.filter {
            Some(directive) => EnvFilter::new(directive),
            None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        };

        let layer = self.build_layer()?;
        let path = layer.as_ref().map(|l| l.log_path().to_path_buf());

        tracing_subscriber::registry()
            .with(layer)
            .with(tracing_subscriber::fmt::layer().with_target(false))
            .with(filter)
            .try_init()?;

        if let Some(dir) = &self.log_dir {
            write_run_metadata(dir, &RunMetadata::new(self.role, &self.instance))?;
        }

        Ok(path)
    }
}
