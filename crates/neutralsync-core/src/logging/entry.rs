//! Record types stored in run logs.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Which side of the protocol a participant is on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The in-app side running the test body
    Executor,
    /// The external process pacing the executor
    Scheduler,
}

impl Role {
    /// Lowercase name used in file names and records
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Executor => "executor",
            Self::Scheduler => "scheduler",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One tracing event, as a self-contained JSON line.
///
/// Executor and scheduler append to separate files in the same directory,
/// so a run can be reconstructed by merging on `ts`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogRecord {
    /// RFC 3339 timestamp with millisecond precision
    pub ts: String,

    /// trace, debug, info, warn or error
    pub level: String,

    /// Participant role
    pub role: Role,

    /// Participant name, e.g. the device serial or scheduler port
    pub instance: String,

    /// Module path of the event
    pub target: String,

    /// Event message
    pub msg: String,

    /// Structured fields other than the message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fields: Option<Value>,

    /// Enclosing spans, outermost first, joined with " > "
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub span: Option<String>,
}

impl LogRecord {
    /// Record stamped with the current time
    pub fn new(
        level: impl Into<String>,
        role: Role,
        instance: impl Into<String>,
        target: impl Into<String>,
        msg: impl Into<String>,
    ) -> Self {
        Self {
            ts: chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
            level: level.into(),
            role,
            instance: instance.into(),
            target: target.into(),
            msg: msg.into(),
            fields: None,
            span: None,
        }
    }

    /// Attach structured fields
    pub fn with_fields(mut self, fields: Value) -> Self {
        self.fields = Some(fields);
        self
    }

    /// Attach the span path
    pub fn with_span(mut self, span: impl Into<String>) -> Self {
        self.span = Some(span.into());
        self
    }

    /// `role-instance`, as used in file names and the timeline
    pub fn participant(&self) -> String {
        format!("{}-{}", self.role, self.instance)
    }

    /// Serialize to a single JSON line (no trailing newline)
    pub fn to_json_line(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Parse one JSON line
    pub fn from_json_line(line: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(line)
    }
}

/// Written once per participant when its logging starts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunMetadata {
    /// Timestamp-based id, also the file name
    pub run_id: String,

    /// When logging started
    pub started_at: String,

    /// Participant role
    pub role: Role,

    /// Participant name
    pub instance: String,

    /// Listen address or scheduler endpoint, if known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,

    /// Working directory
    pub cwd: Option<String>,
}

impl RunMetadata {
    /// Metadata stamped with the current time
    pub fn new(role: Role, instance: impl Into<String>) -> Self {
        let now = chrono::Utc::now();
        let instance = instance.into();
        Self {
            run_id: format!("{}_{}-{}", now.format("%Y-%m-%dT%H-%M-%S"), role, instance),
            started_at: now.to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
            role,
            instance,
            endpoint: None,
            cwd: std::env::current_dir().ok().map(|p| p.display().to_string()),
        }
    }

    /// Record the participant's network endpoint
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_json_shape() {
        let record = LogRecord::new("info", Role::Scheduler, "6000", "neutralsync", "Executor ready");

        let json = record.to_json_line().unwrap();
        assert!(json.contains("\"role\":\"scheduler\""));
        assert!(json.contains("\"instance\":\"6000\""));
        assert!(!json.contains("\"fields\""));

        let parsed = LogRecord::from_json_line(&json).unwrap();
        assert_eq!(parsed.participant(), "scheduler-6000");
    }

    #[test]
    fn test_record_with_fields() {
        let record = LogRecord::new("debug", Role::Executor, "emu", "t", "At injection site")
            .with_fields(serde_json::json!({ "action": "click OK" }))
            .with_span("handshake");

        let json = record.to_json_line().unwrap();
        assert!(json.contains("\"action\":\"click OK\""));
        assert!(json.contains("\"span\":\"handshake\""));
    }

    #[test]
    fn test_run_id_names_participant() {
        let meta = RunMetadata::new(Role::Executor, "emu").with_endpoint("0.0.0.0:5000");
        assert!(meta.run_id.ends_with("_executor-emu"));
        assert_eq!(meta.endpoint.as_deref(), Some("0.0.0.0:5000"));
    }
}
