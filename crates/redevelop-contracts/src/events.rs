use std::fmt;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::bail;
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Fields stamped by the writer. Payload keys with these names are dropped.
pub const RESERVED_FIELDS: [&str; 4] = ["type", "session_id", "request_id", "ts"];

/// Lifecycle of one generation request, in emission order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    GenerationStarted,
    /// Payload `status` is one of `uploaded`, `failed`, `skipped`.
    ReferenceUpload,
    /// One per model tried.
    ModelAttempt,
    GenerationSucceeded,
    GenerationFailed,
}

impl EventKind {
    pub const ALL: [EventKind; 5] = [
        EventKind::GenerationStarted,
        EventKind::ReferenceUpload,
        EventKind::ModelAttempt,
        EventKind::GenerationSucceeded,
        EventKind::GenerationFailed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::GenerationStarted => "generation_started",
            EventKind::ReferenceUpload => "reference_upload",
            EventKind::ModelAttempt => "model_attempt",
            EventKind::GenerationSucceeded => "generation_succeeded",
            EventKind::GenerationFailed => "generation_failed",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Append-only `events.jsonl` shared by every request of a session.
///
/// Each line is one compact object holding `type`, `session_id`,
/// `request_id` and `ts` next to the payload fields.
#[derive(Debug, Clone)]
pub struct EventWriter {
    inner: Arc<EventWriterInner>,
}

#[derive(Debug)]
struct EventWriterInner {
    path: PathBuf,
    session_id: String,
    lock: Mutex<()>,
}

impl EventWriter {
    pub fn new(path: impl Into<PathBuf>, session_id: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(EventWriterInner {
                path: path.into(),
                session_id: session_id.into(),
                lock: Mutex::new(()),
            }),
        }
    }

    pub fn for_request(&self, request_id: impl Into<String>) -> RequestEvents {
        RequestEvents {
            writer: Some(self.clone()),
            request_id: request_id.into(),
        }
    }

    fn append(&self, kind: EventKind, request_id: &str, payload: Value) -> anyhow::Result<Value> {
        let fields = match payload {
            Value::Object(fields) => fields,
            Value::Null => Map::new(),
            other => bail!("{kind} payload must be a JSON object, got {other}"),
        };

        let mut event = Map::new();
        event.insert("type".to_string(), Value::String(kind.as_str().to_string()));
        event.insert(
            "session_id".to_string(),
            Value::String(self.inner.session_id.clone()),
        );
        event.insert(
            "request_id".to_string(),
            Value::String(request_id.to_string()),
        );
        event.insert("ts".to_string(), Value::String(now_utc_iso()));
        for (key, value) in fields {
            if !RESERVED_FIELDS.contains(&key.as_str()) {
                event.insert(key, value);
            }
        }

        if let Some(parent) = self.inner.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let line = serde_json::to_string(&event)?;
        let _guard = self
            .inner
            .lock
            .lock()
            .map_err(|_| anyhow::anyhow!("event writer lock poisoned"))?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.inner.path)?;
        file.write_all(line.as_bytes())?;
        file.write_all(b"\n")?;

        Ok(Value::Object(event))
    }
}

/// Event sink for a single request. A detached sink accepts events and
/// writes nothing.
#[derive(Debug, Clone)]
pub struct RequestEvents {
    writer: Option<EventWriter>,
    request_id: String,
}

impl RequestEvents {
    pub fn detached(request_id: impl Into<String>) -> Self {
        Self {
            writer: None,
            request_id: request_id.into(),
        }
    }

    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    /// Returns the written line, or `None` when detached.
    pub fn emit(&self, kind: EventKind, payload: Value) -> anyhow::Result<Option<Value>> {
        match self.writer.as_ref() {
            Some(writer) => writer.append(kind, &self.request_id, payload).map(Some),
            None => Ok(None),
        }
    }
}

/// Reads back every parseable event line; unreadable files yield nothing.
pub fn read_events(path: &Path) -> Vec<Value> {
    let Ok(raw) = std::fs::read_to_string(path) else {
        return Vec::new();
    };
    raw.lines()
        .filter_map(|line| serde_json::from_str::<Value>(line).ok())
        .collect()
}

fn now_utc_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, false)
}
