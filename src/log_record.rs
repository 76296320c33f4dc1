//! Log event representation consumed by the GELF handler.
//!
//! This module defines the `GelfLogRecord` struct that captures a log event
//! along with its contextual metadata such as creation time, source location,
//! process and thread information, and structured extra properties.

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;

use chrono::Utc;
use once_cell::sync::Lazy;
use serde_json::Value;

use crate::serialise::decode_text;

static NEXT_THREAD_ID: AtomicU64 = AtomicU64::new(1);

thread_local! {
    static THREAD_ID: u64 = NEXT_THREAD_ID.fetch_add(1, Ordering::Relaxed);
}

static PROCESS_NAME: Lazy<String> = Lazy::new(|| {
    std::env::current_exe()
        .ok()
        .and_then(|path| path.file_stem().map(|s| s.to_string_lossy().into_owned()))
        .unwrap_or_else(|| "unknown".to_owned())
});

/// Seconds since the Unix epoch with microsecond precision.
pub fn now_epoch_secs() -> f64 {
    Utc::now().timestamp_micros() as f64 / 1_000_000.0
}

/// Additional context associated with a log record.
#[derive(Clone, Debug, PartialEq)]
pub struct RecordMetadata {
    /// Creation time in fractional seconds since the epoch.
    pub created: f64,
    /// Function that emitted the record.
    pub func_name: String,
    /// Line number of the log call.
    pub lineno: u32,
    /// Module that emitted the record.
    pub module: String,
    /// Operating system process identifier.
    pub process: u32,
    /// Name of the running executable.
    pub process_name: String,
    /// Numeric identifier of the emitting thread, stable for its lifetime.
    pub thread: u64,
    /// Name of the emitting thread (if any).
    pub thread_name: Option<String>,
    /// Per-event extra properties forwarded as `_`-prefixed GELF fields.
    pub extra: BTreeMap<String, Value>,
}

impl RecordMetadata {
    fn capture_runtime(&mut self) {
        let current = thread::current();
        self.created = now_epoch_secs();
        self.process = std::process::id();
        self.process_name = PROCESS_NAME.clone();
        self.thread = THREAD_ID.with(|id| *id);
        self.thread_name = current.name().map(ToString::to_string);
    }
}

impl Default for RecordMetadata {
    fn default() -> Self {
        let mut metadata = Self {
            created: 0.0,
            func_name: String::new(),
            lineno: 0,
            module: String::new(),
            process: 0,
            process_name: String::new(),
            thread: 0,
            thread_name: None,
            extra: BTreeMap::new(),
        };
        metadata.capture_runtime();
        metadata
    }
}

/// A single log event from the logging front end.
#[derive(Clone, Debug, PartialEq)]
pub struct GelfLogRecord {
    /// Name of the logger (the event's source) that created this record.
    pub name: String,
    /// The level name as emitted by the front end (e.g. "INFO" or "err").
    pub levelname: String,
    /// The log message content.
    pub message: String,
    /// Formatted exception or backtrace text, if any.
    pub exc_text: Option<String>,
    /// Contextual metadata for the record.
    pub metadata: RecordMetadata,
}

impl GelfLogRecord {
    /// Construct a new log record from logger `name`, `levelname`, and `message`.
    pub fn new(name: &str, levelname: &str, message: &str) -> Self {
        Self {
            name: name.to_owned(),
            levelname: levelname.to_owned(),
            message: message.to_owned(),
            exc_text: None,
            metadata: RecordMetadata::default(),
        }
    }

    /// Construct a record whose message arrives as raw bytes.
    ///
    /// Invalid UTF-8 is decoded as Latin-1 rather than rejected.
    pub fn from_bytes(name: &str, levelname: &str, message: &[u8]) -> Self {
        Self::new(name, levelname, &decode_text(message))
    }

    /// Construct a log record with explicit metadata.
    ///
    /// Runtime details (creation time, process and thread) are captured from
    /// the calling context, overriding whatever `metadata` carried.
    pub fn with_metadata(
        name: &str,
        levelname: &str,
        message: &str,
        mut metadata: RecordMetadata,
    ) -> Self {
        metadata.capture_runtime();
        Self {
            name: name.to_owned(),
            levelname: levelname.to_owned(),
            message: message.to_owned(),
            exc_text: None,
            metadata,
        }
    }

    /// Override the creation time.
    pub fn with_created(mut self, created: f64) -> Self {
        self.metadata.created = created;
        self
    }

    /// Attach exception text, forwarded as `full_message`.
    pub fn with_exc_text(mut self, text: impl Into<String>) -> Self {
        self.exc_text = Some(text.into());
        self
    }

    /// Set the source location reported when full info is enabled.
    pub fn with_location(mut self, module: &str, func_name: &str, lineno: u32) -> Self {
        self.metadata.module = module.to_owned();
        self.metadata.func_name = func_name.to_owned();
        self.metadata.lineno = lineno;
        self
    }

    /// Add a per-event extra property.
    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.extra.insert(key.into(), value.into());
        self
    }
}

impl fmt::Display for GelfLogRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} - {}", self.levelname, self.message)
    }
}

/// Map a Rust module path such as `app::db` to a dotted source name.
pub fn normalise_target(target: &str) -> Cow<'_, str> {
    if target.contains("::") {
        Cow::Owned(target.replace("::", "."))
    } else {
        Cow::Borrowed(target)
    }
}

/// Whether `target` belongs to this crate's own diagnostics.
pub fn is_internal_target(target: &str) -> bool {
    target
        .strip_prefix(env!("CARGO_CRATE_NAME"))
        .is_some_and(|rest| rest.is_empty() || rest.starts_with("::"))
}
