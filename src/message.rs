//! GELF message model and the builder that derives it from a log record.
//!
//! A [`GelfMessage`] is a flat map of field names to JSON scalars. Reserved
//! GELF fields are set by [`MessageBuilder`]; everything else a caller
//! supplies becomes an additional field whose name starts with `_`.

use std::collections::BTreeMap;
use std::sync::Arc;

use log::warn;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};

use crate::{error::GelfError, level::SeverityRegistry, log_record::GelfLogRecord};

/// GELF specification version written into every message.
pub const GELF_VERSION: &str = "1.1";

/// Top-level fields owned by the builder.
pub const RESERVED_FIELDS: &[&str] = &[
    "version",
    "host",
    "timestamp",
    "level",
    "short_message",
    "facility",
    "full_message",
    "function",
    "line",
    "module",
    "process_id",
    "process_name",
    "thread_id",
    "thread_name",
];

/// Return the host name the operating system reports, or `"localhost"`
/// when it cannot be read.
///
/// No reverse DNS lookup is made, so on hosts configured with a short name
/// this is not the fully qualified domain name. Set `from_host` when
/// Graylog should see the FQDN.
pub fn local_hostname() -> String {
    hostname::get()
        .ok()
        .and_then(|name| name.into_string().ok())
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| "localhost".to_owned())
}

/// A GELF message as an ordered field map.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GelfMessage {
    fields: Map<String, Value>,
}

impl GelfMessage {
    /// Create an empty message.
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a field by its wire name.
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    /// Whether the message carries `field`.
    pub fn contains(&self, field: &str) -> bool {
        self.fields.contains_key(field)
    }

    /// Field names in wire order.
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Borrow the underlying map.
    pub fn as_map(&self) -> &Map<String, Value> {
        &self.fields
    }

    fn set(&mut self, field: &str, value: impl Into<Value>) {
        self.fields.insert(field.to_owned(), value.into());
    }

    /// Add a caller-supplied property.
    ///
    /// The stored name always carries a single leading `_`. Names that would
    /// produce `_id`, that are empty, or that contain characters outside
    /// `[A-Za-z0-9_.-]` are skipped and reported as `Ok(false)`. `null`
    /// values are skipped as well. Arrays and objects are rejected.
    pub fn insert_extra(&mut self, key: &str, value: &Value) -> Result<bool, GelfError> {
        let Some(name) = extra_field_name(key) else {
            warn!("GelfMessage ignoring invalid additional field name {key:?}");
            return Ok(false);
        };
        match value {
            Value::Null => Ok(false),
            Value::Bool(_) | Value::Number(_) | Value::String(_) => {
                self.fields.insert(name, value.clone());
                Ok(true)
            }
            Value::Array(_) => Err(GelfError::malformed(name, "arrays are not supported")),
            Value::Object(_) => Err(GelfError::malformed(name, "nested objects are not supported")),
        }
    }
}

fn extra_field_name(key: &str) -> Option<String> {
    let bare = key.strip_prefix('_').unwrap_or(key);
    let valid = !bare.is_empty()
        && bare != "id"
        && bare
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'));
    valid.then(|| format!("_{bare}"))
}

/// Handler-level settings that shape every message.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MessageConfig {
    /// Value for `host`; the local host name when unset.
    pub from_host: Option<String>,
    /// Value for `facility`; the record's logger name when unset.
    pub facility: Option<String>,
    /// Include source location, process and thread fields.
    pub full_info: bool,
    /// Properties merged into every message beneath per-event extras.
    pub global_props: BTreeMap<String, Value>,
}

/// Message construction failure with whatever was built before it.
#[derive(Debug)]
pub struct BuildFailure {
    pub error: GelfError,
    pub partial: GelfMessage,
}

/// Converts [`GelfLogRecord`] values into [`GelfMessage`] values.
#[derive(Clone, Debug)]
pub struct MessageBuilder {
    host: String,
    facility: Option<String>,
    full_info: bool,
    global_props: BTreeMap<String, Value>,
    levels: Arc<SeverityRegistry>,
}

impl MessageBuilder {
    /// Create a builder resolving levels against the standard names only.
    pub fn new(config: MessageConfig) -> Self {
        Self::with_levels(config, Arc::new(SeverityRegistry::new()))
    }

    /// Create a builder resolving levels through `levels`.
    pub fn with_levels(config: MessageConfig, levels: Arc<SeverityRegistry>) -> Self {
        let MessageConfig {
            from_host,
            facility,
            full_info,
            global_props,
        } = config;
        Self {
            host: from_host.unwrap_or_else(local_hostname),
            facility,
            full_info,
            global_props,
            levels,
        }
    }

    /// Host name written into `host`.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Build the message for `record`.
    pub fn build(&self, record: &GelfLogRecord) -> Result<GelfMessage, BuildFailure> {
        let mut msg = GelfMessage::new();
        match self.populate(record, &mut msg) {
            Ok(()) => Ok(msg),
            Err(error) => Err(BuildFailure {
                error,
                partial: msg,
            }),
        }
    }

    fn populate(&self, record: &GelfLogRecord, msg: &mut GelfMessage) -> Result<(), GelfError> {
        let meta = &record.metadata;
        msg.set("version", GELF_VERSION);
        msg.set("host", self.host.as_str());
        msg.set("timestamp", timestamp_value(meta.created)?);
        msg.set("level", self.levels.code_for(&record.levelname)?);
        msg.set("short_message", record.message.as_str());
        let facility = self.facility.as_deref().unwrap_or(&record.name);
        msg.set("facility", facility);
        if self.full_info {
            msg.set("function", meta.func_name.as_str());
            msg.set("line", meta.lineno);
            msg.set("module", meta.module.as_str());
            msg.set("process_id", meta.process);
            msg.set("process_name", meta.process_name.as_str());
            msg.set("thread_id", meta.thread);
            if let Some(name) = &meta.thread_name {
                msg.set("thread_name", name.as_str());
            }
        }
        if let Some(text) = &record.exc_text {
            msg.set("full_message", text.as_str());
        }
        // Keyed by wire name so `env` and `_env` collide; per-event
        // properties are inserted last and win.
        let mut extras: BTreeMap<String, (&str, &Value)> = BTreeMap::new();
        for (key, value) in self.global_props.iter().chain(&meta.extra) {
            let wire = extra_field_name(key).unwrap_or_else(|| key.clone());
            extras.insert(wire, (key.as_str(), value));
        }
        for (key, value) in extras.into_values() {
            msg.insert_extra(key, value)?;
        }
        Ok(())
    }
}

fn timestamp_value(created: f64) -> Result<Number, GelfError> {
    Number::from_f64(created)
        .ok_or_else(|| GelfError::malformed("timestamp", format!("{created} is not finite")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::{fixture, rstest};
    use serde_json::json;

    const BASE_FIELDS: [&str; 6] = [
        "facility",
        "host",
        "level",
        "short_message",
        "timestamp",
        "version",
    ];

    #[fixture]
    fn builder() -> MessageBuilder {
        MessageBuilder::new(MessageConfig {
            from_host: Some("web-01.example.com".into()),
            ..Default::default()
        })
    }

    fn disk_failure() -> GelfLogRecord {
        GelfLogRecord::new("storage", "ERROR", "disk failure").with_created(1_700_000_000.5)
    }

    #[rstest]
    fn builds_the_reserved_fields(builder: MessageBuilder) {
        let msg = builder.build(&disk_failure()).expect("message builds");
        assert_eq!(
            serde_json::to_value(&msg).unwrap(),
            json!({
                "version": "1.1",
                "host": "web-01.example.com",
                "timestamp": 1_700_000_000.5,
                "level": 3,
                "short_message": "disk failure",
                "facility": "storage",
            })
        );
    }

    #[rstest]
    fn defaults_host_to_local_hostname() {
        let builder = MessageBuilder::new(MessageConfig::default());
        let msg = builder.build(&disk_failure()).unwrap();
        assert_eq!(msg.get("host"), Some(&json!(local_hostname())));
    }

    #[rstest]
    fn local_hostname_is_never_blank() {
        let name = local_hostname();
        assert!(!name.trim().is_empty());
    }

    #[rstest]
    fn configured_facility_wins_over_logger_name() {
        let builder = MessageBuilder::new(MessageConfig {
            facility: Some("billing".into()),
            ..Default::default()
        });
        let msg = builder.build(&disk_failure()).unwrap();
        assert_eq!(msg.get("facility"), Some(&json!("billing")));
    }

    #[rstest]
    fn full_info_adds_location_process_and_thread() {
        let builder = MessageBuilder::new(MessageConfig {
            full_info: true,
            ..Default::default()
        });
        let record = disk_failure().with_location("storage::disk", "probe", 88);
        let msg = builder.build(&record).unwrap();
        assert_eq!(msg.get("function"), Some(&json!("probe")));
        assert_eq!(msg.get("line"), Some(&json!(88)));
        assert_eq!(msg.get("module"), Some(&json!("storage::disk")));
        assert_eq!(msg.get("process_id"), Some(&json!(std::process::id())));
        for field in ["process_name", "thread_id"] {
            assert!(msg.contains(field), "missing {field}");
        }
    }

    #[rstest]
    fn exception_text_becomes_full_message(builder: MessageBuilder) {
        let msg = builder
            .build(&disk_failure().with_exc_text("Traceback (most recent call last)"))
            .unwrap();
        assert_eq!(
            msg.get("full_message"),
            Some(&json!("Traceback (most recent call last)"))
        );
    }

    #[rstest]
    fn extras_are_underscore_prefixed_and_event_wins() {
        let builder = MessageBuilder::new(MessageConfig {
            global_props: BTreeMap::from([
                ("env".to_owned(), json!("prod")),
                ("request_id".to_owned(), json!("global")),
            ]),
            ..Default::default()
        });
        let record = disk_failure().with_extra("request_id", "abc");
        let msg = builder.build(&record).unwrap();
        assert_eq!(msg.get("_request_id"), Some(&json!("abc")));
        assert_eq!(msg.get("_env"), Some(&json!("prod")));

        let mut names: Vec<&str> = msg.field_names().collect();
        names.retain(|name| !BASE_FIELDS.contains(name));
        assert_eq!(names, vec!["_env", "_request_id"]);
    }

    #[rstest]
    #[case("_env", "env")]
    #[case("env", "_env")]
    fn event_extras_win_over_globals_whatever_the_prefix(
        #[case] event_key: &str,
        #[case] global_key: &str,
    ) {
        let builder = MessageBuilder::new(MessageConfig {
            global_props: [(global_key.to_owned(), json!("prod"))].into_iter().collect(),
            ..Default::default()
        });
        let msg = builder
            .build(&disk_failure().with_extra(event_key, "staging"))
            .unwrap();
        assert_eq!(msg.get("_env"), Some(&json!("staging")));
        assert!(!msg.contains("env"));
    }

    #[rstest]
    #[case("id")]
    #[case("_id")]
    #[case("")]
    #[case("has space")]
    fn invalid_extra_names_are_skipped(builder: MessageBuilder, #[case] key: &str) {
        let msg = builder.build(&disk_failure().with_extra(key, "x")).unwrap();
        assert_eq!(msg.len(), BASE_FIELDS.len());
        assert!(!msg.contains("_id"));
        assert!(!msg.contains("id"));
    }

    #[rstest]
    fn extras_cannot_shadow_reserved_fields(builder: MessageBuilder) {
        let msg = builder
            .build(&disk_failure().with_extra("level", 0).with_extra("_host", "spoof"))
            .unwrap();
        assert_eq!(msg.get("level"), Some(&json!(3)));
        assert_eq!(msg.get("_level"), Some(&json!(0)));
        assert_eq!(msg.get("host"), Some(&json!("web-01.example.com")));
        assert_eq!(msg.get("_host"), Some(&json!("spoof")));
    }

    #[rstest]
    fn nested_extras_fail_with_partial_message(builder: MessageBuilder) {
        let record = disk_failure().with_extra("payload", json!({"a": 1}));
        let failure = builder.build(&record).expect_err("nested values rejected");
        assert!(matches!(
            failure.error,
            GelfError::MalformedField { ref field, .. } if field == "_payload"
        ));
        assert_eq!(failure.partial.get("short_message"), Some(&json!("disk failure")));
    }

    #[rstest]
    fn unknown_level_fails_before_short_message(builder: MessageBuilder) {
        let record = GelfLogRecord::new("storage", "LOUD", "huh");
        let failure = builder.build(&record).expect_err("unknown level");
        assert!(matches!(failure.error, GelfError::UnknownLevel(ref l) if l == "LOUD"));
        assert!(failure.partial.contains("version"));
        assert!(!failure.partial.contains("short_message"));
    }

    #[rstest]
    fn custom_levels_resolve_through_registry() {
        let levels = Arc::new(SeverityRegistry::new());
        levels.register("audit", 5).unwrap();
        let builder = MessageBuilder::with_levels(MessageConfig::default(), levels);
        let msg = builder
            .build(&GelfLogRecord::new("app", "AUDIT", "login"))
            .unwrap();
        assert_eq!(msg.get("level"), Some(&json!(5)));
    }

    #[rstest]
    fn non_finite_timestamps_are_malformed(builder: MessageBuilder) {
        let record = disk_failure().with_created(f64::NAN);
        let failure = builder.build(&record).expect_err("NaN rejected");
        assert!(matches!(
            failure.error,
            GelfError::MalformedField { ref field, .. } if field == "timestamp"
        ));
    }
}
