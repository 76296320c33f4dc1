//! Compatibility bridge for the `tracing` ecosystem.
//!
//! [`GelfLayer`] is a `tracing_subscriber` layer that turns every event into
//! a [`GelfLogRecord`]. The `message` field becomes the short message and
//! all other fields become extra properties.

use std::{collections::BTreeMap, fmt, sync::Arc};

use serde_json::Value;
use tracing::{
    Event, Level, Subscriber,
    field::{Field, Visit},
};
use tracing_subscriber::{Layer, layer::Context};

use crate::{
    handler::GelfHandlerTrait,
    log_record::{GelfLogRecord, is_internal_target, normalise_target},
    rate_limited_warner::RateLimitedWarner,
};

/// Layer forwarding `tracing` events to a GELF handler.
pub struct GelfLayer {
    handler: Arc<dyn GelfHandlerTrait>,
    warner: RateLimitedWarner,
}

impl GelfLayer {
    pub fn new(handler: Arc<dyn GelfHandlerTrait>) -> Self {
        Self {
            handler,
            warner: RateLimitedWarner::default(),
        }
    }
}

/// Severity name understood by the standard severity table.
pub fn level_name(level: &Level) -> &'static str {
    match *level {
        Level::ERROR => "ERROR",
        Level::WARN => "WARNING",
        Level::INFO => "INFO",
        Level::DEBUG => "DEBUG",
        Level::TRACE => "TRACE",
    }
}

#[derive(Default)]
struct FieldVisitor {
    message: Option<String>,
    extra: BTreeMap<String, Value>,
}

impl FieldVisitor {
    fn insert(&mut self, field: &Field, value: Value) {
        if field.name() == "message" {
            self.message = Some(match value {
                Value::String(text) => text,
                other => other.to_string(),
            });
        } else {
            self.extra.insert(field.name().to_owned(), value);
        }
    }
}

impl Visit for FieldVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        self.insert(field, Value::from(value));
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.insert(field, Value::from(value));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.insert(field, Value::from(value));
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        self.insert(field, Value::from(value));
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.insert(field, Value::from(value));
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.insert(field, Value::String(format!("{value:?}")));
    }
}

impl<S: Subscriber> Layer<S> for GelfLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let metadata = event.metadata();
        if is_internal_target(metadata.target()) {
            return;
        }
        let mut visitor = FieldVisitor::default();
        event.record(&mut visitor);

        let name = normalise_target(metadata.target());
        let mut record = GelfLogRecord::new(
            name.as_ref(),
            level_name(metadata.level()),
            visitor.message.as_deref().unwrap_or_default(),
        )
        .with_location(
            metadata.module_path().unwrap_or_default(),
            "",
            metadata.line().unwrap_or(0),
        );
        for (key, value) in visitor.extra {
            record = record.with_extra(key, value);
        }

        if let Err(err) = self.handler.handle(record) {
            self.warner.record_drop();
            self.warner.warn_if_due(|count| {
                eprintln!("gelfhandler: failed to forward {count} tracing events: {err}");
            });
        }
    }
}
