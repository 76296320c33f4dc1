//! Compatibility bridge for the Rust `log` crate.
//!
//! [`GelfLogAdapter`] implements `log::Log` and forwards every enabled record
//! to a [`GelfHandlerTrait`]. [`install_global_logger`] installs it as the
//! process-wide logger.
//!
//! Records emitted by this crate itself are never forwarded, so delivery
//! warnings cannot feed back into the handler that produced them.

use std::sync::Arc;

use log::{LevelFilter, Metadata, Record, SetLoggerError};

use crate::{
    error::HandlerError,
    handler::GelfHandlerTrait,
    log_record::{GelfLogRecord, is_internal_target, normalise_target},
    rate_limited_warner::RateLimitedWarner,
};

/// Adapter implementing the Rust `log::Log` trait.
pub struct GelfLogAdapter {
    handler: Arc<dyn GelfHandlerTrait>,
    level: LevelFilter,
    warner: RateLimitedWarner,
}

/// Severity name understood by the standard severity table.
pub fn level_name(level: log::Level) -> &'static str {
    match level {
        log::Level::Error => "ERROR",
        log::Level::Warn => "WARNING",
        log::Level::Info => "INFO",
        log::Level::Debug => "DEBUG",
        log::Level::Trace => "TRACE",
    }
}

impl GelfLogAdapter {
    pub fn new(handler: Arc<dyn GelfHandlerTrait>, level: LevelFilter) -> Self {
        Self {
            handler,
            level,
            warner: RateLimitedWarner::default(),
        }
    }

    /// Convert a `log` record into the handler's record type.
    pub fn to_gelf_record(record: &Record<'_>) -> GelfLogRecord {
        let name = normalise_target(record.target());
        let module = record.module_path().unwrap_or_default();
        GelfLogRecord::new(
            name.as_ref(),
            level_name(record.level()),
            &record.args().to_string(),
        )
        .with_location(module, "", record.line().unwrap_or(0))
    }

    fn report(&self, err: &HandlerError) {
        self.warner.record_drop();
        // The `log` facade routes back here, so report on stderr.
        self.warner.warn_if_due(|count| {
            eprintln!("gelfhandler: failed to forward {count} log records: {err}");
        });
    }
}

impl log::Log for GelfLogAdapter {
    fn enabled(&self, metadata: &Metadata<'_>) -> bool {
        metadata.level() <= self.level && !is_internal_target(metadata.target())
    }

    fn log(&self, record: &Record<'_>) {
        if !self.enabled(record.metadata()) {
            return;
        }
        if let Err(err) = self.handler.handle(Self::to_gelf_record(record)) {
            self.report(&err);
        }
    }

    fn flush(&self) {
        self.handler.flush();
    }
}

/// Install a [`GelfLogAdapter`] as the global Rust logger.
///
/// Fails when another global logger is already set.
pub fn install_global_logger(
    handler: Arc<dyn GelfHandlerTrait>,
    level: LevelFilter,
) -> Result<(), SetLoggerError> {
    log::set_boxed_logger(Box::new(GelfLogAdapter::new(handler, level)))?;
    log::set_max_level(level);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::CollectingHandler;
    use log::Log;
    use rstest::rstest;

    fn adapter(level: LevelFilter) -> (GelfLogAdapter, CollectingHandler) {
        let collector = CollectingHandler::new();
        (GelfLogAdapter::new(Arc::new(collector.clone()), level), collector)
    }

    #[rstest]
    #[case(log::Level::Error, "ERROR")]
    #[case(log::Level::Warn, "WARNING")]
    #[case(log::Level::Info, "INFO")]
    #[case(log::Level::Debug, "DEBUG")]
    #[case(log::Level::Trace, "TRACE")]
    fn level_names_resolve_in_the_standard_table(
        #[case] level: log::Level,
        #[case] expected: &str,
    ) {
        assert_eq!(level_name(level), expected);
        assert!(crate::level::SeverityTable::standard().code_for(expected).is_ok());
    }

    #[rstest]
    fn adapter_forwards_records_with_location() {
        let (adapter, collector) = adapter(LevelFilter::Trace);
        adapter.log(
            &Record::builder()
                .args(format_args!("pool exhausted"))
                .level(log::Level::Warn)
                .target("app::db")
                .module_path(Some("app::db::pool"))
                .line(Some(42))
                .build(),
        );

        let records = collector.collected();
        assert_eq!(records.len(), 1);
        let record = &records[0];
        assert_eq!(record.name, "app.db");
        assert_eq!(record.levelname, "WARNING");
        assert_eq!(record.message, "pool exhausted");
        assert_eq!(record.metadata.module, "app::db::pool");
        assert_eq!(record.metadata.lineno, 42);
    }

    #[rstest]
    fn adapter_respects_its_level_filter() {
        let (adapter, collector) = adapter(LevelFilter::Info);
        adapter.log(
            &Record::builder()
                .args(format_args!("noisy"))
                .level(log::Level::Debug)
                .target("app")
                .build(),
        );
        assert!(collector.collected().is_empty());
    }

    #[rstest]
    #[case("gelfhandler", true)]
    #[case("gelfhandler::dispatcher", true)]
    #[case("gelfhandler_extras", false)]
    #[case("app::gelfhandler", false)]
    fn internal_targets_are_recognised(#[case] target: &str, #[case] internal: bool) {
        assert_eq!(is_internal_target(target), internal);
    }

    #[rstest]
    fn adapter_skips_internal_records() {
        let (adapter, collector) = adapter(LevelFilter::Trace);
        adapter.log(
            &Record::builder()
                .args(format_args!("GelfHandler failed to deliver 1 messages"))
                .level(log::Level::Warn)
                .target("gelfhandler::gelf_handler")
                .build(),
        );
        assert!(collector.collected().is_empty());
    }
}
