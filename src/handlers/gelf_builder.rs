//! Builder for [`GelfHandler`].
//!
//! Exposes endpoint selection, timeout tuning, TLS configuration, message
//! enrichment and failure handling. Values left unset fall back to the
//! [`GelfConfig`] defaults.

use std::{collections::BTreeMap, sync::Arc, time::Duration};

use serde_json::Value;

use crate::{
    dispatcher::Connector,
    gelf_handler::{
        DeliveryFailure, FailureHook, FailurePolicy, GelfConfig, GelfHandler, HandlerParts,
        Protocol, SuccessHook,
    },
    level::SeverityRegistry,
    rate_limited_warner::DEFAULT_WARN_INTERVAL,
    serialise::UdpCompression,
    transport::Transport,
};

use super::{
    HandlerBuildError, HandlerBuilderTrait,
    builder_macros::{ensure_positive, option_setter},
};

/// Builder for constructing [`GelfHandler`] instances.
#[derive(Clone, Default)]
pub struct GelfHandlerBuilder {
    protocol: Option<Protocol>,
    host: Option<String>,
    port: Option<u16>,
    full_info: Option<bool>,
    facility: Option<String>,
    from_host: Option<String>,
    tls: Option<bool>,
    tls_verify: Option<bool>,
    tls_domain: Option<String>,
    global_props: BTreeMap<String, Value>,
    udp_compression: Option<UdpCompression>,
    failure_policy: Option<FailurePolicy>,
    connect_timeout_ms: Option<u64>,
    write_timeout_ms: Option<u64>,
    shutdown_timeout_ms: Option<u64>,
    warn_interval_ms: Option<u64>,
    levels: Option<Arc<SeverityRegistry>>,
    on_success: Option<SuccessHook>,
    on_failure: Option<FailureHook>,
    connector: Option<Connector>,
}

impl GelfHandlerBuilder {
    /// Create a new builder using the default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the builder from a deserialised configuration.
    pub fn from_config(config: GelfConfig) -> Self {
        Self {
            protocol: Some(config.protocol),
            host: Some(config.host),
            port: config.port,
            full_info: Some(config.full_info),
            facility: config.facility,
            from_host: config.from_host,
            tls: Some(config.tls),
            tls_verify: Some(config.tls_verify),
            tls_domain: config.tls_domain,
            global_props: config.global_props,
            udp_compression: Some(config.udp_compression),
            failure_policy: Some(config.failure_policy),
            connect_timeout_ms: Some(config.connect_timeout_ms),
            write_timeout_ms: Some(config.write_timeout_ms),
            shutdown_timeout_ms: Some(config.shutdown_timeout_ms),
            ..Self::default()
        }
    }

    /// Send over TCP to `host:port`.
    pub fn with_tcp(mut self, host: impl Into<String>, port: u16) -> Self {
        self.protocol = Some(Protocol::Tcp);
        self.host = Some(host.into());
        self.port = Some(port);
        self
    }

    /// Send over UDP to `host:port`.
    pub fn with_udp(mut self, host: impl Into<String>, port: u16) -> Self {
        self.protocol = Some(Protocol::Udp);
        self.host = Some(host.into());
        self.port = Some(port);
        self
    }

    option_setter!(with_protocol, protocol, Protocol);
    option_setter!(with_port, port, u16);
    option_setter!(
        #[doc = "Add function, line, module, process and thread fields."]
        with_full_info,
        full_info,
        bool
    );
    option_setter!(
        #[doc = "Wrap the TCP stream in TLS."]
        with_tls,
        tls,
        bool
    );
    option_setter!(
        #[doc = "Validate the server certificate and host name (off by default)."]
        with_tls_verification,
        tls_verify,
        bool
    );
    option_setter!(with_udp_compression, udp_compression, UdpCompression);
    option_setter!(with_failure_policy, failure_policy, FailurePolicy);
    option_setter!(with_connect_timeout_ms, connect_timeout_ms, u64);
    option_setter!(with_write_timeout_ms, write_timeout_ms, u64);
    option_setter!(with_shutdown_timeout_ms, shutdown_timeout_ms, u64);
    option_setter!(
        #[doc = "Minimum spacing between repeated delivery warnings."]
        with_warn_interval_ms,
        warn_interval_ms,
        u64
    );

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    pub fn with_facility(mut self, facility: impl Into<String>) -> Self {
        self.facility = Some(facility.into());
        self
    }

    /// Override the `host` field of every message.
    pub fn with_from_host(mut self, from_host: impl Into<String>) -> Self {
        self.from_host = Some(from_host.into());
        self
    }

    /// Name used for SNI and certificate validation. Defaults to the host.
    pub fn with_tls_domain(mut self, domain: impl Into<String>) -> Self {
        self.tls_domain = Some(domain.into());
        self
    }

    /// Add a property attached to every message.
    pub fn with_global_prop(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.global_props.insert(key.into(), value.into());
        self
    }

    /// Resolve level names through `levels` instead of the standard table.
    pub fn with_severity_registry(mut self, levels: Arc<SeverityRegistry>) -> Self {
        self.levels = Some(levels);
        self
    }

    pub fn with_success_callback(mut self, callback: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_success = Some(Arc::new(callback));
        self
    }

    pub fn with_failure_callback(
        mut self,
        callback: impl Fn(&DeliveryFailure) + Send + Sync + 'static,
    ) -> Self {
        self.on_failure = Some(Arc::new(callback));
        self
    }

    /// Replace the network endpoint with a custom transport. Framing still
    /// follows the configured protocol.
    pub fn with_transport_factory<F>(mut self, factory: F) -> Self
    where
        F: Fn() -> Box<dyn Transport> + Send + Sync + 'static,
    {
        self.connector = Some(Arc::new(factory));
        self
    }

    fn validate(&self) -> Result<(), HandlerBuildError> {
        self.validate_endpoint()?;
        self.validate_timeouts()?;
        self.validate_global_props()?;
        Ok(())
    }

    fn validate_endpoint(&self) -> Result<(), HandlerBuildError> {
        if self.host.as_deref().is_some_and(|host| host.trim().is_empty()) {
            return Err(HandlerBuildError::InvalidConfig(
                "host must not be empty".into(),
            ));
        }
        if let Some(port) = self.port {
            ensure_positive!(port, "port")?;
        }
        let protocol = self.protocol.unwrap_or_default();
        if protocol != Protocol::Tcp && self.tls == Some(true) {
            return Err(HandlerBuildError::InvalidConfig(
                "tls is only supported for tcp transports".into(),
            ));
        }
        Ok(())
    }

    fn validate_timeouts(&self) -> Result<(), HandlerBuildError> {
        if let Some(timeout) = self.connect_timeout_ms {
            ensure_positive!(timeout, "connect_timeout_ms")?;
        }
        if let Some(timeout) = self.write_timeout_ms {
            ensure_positive!(timeout, "write_timeout_ms")?;
        }
        if let Some(timeout) = self.shutdown_timeout_ms {
            ensure_positive!(timeout, "shutdown_timeout_ms")?;
        }
        Ok(())
    }

    fn validate_global_props(&self) -> Result<(), HandlerBuildError> {
        match self
            .global_props
            .iter()
            .find(|(_, value)| value.is_array() || value.is_object())
        {
            Some((key, _)) => Err(HandlerBuildError::InvalidConfig(format!(
                "global property `{key}` must be a string, number or boolean"
            ))),
            None => Ok(()),
        }
    }

    /// Validate and resolve the configuration the handler will use.
    pub fn build_config(&self) -> Result<GelfConfig, HandlerBuildError> {
        self.validate()?;
        let mut config = GelfConfig::default();
        self.apply_optional_fields(&mut config);
        Ok(config)
    }

    fn apply_optional_fields(&self, config: &mut GelfConfig) {
        if let Some(protocol) = self.protocol {
            config.protocol = protocol;
        }
        if let Some(host) = &self.host {
            config.host = host.trim().to_owned();
        }
        config.port = self.port;
        if let Some(full_info) = self.full_info {
            config.full_info = full_info;
        }
        config.facility = self.facility.clone();
        config.from_host = self.from_host.clone();
        if let Some(tls) = self.tls {
            config.tls = tls;
        }
        if let Some(verify) = self.tls_verify {
            config.tls_verify = verify;
        }
        config.tls_domain = self.tls_domain.clone();
        config.global_props = self.global_props.clone();
        if let Some(compression) = self.udp_compression {
            config.udp_compression = compression;
        }
        if let Some(policy) = self.failure_policy {
            config.failure_policy = policy;
        }
        if let Some(timeout) = self.connect_timeout_ms {
            config.connect_timeout_ms = timeout;
        }
        if let Some(timeout) = self.write_timeout_ms {
            config.write_timeout_ms = timeout;
        }
        if let Some(timeout) = self.shutdown_timeout_ms {
            config.shutdown_timeout_ms = timeout;
        }
    }
}

impl HandlerBuilderTrait for GelfHandlerBuilder {
    type Handler = GelfHandler;

    fn build_inner(&self) -> Result<Self::Handler, HandlerBuildError> {
        let config = self.build_config()?;
        let warn_interval = self
            .warn_interval_ms
            .map_or(DEFAULT_WARN_INTERVAL, Duration::from_millis);
        Ok(GelfHandler::from_parts(HandlerParts {
            config,
            levels: self.levels.clone(),
            on_success: self.on_success.clone(),
            on_failure: self.on_failure.clone(),
            connector: self.connector.clone(),
            warn_interval,
        }))
    }
}

impl std::fmt::Debug for GelfHandlerBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GelfHandlerBuilder")
            .field("protocol", &self.protocol)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("tls", &self.tls)
            .field("failure_policy", &self.failure_policy)
            .field("custom_transport", &self.connector.is_some())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn invalid(builder: GelfHandlerBuilder) -> String {
        match builder.build_config() {
            Err(HandlerBuildError::InvalidConfig(msg)) => msg,
            other => panic!("expected InvalidConfig, got {other:?}"),
        }
    }

    #[rstest]
    fn defaults_match_config_defaults() {
        let config = GelfHandlerBuilder::new().build_config().unwrap();
        assert_eq!(config, GelfConfig::default());
    }

    #[rstest]
    #[case(GelfHandlerBuilder::new().with_host("  "), "host must not be empty")]
    #[case(GelfHandlerBuilder::new().with_port(0), "port must be greater than zero")]
    #[case(
        GelfHandlerBuilder::new().with_connect_timeout_ms(0),
        "connect_timeout_ms must be greater than zero"
    )]
    #[case(
        GelfHandlerBuilder::new().with_write_timeout_ms(0),
        "write_timeout_ms must be greater than zero"
    )]
    #[case(
        GelfHandlerBuilder::new().with_shutdown_timeout_ms(0),
        "shutdown_timeout_ms must be greater than zero"
    )]
    #[case(
        GelfHandlerBuilder::new().with_udp("graylog", 12202).with_tls(true),
        "tls is only supported for tcp transports"
    )]
    fn rejects_invalid_settings(#[case] builder: GelfHandlerBuilder, #[case] expected: &str) {
        assert_eq!(invalid(builder), expected);
    }

    #[rstest]
    fn rejects_nested_global_props() {
        let msg = invalid(GelfHandlerBuilder::new().with_global_prop("tags", serde_json::json!(["a"])));
        assert!(msg.contains("`tags`"));
    }

    #[rstest]
    fn tcp_with_tls_resolves_endpoint() {
        let config = GelfHandlerBuilder::new()
            .with_tcp("graylog.internal", 12201)
            .with_tls(true)
            .with_tls_verification(true)
            .build_config()
            .unwrap();
        assert_eq!(config.endpoint().to_string(), "tcp+tls://graylog.internal:12201");
        assert!(config.tls_verify);
    }

    #[rstest]
    fn from_config_round_trips() {
        let config = GelfConfig {
            protocol: Protocol::Tcp,
            host: "graylog".into(),
            port: Some(1514),
            full_info: true,
            facility: Some("billing".into()),
            failure_policy: FailurePolicy::Swallow,
            ..Default::default()
        };
        let resolved = GelfHandlerBuilder::from_config(config.clone())
            .build_config()
            .unwrap();
        assert_eq!(resolved, config);
    }

    #[rstest]
    fn compression_is_ignored_for_tcp() {
        let config = GelfHandlerBuilder::new()
            .with_tcp("graylog", 12201)
            .with_udp_compression(UdpCompression::None)
            .build_config()
            .unwrap();
        assert_eq!(config.protocol, Protocol::Tcp);
    }
}
