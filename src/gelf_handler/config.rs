//! Serializable configuration for [`GelfHandler`](super::GelfHandler).

use std::{collections::BTreeMap, time::Duration};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    message::MessageConfig,
    serialise::UdpCompression,
    transport::{EndpointConfig, TcpTransport, Timeouts, TlsOptions, UdpTransport},
};

pub const DEFAULT_HOST: &str = "localhost";
pub const DEFAULT_TCP_PORT: u16 = 12201;
pub const DEFAULT_UDP_PORT: u16 = 12202;
pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 10_000;
pub const DEFAULT_WRITE_TIMEOUT_MS: u64 = 10_000;
pub const DEFAULT_SHUTDOWN_TIMEOUT_MS: u64 = 10_000;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Protocol {
    Tcp,
    #[default]
    Udp,
}

impl Protocol {
    pub const fn default_port(self) -> u16 {
        match self {
            Self::Tcp => DEFAULT_TCP_PORT,
            Self::Udp => DEFAULT_UDP_PORT,
        }
    }
}

/// What the handler does with a message it could not deliver.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Drop the message silently.
    Swallow,
    /// Drop the message and emit a rate-limited warning.
    #[default]
    Report,
    /// Return the error to the caller of `emit`, `flush_checked` or
    /// `close_checked`.
    Propagate,
}

/// Handler settings as read from a configuration file.
///
/// Every field has a default, so `{}` deserialises to a UDP handler targeting
/// `localhost:12202`. TLS certificate validation is off unless `tls_verify`
/// is set.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GelfConfig {
    pub protocol: Protocol,
    pub host: String,
    /// Defaults to the protocol's conventional port.
    pub port: Option<u16>,
    pub full_info: bool,
    pub facility: Option<String>,
    pub from_host: Option<String>,
    pub tls: bool,
    pub tls_verify: bool,
    /// Name presented for SNI and validation; defaults to `host`.
    pub tls_domain: Option<String>,
    pub global_props: BTreeMap<String, Value>,
    pub udp_compression: UdpCompression,
    pub failure_policy: FailurePolicy,
    pub connect_timeout_ms: u64,
    pub write_timeout_ms: u64,
    pub shutdown_timeout_ms: u64,
}

impl Default for GelfConfig {
    fn default() -> Self {
        Self {
            protocol: Protocol::default(),
            host: DEFAULT_HOST.into(),
            port: None,
            full_info: false,
            facility: None,
            from_host: None,
            tls: false,
            tls_verify: false,
            tls_domain: None,
            global_props: BTreeMap::new(),
            udp_compression: UdpCompression::default(),
            failure_policy: FailurePolicy::default(),
            connect_timeout_ms: DEFAULT_CONNECT_TIMEOUT_MS,
            write_timeout_ms: DEFAULT_WRITE_TIMEOUT_MS,
            shutdown_timeout_ms: DEFAULT_SHUTDOWN_TIMEOUT_MS,
        }
    }
}

impl GelfConfig {
    pub fn resolved_port(&self) -> u16 {
        self.port.unwrap_or_else(|| self.protocol.default_port())
    }

    pub fn timeouts(&self) -> Timeouts {
        Timeouts {
            connect: Duration::from_millis(self.connect_timeout_ms),
            write: Duration::from_millis(self.write_timeout_ms),
        }
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }

    pub fn endpoint(&self) -> EndpointConfig {
        let port = self.resolved_port();
        match self.protocol {
            Protocol::Udp => EndpointConfig::Udp(UdpTransport {
                host: self.host.clone(),
                port,
            }),
            Protocol::Tcp => EndpointConfig::Tcp(TcpTransport {
                host: self.host.clone(),
                port,
                tls: self.tls.then(|| TlsOptions {
                    domain: self.tls_domain.clone().unwrap_or_else(|| self.host.clone()),
                    insecure_skip_verify: !self.tls_verify,
                }),
            }),
        }
    }

    pub fn message_config(&self) -> MessageConfig {
        MessageConfig {
            from_host: self.from_host.clone(),
            facility: self.facility.clone(),
            full_info: self.full_info,
            global_props: self.global_props.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    fn empty_document_yields_defaults() {
        let config: GelfConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, GelfConfig::default());
        assert_eq!(config.resolved_port(), DEFAULT_UDP_PORT);
        assert_eq!(config.endpoint().to_string(), "udp://localhost:12202");
    }

    #[rstest]
    #[case(Protocol::Tcp, None, 12201)]
    #[case(Protocol::Udp, None, 12202)]
    #[case(Protocol::Tcp, Some(5555), 5555)]
    fn port_defaults_follow_protocol(
        #[case] protocol: Protocol,
        #[case] port: Option<u16>,
        #[case] expected: u16,
    ) {
        let config = GelfConfig {
            protocol,
            port,
            ..Default::default()
        };
        assert_eq!(config.resolved_port(), expected);
    }

    #[rstest]
    fn tls_domain_defaults_to_host_and_skips_verification() {
        let config: GelfConfig = serde_json::from_value(serde_json::json!({
            "protocol": "tcp",
            "host": "graylog.internal",
            "tls": true,
        }))
        .unwrap();
        let EndpointConfig::Tcp(tcp) = config.endpoint() else {
            panic!("expected a tcp endpoint");
        };
        let tls = tcp.tls.expect("tls enabled");
        assert_eq!(tls.domain, "graylog.internal");
        assert!(tls.insecure_skip_verify);
    }

    #[rstest]
    fn tls_verify_enables_validation() {
        let config = GelfConfig {
            protocol: Protocol::Tcp,
            tls: true,
            tls_verify: true,
            tls_domain: Some("logs.example.com".into()),
            ..Default::default()
        };
        let EndpointConfig::Tcp(tcp) = config.endpoint() else {
            panic!("expected a tcp endpoint");
        };
        let tls = tcp.tls.unwrap();
        assert_eq!(tls.domain, "logs.example.com");
        assert!(!tls.insecure_skip_verify);
    }

    #[rstest]
    fn policies_and_compression_use_snake_case() {
        let config: GelfConfig = serde_json::from_value(serde_json::json!({
            "failure_policy": "propagate",
            "udp_compression": "none",
            "global_props": {"env": "prod"},
        }))
        .unwrap();
        assert_eq!(config.failure_policy, FailurePolicy::Propagate);
        assert_eq!(config.udp_compression, UdpCompression::None);
        assert_eq!(config.message_config().global_props["env"], "prod");
    }

    #[rstest]
    fn unknown_keys_are_rejected() {
        let err = serde_json::from_str::<GelfConfig>(r#"{"chunk_size": 8154}"#).unwrap_err();
        assert!(err.to_string().contains("chunk_size"));
    }
}
