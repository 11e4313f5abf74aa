//! Service configuration.
//!
//! Values are read from the environment. A `.env` file in the working
//! directory is loaded first by the binary, so everything here can also be set
//! there.

use std::{env, net::SocketAddr, num::ParseIntError};

use thiserror::Error;

/// Service name reported as the `service.name` resource attribute.
pub const DEFAULT_SERVICE_NAME: &str = "demo-app";
/// gRPC endpoint of the collector's trace receiver.
pub const DEFAULT_TRACES_ENDPOINT: &str = "http://otel-collector:4317";
/// HTTP endpoint of the collector's log receiver. The exporter appends
/// `/v1/logs` unless the endpoint comes from `OTEL_EXPORTER_OTLP_LOGS_ENDPOINT`.
pub const DEFAULT_LOGS_ENDPOINT: &str = "http://otel-collector:4318";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("APP_PORT must be a valid port number: {0}")]
    Port(#[from] ParseIntError),
    #[error("{0} must be a valid socket address: {1}")]
    Address(String, std::net::AddrParseError),
    #[error("SERVICE_NAME must not be empty")]
    EmptyServiceName,
}

/// Runtime configuration of the service.
///
/// - `SERVICE_NAME` (default `demo-app`)
/// - `OTEL_EXPORTER_OTLP_TRACES_ENDPOINT` (default `http://otel-collector:4317`)
/// - `OTEL_EXPORTER_OTLP_LOGS_ENDPOINT` (default `http://otel-collector:4318`)
/// - `APP_HOST` (default `0.0.0.0`)
/// - `APP_PORT` (default `8000`)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub service_name: String,
    pub traces_endpoint: String,
    pub logs_endpoint: String,
    pub host: String,
    pub port: u16,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Builds the configuration from `lookup`, which returns the value of a
    /// variable or `None` when it is unset. Unset variables keep their
    /// defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let service_name = lookup("SERVICE_NAME").unwrap_or(defaults.service_name);
        if service_name.trim().is_empty() {
            return Err(ConfigError::EmptyServiceName);
        }

        let port = lookup("APP_PORT")
            .map(|port| port.parse::<u16>())
            .transpose()?
            .unwrap_or(defaults.port);

        Ok(Self {
            service_name,
            traces_endpoint: lookup("OTEL_EXPORTER_OTLP_TRACES_ENDPOINT")
                .unwrap_or(defaults.traces_endpoint),
            logs_endpoint: lookup("OTEL_EXPORTER_OTLP_LOGS_ENDPOINT")
                .unwrap_or(defaults.logs_endpoint),
            host: lookup("APP_HOST").unwrap_or(defaults.host),
            port,
        })
    }

    /// Address the HTTP server binds to.
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        let addr = format!("{}:{}", self.host, self.port);
        addr.parse()
            .map_err(|err| ConfigError::Address(addr, err))
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            service_name: DEFAULT_SERVICE_NAME.to_string(),
            traces_endpoint: DEFAULT_TRACES_ENDPOINT.to_string(),
            logs_endpoint: DEFAULT_LOGS_ENDPOINT.to_string(),
            host: "0.0.0.0".to_string(),
            port: 8000,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn from_vars(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(name, value)| (name.to_string(), value.to_string()))
            .collect();
        Config::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn unset_variables_keep_the_defaults() {
        assert_eq!(from_vars(&[]).unwrap(), Config::default());
    }

    #[test]
    fn variables_override_the_defaults() {
        let config = from_vars(&[
            ("SERVICE_NAME", "checkout"),
            ("OTEL_EXPORTER_OTLP_TRACES_ENDPOINT", "http://localhost:4317"),
            ("OTEL_EXPORTER_OTLP_LOGS_ENDPOINT", "http://localhost:4318"),
            ("APP_HOST", "127.0.0.1"),
            ("APP_PORT", "9090"),
        ])
        .unwrap();

        assert_eq!(
            config,
            Config {
                service_name: "checkout".to_string(),
                traces_endpoint: "http://localhost:4317".to_string(),
                logs_endpoint: "http://localhost:4318".to_string(),
                host: "127.0.0.1".to_string(),
                port: 9090,
            }
        );
    }

    #[test]
    fn port_must_be_a_number() {
        assert!(matches!(
            from_vars(&[("APP_PORT", "abc")]),
            Err(ConfigError::Port(_))
        ));
        assert!(matches!(
            from_vars(&[("APP_PORT", "70000")]),
            Err(ConfigError::Port(_))
        ));
    }

    #[test]
    fn blank_service_name_is_rejected() {
        assert!(matches!(
            from_vars(&[("SERVICE_NAME", " ")]),
            Err(ConfigError::EmptyServiceName)
        ));
    }

    // The only test touching the process environment, so nothing races it.
    #[test]
    fn from_env_reads_the_process_environment() {
        let vars = [
            "SERVICE_NAME",
            "APP_PORT",
            "APP_HOST",
            "OTEL_EXPORTER_OTLP_TRACES_ENDPOINT",
            "OTEL_EXPORTER_OTLP_LOGS_ENDPOINT",
        ];
        for name in vars {
            env::remove_var(name);
        }

        env::set_var("APP_PORT", "abc");
        assert!(matches!(Config::from_env(), Err(ConfigError::Port(_))));

        env::set_var("APP_PORT", "8081");
        env::set_var("SERVICE_NAME", " ");
        assert!(matches!(
            Config::from_env(),
            Err(ConfigError::EmptyServiceName)
        ));

        env::set_var("SERVICE_NAME", "inventory");
        env::set_var("APP_HOST", "127.0.0.1");
        let config = Config::from_env().unwrap();
        assert_eq!(config.service_name, "inventory");
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.port, 8081);
        assert_eq!(config.traces_endpoint, DEFAULT_TRACES_ENDPOINT);

        for name in vars {
            env::remove_var(name);
        }
    }

    #[test]
    fn defaults_point_at_the_collector() {
        let config = Config::default();
        assert_eq!(config.service_name, "demo-app");
        assert_eq!(config.traces_endpoint, "http://otel-collector:4317");
        assert_eq!(config.logs_endpoint, "http://otel-collector:4318");
        assert_eq!(config.port, 8000);
    }

    #[test]
    fn socket_addr_joins_host_and_port() {
        let config = Config {
            host: "127.0.0.1".to_string(),
            port: 3000,
            ..Config::default()
        };
        assert_eq!(config.socket_addr().unwrap().to_string(), "127.0.0.1:3000");
    }

    #[test]
    fn socket_addr_rejects_hostnames() {
        let config = Config {
            host: "not a host".to_string(),
            ..Config::default()
        };
        assert!(matches!(
            config.socket_addr(),
            Err(ConfigError::Address(addr, _)) if addr == "not a host:8000"
        ));
    }
}
