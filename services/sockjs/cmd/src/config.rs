//! Configuration handling for the SockJS gateway.
//!
//! This module reads configuration from the shared config file and
//! environment variables, providing a unified configuration interface.

use anyhow::Result;
use serde::Deserialize;
use sockjs_http::TransportConfig;
use sockjs_session::SessionConfig;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;
use tracing::{info, warn};

/// Prefix shared by every gateway environment variable
const ENV_PREFIX: &str = "SOCKJS_";

/// SockJS gateway configuration
#[derive(Debug, Clone, PartialEq)]
pub struct GatewayConfig {
    /// Address the HTTP server binds to
    pub bind: SocketAddr,
    /// Base path the transports are mounted under
    pub prefix: String,
    /// How long a session survives with no listener attached
    pub session_timeout: Duration,
    /// Interval between heartbeat frames
    pub heartbeat_period: Duration,
    /// Byte budget of one streaming response
    pub max_bytes_streaming: usize,
    /// Whether responses carry the `JSESSIONID` cookie
    pub insert_jsessionid: bool,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        let session = SessionConfig::default();
        let transport = TransportConfig::default();
        Self {
            bind: SocketAddr::from(([127, 0, 0, 1], 8081)),
            prefix: transport.prefix,
            session_timeout: session.session_timeout,
            heartbeat_period: session.heartbeat_period,
            max_bytes_streaming: session.max_bytes_streaming,
            insert_jsessionid: transport.insert_jsessionid,
        }
    }
}

/// Root configuration structure (matches the YAML structure)
#[derive(Debug, Deserialize)]
struct RootConfig {
    services: Option<ServicesConfig>,
}

#[derive(Debug, Deserialize)]
struct ServicesConfig {
    sockjs: Option<ServiceConfig>,
}

#[derive(Debug, Deserialize)]
struct ServiceConfig {
    args: Option<Vec<String>>,
    config: Option<HashMap<String, String>>,
}

impl GatewayConfig {
    /// Load configuration from file and environment variables
    pub fn load_from_file<P: AsRef<Path>>(config_path: P) -> Result<Self> {
        let mut config = Self::default();

        match std::fs::read_to_string(&config_path) {
            Ok(content) => match serde_yaml::from_str::<RootConfig>(&content) {
                Ok(root_config) => {
                    config.apply_root_config(root_config);
                    info!("Loaded configuration from {:?}", config_path.as_ref());
                }
                Err(e) => warn!(
                    "Failed to parse config file {:?}, using defaults: {}",
                    config_path.as_ref(),
                    e
                ),
            },
            Err(_) => warn!(
                "Config file {:?} not found, using defaults",
                config_path.as_ref()
            ),
        }

        config.apply_overrides(
            std::env::vars().filter_map(|(key, value)| {
                key.strip_prefix(ENV_PREFIX)
                    .map(|name| (name.to_lowercase(), value))
            }),
            "environment",
        );

        info!(
            "Final gateway configuration: bind={}, prefix={}, session_timeout={:?}, heartbeat_period={:?}",
            config.bind, config.prefix, config.session_timeout, config.heartbeat_period
        );

        Ok(config)
    }

    /// Transport settings for the HTTP server
    pub fn transport_config(&self) -> TransportConfig {
        TransportConfig {
            prefix: self.prefix.clone(),
            insert_jsessionid: self.insert_jsessionid,
            session: SessionConfig {
                session_timeout: self.session_timeout,
                heartbeat_period: self.heartbeat_period,
                max_bytes_streaming: self.max_bytes_streaming,
            },
        }
    }

    fn apply_root_config(&mut self, root_config: RootConfig) {
        let Some(service) = root_config.services.and_then(|services| services.sockjs) else {
            return;
        };

        if let Some(args) = service.args {
            for arg in args {
                if let Some(bind) = arg.strip_prefix("--bind=") {
                    self.set("bind", bind);
                } else if let Some(prefix) = arg.strip_prefix("--prefix=") {
                    self.set("prefix", prefix);
                }
            }
        }

        if let Some(config_map) = service.config {
            self.apply_overrides(
                config_map.into_iter().filter_map(|(key, value)| {
                    key.strip_prefix("services.sockjs.")
                        .map(|name| (name.to_string(), value))
                }),
                "config file",
            );
        }
    }

    /// Apply `(setting, value)` pairs, logging each accepted override
    fn apply_overrides<I>(&mut self, overrides: I, source: &str)
    where
        I: IntoIterator<Item = (String, String)>,
    {
        for (name, value) in overrides {
            if self.set(&name, &value) {
                info!("{} overridden by {}: {}", name, source, value);
            }
        }
    }

    /// Set one named setting; unknown names and unparsable values are ignored
    fn set(&mut self, name: &str, value: &str) -> bool {
        match name {
            "bind" => parse_into(value, &mut self.bind),
            "prefix" => {
                self.prefix = value.to_string();
                true
            }
            "session_timeout" => parse_duration_into(value, &mut self.session_timeout),
            "heartbeat_period" => parse_duration_into(value, &mut self.heartbeat_period),
            "max_bytes_streaming" => parse_into(value, &mut self.max_bytes_streaming),
            "insert_jsessionid" => {
                self.insert_jsessionid = value.eq_ignore_ascii_case("true");
                true
            }
            _ => false,
        }
    }
}

fn parse_into<T: std::str::FromStr>(value: &str, target: &mut T) -> bool {
    match value.parse::<T>() {
        Ok(parsed) => {
            *target = parsed;
            true
        }
        Err(_) => {
            warn!("Ignoring invalid configuration value {:?}", value);
            false
        }
    }
}

fn parse_duration_into(value: &str, target: &mut Duration) -> bool {
    match humantime::parse_duration(value) {
        Ok(parsed) => {
            *target = parsed;
            true
        }
        Err(e) => {
            warn!("Ignoring invalid duration {:?}: {}", value, e);
            false
        }
    }
}
