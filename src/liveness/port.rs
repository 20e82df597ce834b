use std::time::Duration;

use async_trait::async_trait;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::debug;

use super::plugin::{invalid, PluginConfig, HOST_KEY, PORT_KEY};
use super::LivenessDetector;
use crate::error::{ConfigError, Error, Result};

pub const DEFAULT_HOST: &str = "127.0.0.1";
const CONNECT_TIMEOUT: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortDetectorConfig {
    pub host: String,
    pub ports: Vec<u16>,
    pub connect_timeout: Duration,
}

impl PortDetectorConfig {
    pub fn new(host: impl Into<String>, ports: Vec<u16>) -> std::result::Result<Self, ConfigError> {
        if ports.is_empty() {
            return Err(ConfigError::MissingField { field: PORT_KEY });
        }
        Ok(Self {
            host: host.into(),
            ports,
            connect_timeout: CONNECT_TIMEOUT,
        })
    }

    pub fn from_plugin(config: &PluginConfig) -> std::result::Result<Self, ConfigError> {
        let ports = config
            .u64_list(PORT_KEY)?
            .ok_or(ConfigError::MissingField { field: PORT_KEY })?
            .into_iter()
            .map(|port| {
                u16::try_from(port)
                    .ok()
                    .filter(|p| *p != 0)
                    .ok_or_else(|| invalid(PORT_KEY, format!("{port} is not a valid TCP port")))
            })
            .collect::<std::result::Result<Vec<_>, _>>()?;
        let host = config
            .optional_string(HOST_KEY)?
            .unwrap_or_else(|| DEFAULT_HOST.to_string());
        Self::new(host, ports)
    }
}

/// Alive when every configured port accepts a TCP connection.
#[derive(Debug, Clone)]
pub struct PortLivenessDetector {
    config: PortDetectorConfig,
}

impl PortLivenessDetector {
    pub fn new(config: PortDetectorConfig) -> Self {
        Self { config }
    }

    async fn is_open(&self, port: u16) -> bool {
        let addr = (self.config.host.as_str(), port);
        match timeout(self.config.connect_timeout, TcpStream::connect(addr)).await {
            Ok(Ok(_)) => true,
            Ok(Err(e)) => {
                debug!(host = %self.config.host, port, error = %e, "Port is closed");
                false
            }
            Err(_) => {
                debug!(host = %self.config.host, port, "Port connect timed out");
                false
            }
        }
    }
}

#[async_trait]
impl LivenessDetector for PortLivenessDetector {
    fn name(&self) -> &'static str {
        "port"
    }

    async fn is_alive(&self) -> Result<bool> {
        for &port in &self.config.ports {
            if !self.is_open(port).await {
                return Ok(false);
            }
        }
        Ok(true)
    }

    async fn before_launch(&self) -> Result<()> {
        for &port in &self.config.ports {
            if self.is_open(port).await {
                return Err(Error::PortInUse {
                    host: self.config.host.clone(),
                    port,
                });
            }
        }
        Ok(())
    }
}
