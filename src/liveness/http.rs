use std::collections::BTreeSet;
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;
use url::Url;

use super::plugin::{invalid, PluginConfig, RESPONSE_CODES_KEY, URL_KEY};
use super::LivenessDetector;
use crate::error::{ConfigError, Result};

const REQUEST_TIMEOUT: Duration = Duration::from_millis(1000);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpDetectorConfig {
    pub url: Url,
    pub response_codes: BTreeSet<u16>,
    pub timeout: Duration,
}

impl HttpDetectorConfig {
    pub fn new(url: &str) -> std::result::Result<Self, ConfigError> {
        let url = Url::parse(url).map_err(|e| invalid(URL_KEY, format!("{url}: {e}")))?;
        Ok(Self {
            url,
            response_codes: BTreeSet::from([200]),
            timeout: REQUEST_TIMEOUT,
        })
    }

    pub fn from_plugin(config: &PluginConfig) -> std::result::Result<Self, ConfigError> {
        let mut parsed = Self::new(&config.required_string(URL_KEY)?)?;
        if let Some(codes) = config.u64_list(RESPONSE_CODES_KEY)? {
            if codes.is_empty() {
                return Err(invalid(RESPONSE_CODES_KEY, "at least one code is required".into()));
            }
            parsed.response_codes = codes
                .into_iter()
                .map(|code| match u16::try_from(code) {
                    Ok(code @ 100..=599) => Ok(code),
                    _ => Err(invalid(
                        RESPONSE_CODES_KEY,
                        format!("{code} is not an HTTP status code"),
                    )),
                })
                .collect::<std::result::Result<_, _>>()?;
        }
        Ok(parsed)
    }
}

/// Alive when a GET answers with one of the accepted status codes.
///
/// Transport failures mean the service is not listening yet and are reported
/// as not alive.
#[derive(Debug, Clone)]
pub struct HttpLivenessDetector {
    config: HttpDetectorConfig,
    client: reqwest::Client,
}

impl HttpLivenessDetector {
    pub fn new(config: HttpDetectorConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(config.timeout)
            .timeout(config.timeout)
            .build()?;
        Ok(Self { config, client })
    }
}

#[async_trait]
impl LivenessDetector for HttpLivenessDetector {
    fn name(&self) -> &'static str {
        "http"
    }

    async fn is_alive(&self) -> Result<bool> {
        match self.client.get(self.config.url.clone()).send().await {
            Ok(response) => {
                let status = response.status().as_u16();
                let alive = self.config.response_codes.contains(&status);
                debug!(url = %self.config.url, status, alive, "HTTP liveness check");
                Ok(alive)
            }
            Err(e) => {
                debug!(url = %self.config.url, error = %e, "HTTP liveness check failed to connect");
                Ok(false)
            }
        }
    }
}
