//! HTTP client for the inverter's measurements page.

use std::time::Duration;

use reqwest::Client;
use tracing::trace;

use crate::config::DeviceConfig;
use crate::error::FetchError;

/// Fetches the raw measurements document from one inverter.
#[derive(Clone)]
pub struct Fetcher {
    client: Client,
    url: String,
    timeout: Duration,
}

impl Fetcher {
    /// Build a fetcher for the configured device.
    ///
    /// When `accept_invalid_certs` is set, certificate verification is
    /// disabled for this client only.
    pub fn new(config: &DeviceConfig) -> Result<Self, FetchError> {
        let timeout = config.timeout();
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .danger_accept_invalid_certs(config.accept_invalid_certs)
            .user_agent(concat!("stecagrid-exporter/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(FetchError::Client)?;

        Ok(Self {
            client,
            url: config.url(),
            timeout,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// GET the document body.
    pub async fn fetch(&self) -> Result<Vec<u8>, FetchError> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| self.classify(e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
            });
        }

        let body = response.bytes().await.map_err(|e| self.classify(e))?;
        trace!(url = %self.url, bytes = body.len(), "Fetched measurements");

        Ok(body.to_vec())
    }

    fn classify(&self, error: reqwest::Error) -> FetchError {
        if error.is_timeout() {
            FetchError::Timeout {
                timeout: self.timeout,
                source: error,
            }
        } else {
            FetchError::Request(error)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Scheme;

    #[test]
    fn test_fetcher_url() {
        let config = DeviceConfig {
            host: "10.0.0.7".to_string(),
            path: "/measurements.xml".to_string(),
            scheme: Scheme::Https,
            ..Default::default()
        };

        let fetcher = Fetcher::new(&config).unwrap();
        assert_eq!(fetcher.url(), "https://10.0.0.7/measurements.xml");
    }

    #[tokio::test]
    async fn test_fetch_connection_refused() {
        // Bind then drop to get a port with nothing listening.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let config = DeviceConfig {
            host: addr.to_string(),
            timeout_ms: 500,
            ..Default::default()
        };

        let err = Fetcher::new(&config).unwrap().fetch().await.unwrap_err();
        assert!(matches!(
            err,
            FetchError::Request(_) | FetchError::Timeout { .. }
        ));
        assert_eq!(err.status(), None);
    }
}
