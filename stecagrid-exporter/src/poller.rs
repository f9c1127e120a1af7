//! Inverter polling loop.

use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, info, warn};

use crate::document::MeasurementDocument;
use crate::error::PollError;
use crate::fetcher::Fetcher;
use crate::mapper;
use crate::registry::SharedRegistry;

/// Shortest period between two ticks.
const MIN_PERIOD: Duration = Duration::from_millis(1);

/// Polls the inverter on a fixed period and feeds the registry.
///
/// Ticks run one at a time. A tick that overruns the period delays the next
/// one instead of overlapping it.
pub struct Poller {
    fetcher: Fetcher,
    registry: SharedRegistry,
    period: Duration,
}

impl Poller {
    /// Create a new poller. Periods shorter than one millisecond are raised
    /// to one millisecond.
    pub fn new(fetcher: Fetcher, registry: SharedRegistry, period: Duration) -> Self {
        Self {
            fetcher,
            registry,
            period: period.max(MIN_PERIOD),
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Run the polling loop until the shutdown signal is received.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            url = %self.fetcher.url(),
            interval_secs = self.period.as_secs_f64(),
            "Starting inverter poller"
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let _ = self.tick().await;
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!("Inverter poller stopped");
    }

    /// Run one fetch-and-map cycle, recording its outcome.
    ///
    /// Failures are logged and counted. The registry keeps its previous
    /// values when the cycle fails.
    pub async fn tick(&self) -> Result<usize, PollError> {
        self.registry.record_poll_started();

        match self.poll_once().await {
            Ok(updated) => {
                self.registry.record_success(updated);
                debug!(updated, "Poll complete");
                Ok(updated)
            }
            Err(e) => {
                self.registry.record_failure(&e);
                warn!(
                    kind = e.kind(),
                    url = %self.fetcher.url(),
                    error = %e,
                    "Poll failed, keeping last known values"
                );
                Err(e)
            }
        }
    }

    async fn poll_once(&self) -> Result<usize, PollError> {
        let body = self.fetcher.fetch().await?;
        let document = MeasurementDocument::parse(&body)?;

        self.registry.set_device(document.device.clone());
        Ok(mapper::apply(&document, &self.registry))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DeviceConfig;
    use crate::registry::SinkRegistry;
    use std::sync::Arc;

    fn make_poller(period: Duration) -> Poller {
        let config = DeviceConfig {
            host: "127.0.0.1:9".to_string(),
            timeout_ms: 100,
            ..Default::default()
        };
        let fetcher = Fetcher::new(&config).unwrap();
        Poller::new(fetcher, Arc::new(SinkRegistry::new("stecagrid")), period)
    }

    #[test]
    fn test_zero_period_is_clamped() {
        assert_eq!(make_poller(Duration::ZERO).period(), MIN_PERIOD);
        assert_eq!(
            make_poller(Duration::from_secs(5)).period(),
            Duration::from_secs(5)
        );
    }

    #[tokio::test]
    async fn test_run_with_zero_period_stops_on_shutdown() {
        let poller = make_poller(Duration::ZERO);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let handle = tokio::spawn(poller.run(shutdown_rx));
        tokio::time::sleep(Duration::from_millis(20)).await;
        shutdown_tx.send(true).unwrap();

        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("poller should stop on shutdown")
            .unwrap();
    }
}
