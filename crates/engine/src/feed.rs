use api_client::ExchangeGateway;
use chrono::Utc;
use core_types::Tick;
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Polls the exchange's last price for every tracked currency.
pub struct PriceFeed {
    gateway: Arc<ExchangeGateway>,
    symbols: Vec<String>,
    interval: Duration,
}

impl PriceFeed {
    pub fn new(gateway: Arc<ExchangeGateway>, symbols: Vec<String>, interval: Duration) -> Self {
        Self {
            gateway,
            symbols,
            interval,
        }
    }

    /// Emits one tick per symbol per interval until `shutdown` fires or the
    /// receiver goes away. A fatal gateway error cancels `shutdown`.
    pub async fn run(self, ticks: mpsc::Sender<Tick>, shutdown: CancellationToken) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!(symbols = self.symbols.len(), every_secs = self.interval.as_secs(), "Price feed started");

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {}
            }

            // Symbols are polled together so one slow answer does not delay the rest.
            let gateway = &self.gateway;
            let prices = join_all(self.symbols.iter().map(|symbol| async move {
                (symbol, gateway.price(symbol).await)
            }))
            .await;

            let timestamp = Utc::now();
            for (symbol, price) in prices {
                match price {
                    Ok(price) => {
                        let tick = Tick {
                            symbol: symbol.clone(),
                            price,
                            timestamp,
                        };
                        if ticks.send(tick).await.is_err() {
                            return;
                        }
                    }
                    Err(e) if e.is_fatal() => {
                        error!(%symbol, error = %e, "Price feed stopped");
                        shutdown.cancel();
                        return;
                    }
                    Err(e) => warn!(%symbol, error = %e, "Price poll failed"),
                }
            }
        }
    }
}
