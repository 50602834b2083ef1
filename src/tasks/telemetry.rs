use embassy_time::Ticker;

use crate::config::TelemetryConfig;
use crate::state::StateReader;
use crate::telemetry::{Telemetry, TelemetryError, Topic};

/// Publishes the latest PM2.5 on a fixed cadence.
///
/// The publisher outlives any one connection: [`serve`](Self::serve) drives a client until it
/// fails, then the caller builds a fresh one and serves again on the same ticker.
pub struct TelemetryPublisher<'a> {
    reader: StateReader<'a>,
    topic: Topic,
    ticker: Ticker,
}

impl<'a> TelemetryPublisher<'a> {
    pub fn new(reader: StateReader<'a>, topic: Topic, config: &TelemetryConfig) -> Self {
        Self {
            reader,
            topic,
            ticker: Ticker::every(config.publish_interval),
        }
    }

    /// Publishes the latest PM2.5 if there is one. Returns the published value.
    pub async fn cycle<T: Telemetry>(
        &mut self,
        client: &mut T,
    ) -> Result<Option<u16>, TelemetryError> {
        let Some(pm25) = self.reader.pm25() else {
            return Ok(None);
        };
        client.ensure_connected().await?;
        client.publish(&self.topic, pm25).await?;
        Ok(Some(pm25))
    }

    /// Runs one cycle per tick until `client` fails, and returns that failure.
    pub async fn serve<T: Telemetry>(&mut self, client: &mut T) -> TelemetryError {
        loop {
            self.ticker.next().await;
            match self.cycle(client).await {
                Ok(Some(pm25)) => info!("telemetry: published pm2.5 = {}", pm25),
                Ok(None) => debug!("telemetry: nothing to publish yet"),
                Err(e) => {
                    warn!("telemetry: publish failed: {}", e);
                    return e;
                }
            }
        }
    }
}
