use embassy_time::Timer;

use crate::config::RangingConfig;
use crate::sensors::{RangingError, RangingSensor};
use crate::state::DistanceWriter;

pub struct DistancePoller<'a, S> {
    sensor: S,
    distance: DistanceWriter<'a>,
    config: RangingConfig,
}

impl<'a, S: RangingSensor> DistancePoller<'a, S> {
    pub fn new(sensor: S, distance: DistanceWriter<'a>, config: &RangingConfig) -> Self {
        Self {
            sensor,
            distance,
            config: *config,
        }
    }

    /// Stores the latched sample if there is one. `Ok(None)` means no new sample yet.
    pub async fn cycle(&mut self) -> Result<Option<u16>, RangingError> {
        if !self.sensor.sample_ready().await? {
            return Ok(None);
        }
        let sample = self.sensor.read_distance().await;
        if let Ok(distance_mm) = sample {
            self.distance.store(distance_mm);
        }
        // Re-arm even when the sample is bad, otherwise ranging stalls.
        self.sensor.clear_latch().await?;

        sample.map(Some)
    }

    pub async fn run(mut self) -> ! {
        loop {
            if let Err(e) = self.cycle().await {
                warn!("ranging: skipped sample: {}", e);
            }
            Timer::after(self.config.poll_interval).await;
        }
    }
}
