use embassy_time::{Instant, Timer};

use crate::config::PresenceConfig;
use crate::state::{PresenceWriter, StateReader};

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PresenceEvent {
    /// Someone moved towards the sensor; screen on, timer re-armed.
    Approach,
    /// No approach for a whole timeout window; screen off.
    TimedOut,
}

/// Screen on/off state machine driven by successive distance observations.
///
/// Approach is judged against the monitor's own previous observation, so fast changes between
/// two monitor cycles collapse into one comparison.
pub struct PresenceMonitor<'a> {
    reader: StateReader<'a>,
    writer: PresenceWriter<'a>,
    config: PresenceConfig,
    armed_at: Instant,
}

impl<'a> PresenceMonitor<'a> {
    pub fn new(
        reader: StateReader<'a>,
        writer: PresenceWriter<'a>,
        config: &PresenceConfig,
        now: Instant,
    ) -> Self {
        Self {
            reader,
            writer,
            config: *config,
            armed_at: now,
        }
    }

    pub fn observe(&mut self, now: Instant) -> Option<PresenceEvent> {
        let mut event = None;

        if let Some(current) = self.reader.distance_mm() {
            if let Some(previous) = self.reader.previous_distance_mm() {
                let change = i32::from(current) - i32::from(previous);
                if change < -i32::from(self.config.approach_threshold_mm) {
                    self.armed_at = now;
                    self.writer.set_screen_active(true);
                    event = Some(PresenceEvent::Approach);
                }
            }
            self.writer.store_previous_distance(current);
        }

        if now.saturating_duration_since(self.armed_at) > self.config.timeout {
            self.armed_at = now;
            if self.reader.screen_active() {
                event = Some(PresenceEvent::TimedOut);
            }
            self.writer.set_screen_active(false);
        }

        event
    }

    pub async fn run(mut self) -> ! {
        loop {
            match self.observe(Instant::now()) {
                Some(PresenceEvent::Approach) => info!("presence: approach, screen on"),
                Some(PresenceEvent::TimedOut) => info!("presence: timed out, screen off"),
                None => {}
            }
            Timer::after(self.config.poll_interval).await;
        }
    }
}
