use core::ops::RangeInclusive;

use embassy_time::Duration;
use rand::Rng;

use super::pause;
use crate::config::MoodConfig;
use crate::display::{Display, DisplayError, SharedDisplay};
use crate::state::StateReader;

/// Four consecutive face frames for one PM2.5 range.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Band {
    pub first: u8,
    /// Choosing this frame skips the hold, so the face blinks and immediately re-rolls.
    pub emphasis: u8,
}

impl Band {
    pub fn frames(&self) -> RangeInclusive<u8> {
        self.first..=self.first + 3
    }
}

/// Maps PM2.5 (ug/m^3) to its band. Every value falls in exactly one band.
pub fn band_for(pm25: u16) -> Band {
    let (first, emphasis) = match pm25 {
        0..3 => (0, 3),
        3..7 => (4, 7),
        // Emphasis outside the band's own frames: this band never blinks.
        7..13 => (8, 1),
        13..51 => (12, 15),
        _ => (16, 19),
    };
    Band { first, emphasis }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum MoodStep {
    /// Screen timed out; the scene was hidden.
    Hidden,
    /// Shown, but there is no PM2.5 reading to pick a face for yet.
    Waiting,
    Frame { index: u8, blink: bool },
}

pub struct MoodAnimator<'a, D, R> {
    reader: StateReader<'a>,
    display: SharedDisplay<'a, D>,
    rng: R,
    config: MoodConfig,
}

impl<'a, D, R> MoodAnimator<'a, D, R>
where
    D: Display,
    R: Rng,
{
    pub fn new(
        reader: StateReader<'a>,
        display: SharedDisplay<'a, D>,
        rng: R,
        config: &MoodConfig,
    ) -> Self {
        Self {
            reader,
            display,
            rng,
            config: *config,
        }
    }

    pub async fn cycle(&mut self) -> Result<MoodStep, DisplayError> {
        let mut display = self.display.lock().await;

        if !self.reader.screen_active() {
            display.set_layer_visible(false);
            display.flush()?;
            return Ok(MoodStep::Hidden);
        }

        display.set_layer_visible(true);
        let step = match self.reader.pm25() {
            None => MoodStep::Waiting,
            Some(pm25) => {
                let band = band_for(pm25);
                let index = self.rng.random_range(band.frames());
                display.set_sprite_index(index)?;
                MoodStep::Frame {
                    index,
                    blink: index == band.emphasis,
                }
            }
        };
        display.flush()?;
        Ok(step)
    }

    /// How long to wait after a cycle that ended with `outcome`.
    pub fn hold_after(&mut self, outcome: &Result<MoodStep, DisplayError>) -> Duration {
        match outcome {
            Ok(MoodStep::Hidden) => self.config.hidden_interval,
            Ok(MoodStep::Frame { blink: true, .. }) => Duration::from_ticks(0),
            _ => self.random_hold(),
        }
    }

    fn random_hold(&mut self) -> Duration {
        let max = self.config.max_hold.as_micros();
        if max == 0 {
            return Duration::from_ticks(0);
        }
        Duration::from_micros(self.rng.random_range(0..max))
    }

    pub async fn run(mut self) -> ! {
        loop {
            let outcome = self.cycle().await;
            if let Err(e) = &outcome {
                warn!("mood: display update failed: {}", e);
            }
            let hold = self.hold_after(&outcome);
            pause(hold).await;
        }
    }
}
