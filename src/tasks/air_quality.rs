use core::fmt::Write;

use embassy_time::Timer;
use heapless::String;

use crate::config::AirQualityConfig;
use crate::display::{Display, DisplayError, Field, SharedDisplay};
use crate::sensors::{ParticulateError, ParticulateSensor};
use crate::state::{ParticulateReading, ParticulateWriter};

pub const COUNTS_HEADER: &str = "Particle Counts per 0.1L:";

/// Largest counts text: six lines of `label: 65535`.
pub type CountsText = String<96>;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AirQualityError {
    Sensor(ParticulateError),
    Display(DisplayError),
}

/// Zero-padded to three digits; larger values keep all their digits.
pub fn format_pm25(pm25: u16) -> String<8> {
    let mut s = String::new();
    let _ = write!(s, "{:03}", pm25);
    s
}

pub fn format_counts(reading: &ParticulateReading) -> CountsText {
    let mut s = CountsText::new();
    for (i, (label, count)) in reading.labeled_counts().iter().enumerate() {
        if i > 0 {
            let _ = s.push('\n');
        }
        let _ = write!(s, "{}: {}", label, count);
    }
    s
}

fn show<D: Display>(display: &mut D, reading: &ParticulateReading) -> Result<(), DisplayError> {
    display.set_field(Field::Pm25Value, &format_pm25(reading.pm25))?;
    display.set_field(Field::CountsHeader, COUNTS_HEADER)?;
    display.set_field(Field::Counts, &format_counts(reading))?;
    display.flush()
}

pub struct AirQualityPoller<'a, S, D> {
    sensor: S,
    particulates: ParticulateWriter<'a>,
    display: SharedDisplay<'a, D>,
    config: AirQualityConfig,
}

impl<'a, S, D> AirQualityPoller<'a, S, D>
where
    S: ParticulateSensor,
    D: Display,
{
    pub fn new(
        sensor: S,
        particulates: ParticulateWriter<'a>,
        display: SharedDisplay<'a, D>,
        config: &AirQualityConfig,
    ) -> Self {
        Self {
            sensor,
            particulates,
            display,
            config: *config,
        }
    }

    /// One reading: store it, then push it to the display. A failed read touches nothing.
    pub async fn cycle(&mut self) -> Result<ParticulateReading, AirQualityError> {
        let reading = self.sensor.read().await.map_err(AirQualityError::Sensor)?;
        self.particulates.store(&reading);

        let mut display = self.display.lock().await;
        show(&mut *display, &reading).map_err(AirQualityError::Display)?;
        Ok(reading)
    }

    pub async fn run(mut self) -> ! {
        loop {
            match self.cycle().await {
                Ok(reading) => debug!("air: pm2.5 = {}", reading.pm25),
                Err(e) => warn!("air: skipped reading: {}", e),
            }
            Timer::after(self.config.poll_interval).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CONFIG;
    use crate::state::{SensorState, StateHandles};
    use crate::test_utils::{FakeParticulate, RecordingDisplay, sample_reading};
    use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
    use embassy_sync::mutex::Mutex;
    use proptest::prelude::*;

    #[test]
    fn pm25_is_zero_padded() {
        assert_eq!(format_pm25(9).as_str(), "009");
        assert_eq!(format_pm25(42).as_str(), "042");
        assert_eq!(format_pm25(0).as_str(), "000");
        assert_eq!(format_pm25(1234).as_str(), "1234");
    }

    #[test]
    fn counts_are_labelled_in_fixed_order() {
        assert_eq!(
            format_counts(&sample_reading()).as_str(),
            "0.3um: 5\n0.5um: 3\n1.0um: 2\n2.5um: 1\n5.0um: 0\n10 um: 0"
        );
    }

    #[test]
    fn largest_counts_fit() {
        let reading = ParticulateReading {
            pm03_count: u16::MAX,
            pm05_count: u16::MAX,
            pm10_count: u16::MAX,
            pm25_count: u16::MAX,
            pm50_count: u16::MAX,
            pm100_count: u16::MAX,
            ..Default::default()
        };
        assert!(format_counts(&reading).ends_with("10 um: 65535"));
    }

    #[futures_test::test]
    async fn successful_read_updates_state_and_flushes_once() {
        let mut state = SensorState::new();
        let StateHandles {
            reader,
            particulates,
            ..
        } = state.split();
        let display = Mutex::<CriticalSectionRawMutex, _>::new(RecordingDisplay::default());
        let sensor = FakeParticulate::new([Ok(sample_reading())]);
        let mut poller = AirQualityPoller::new(
            sensor,
            particulates,
            SharedDisplay::new(&display),
            &CONFIG.air_quality,
        );

        poller.cycle().await.unwrap();

        assert_eq!(reader.particulates(), Some(sample_reading()));
        let display = display.lock().await;
        assert_eq!(display.field(Field::Pm25Value), "009");
        assert_eq!(display.field(Field::CountsHeader), COUNTS_HEADER);
        assert!(display.field(Field::Counts).starts_with("0.3um: 5\n"));
        assert_eq!(display.flushes, 1);
    }

    #[futures_test::test]
    async fn failed_read_changes_nothing() {
        let mut state = SensorState::new();
        let StateHandles {
            reader,
            particulates,
            ..
        } = state.split();
        let display = Mutex::<CriticalSectionRawMutex, _>::new(RecordingDisplay::default());
        let sensor = FakeParticulate::new([Ok(sample_reading()), Err(ParticulateError::Checksum)]);
        let mut poller = AirQualityPoller::new(
            sensor,
            particulates,
            SharedDisplay::new(&display),
            &CONFIG.air_quality,
        );

        poller.cycle().await.unwrap();
        assert_eq!(
            poller.cycle().await,
            Err(AirQualityError::Sensor(ParticulateError::Checksum))
        );
        assert_eq!(reader.particulates(), Some(sample_reading()));
        assert_eq!(display.lock().await.flushes, 1);
    }

    #[futures_test::test]
    async fn display_fault_still_keeps_the_reading() {
        let mut state = SensorState::new();
        let StateHandles {
            reader,
            particulates,
            ..
        } = state.split();
        let display = Mutex::<CriticalSectionRawMutex, _>::new(RecordingDisplay::failing());
        let sensor = FakeParticulate::new([Ok(sample_reading())]);
        let mut poller = AirQualityPoller::new(
            sensor,
            particulates,
            SharedDisplay::new(&display),
            &CONFIG.air_quality,
        );

        assert_eq!(
            poller.cycle().await,
            Err(AirQualityError::Display(DisplayError::Bus))
        );
        assert_eq!(reader.pm25(), Some(9));
    }

    fn arb_reading() -> impl Strategy<Value = ParticulateReading> {
        prop::array::uniform9(any::<u16>()).prop_map(|w| ParticulateReading {
            pm03_count: w[0],
            pm05_count: w[1],
            pm10_count: w[2],
            pm25_count: w[3],
            pm50_count: w[4],
            pm100_count: w[5],
            pm1: w[6],
            pm25: w[7],
            pm10: w[8],
        })
    }

    fn arb_outcome() -> impl Strategy<Value = Result<ParticulateReading, ParticulateError>> {
        prop_oneof![
            arb_reading().prop_map(Ok),
            Just(Err(ParticulateError::Bus)),
            Just(Err(ParticulateError::Header)),
            Just(Err(ParticulateError::Checksum)),
        ]
    }

    proptest! {
        #[test]
        fn state_always_holds_the_last_good_reading(
            outcomes in prop::collection::vec(arb_outcome(), 1..24)
        ) {
            let mut state = SensorState::new();
            let StateHandles { reader, particulates, .. } = state.split();
            let display = Mutex::<CriticalSectionRawMutex, _>::new(RecordingDisplay::default());
            let mut poller = AirQualityPoller::new(
                FakeParticulate::new(outcomes.clone()),
                particulates,
                SharedDisplay::new(&display),
                &CONFIG.air_quality,
            );

            for _ in 0..outcomes.len() {
                let _ = embassy_futures::block_on(poller.cycle());
            }

            let last_good = outcomes.iter().rev().find_map(|o| o.ok());
            prop_assert_eq!(reader.particulates(), last_good);
        }
    }
}
