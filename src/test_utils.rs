//! Scripted collaborators for host tests.

use std::collections::VecDeque;
use std::string::{String, ToString};
use std::vec::Vec;

use crate::display::{Display, DisplayError, Field};
use crate::sensors::{ParticulateError, ParticulateSensor, RangingError, RangingSensor};
use crate::state::ParticulateReading;
use crate::telemetry::{Telemetry, TelemetryError};

/// The reading used throughout the tests: counts 5/3/2/1/0/0, PM 8/9/10.
pub fn sample_reading() -> ParticulateReading {
    ParticulateReading {
        pm03_count: 5,
        pm05_count: 3,
        pm10_count: 2,
        pm25_count: 1,
        pm50_count: 0,
        pm100_count: 0,
        pm1: 8,
        pm25: 9,
        pm10: 10,
    }
}

pub enum RangingStep {
    NotReady,
    /// The ready check itself fails.
    BusFault,
    /// A sample is latched; reading it yields this.
    Sample(Result<u16, RangingError>),
}

pub struct FakeRanging {
    steps: VecDeque<RangingStep>,
    latched: Option<Result<u16, RangingError>>,
    pub cleared: usize,
    /// Every `clear_latch` fails with a bus error.
    pub fail_clear: bool,
}

impl FakeRanging {
    pub fn new(steps: impl IntoIterator<Item = RangingStep>) -> Self {
        Self {
            steps: steps.into_iter().collect(),
            latched: None,
            cleared: 0,
            fail_clear: false,
        }
    }
}

impl RangingSensor for FakeRanging {
    async fn sample_ready(&mut self) -> Result<bool, RangingError> {
        match self.steps.pop_front().unwrap_or(RangingStep::NotReady) {
            RangingStep::NotReady => Ok(false),
            RangingStep::BusFault => Err(RangingError::Bus),
            RangingStep::Sample(sample) => {
                self.latched = Some(sample);
                Ok(true)
            }
        }
    }

    async fn read_distance(&mut self) -> Result<u16, RangingError> {
        self.latched.ok_or(RangingError::Bus)?
    }

    async fn clear_latch(&mut self) -> Result<(), RangingError> {
        if self.fail_clear {
            return Err(RangingError::Bus);
        }
        self.latched = None;
        self.cleared += 1;
        Ok(())
    }
}

pub struct FakeParticulate {
    outcomes: VecDeque<Result<ParticulateReading, ParticulateError>>,
}

impl FakeParticulate {
    pub fn new(
        outcomes: impl IntoIterator<Item = Result<ParticulateReading, ParticulateError>>,
    ) -> Self {
        Self {
            outcomes: outcomes.into_iter().collect(),
        }
    }
}

impl ParticulateSensor for FakeParticulate {
    async fn read(&mut self) -> Result<ParticulateReading, ParticulateError> {
        self.outcomes
            .pop_front()
            .unwrap_or(Err(ParticulateError::Bus))
    }
}

/// Records the last value of every mutation. `flushes` counts flush calls that succeeded.
pub struct RecordingDisplay {
    fields: [String; 3],
    pub sprite: Option<u8>,
    pub visible: bool,
    pub flushes: usize,
    fail_flush: bool,
}

impl Default for RecordingDisplay {
    fn default() -> Self {
        Self {
            fields: Default::default(),
            sprite: None,
            visible: true,
            flushes: 0,
            fail_flush: false,
        }
    }
}

impl RecordingDisplay {
    pub fn failing() -> Self {
        Self {
            fail_flush: true,
            ..Default::default()
        }
    }

    pub fn field(&self, field: Field) -> &str {
        &self.fields[field as usize]
    }
}

impl Display for RecordingDisplay {
    fn set_field(&mut self, field: Field, text: &str) -> Result<(), DisplayError> {
        self.fields[field as usize] = text.to_string();
        Ok(())
    }

    fn set_sprite_index(&mut self, index: u8) -> Result<(), DisplayError> {
        self.sprite = Some(index);
        Ok(())
    }

    fn set_layer_visible(&mut self, visible: bool) {
        self.visible = visible;
    }

    fn flush(&mut self) -> Result<(), DisplayError> {
        if self.fail_flush {
            return Err(DisplayError::Bus);
        }
        self.flushes += 1;
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingTelemetry {
    pub connects: usize,
    pub attempts: usize,
    pub published: Vec<(String, u16)>,
    pub connect_error: Option<TelemetryError>,
    pub publish_error: Option<TelemetryError>,
}

impl Telemetry for RecordingTelemetry {
    async fn ensure_connected(&mut self) -> Result<(), TelemetryError> {
        self.connects += 1;
        self.connect_error.map_or(Ok(()), Err)
    }

    async fn publish(&mut self, topic: &str, value: u16) -> Result<(), TelemetryError> {
        self.attempts += 1;
        if let Some(e) = self.publish_error {
            return Err(e);
        }
        self.published.push((topic.to_string(), value));
        Ok(())
    }
}

/// In-memory byte stream: replies are read from a script, writes are captured.
pub struct FakeLink {
    incoming: VecDeque<u8>,
    pub sent: Vec<u8>,
    broken: bool,
}

impl FakeLink {
    pub fn replying(bytes: &[u8]) -> Self {
        Self {
            incoming: bytes.iter().copied().collect(),
            sent: Vec::new(),
            broken: false,
        }
    }

    /// Every write fails.
    pub fn broken() -> Self {
        Self {
            broken: true,
            ..Self::replying(&[])
        }
    }
}

#[derive(Debug)]
pub struct LinkError;

impl core::fmt::Display for LinkError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str("link broken")
    }
}

impl core::error::Error for LinkError {}

impl embedded_io::Error for LinkError {
    fn kind(&self) -> embedded_io::ErrorKind {
        embedded_io::ErrorKind::BrokenPipe
    }
}

impl embedded_io_async::ErrorType for FakeLink {
    type Error = LinkError;
}

impl embedded_io_async::Read for FakeLink {
    async fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        let n = buf.len().min(self.incoming.len());
        for (slot, byte) in buf.iter_mut().zip(self.incoming.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }
}

impl embedded_io_async::Write for FakeLink {
    async fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        if self.broken {
            return Err(LinkError);
        }
        self.sent.extend_from_slice(buf);
        Ok(buf.len())
    }

    async fn flush(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}
