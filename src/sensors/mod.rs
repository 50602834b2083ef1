pub mod pmsa003i;
pub mod vl53l1x;

use crate::state::ParticulateReading;

pub use pmsa003i::Pmsa003i;
pub use vl53l1x::Vl53l1x;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ParticulateError {
    Bus,
    Header,
    FrameLen,
    Checksum,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RangingError {
    Bus,
    /// Model id, module type and mask revision did not identify a VL53L1X.
    WrongDevice,
    /// Sample was flagged ready but the range status was not "valid".
    InvalidRange(u8),
    /// No sample became ready during boot calibration.
    BootTimeout,
    UnsupportedTimingBudget(u16),
}

/// Particulate counter that delivers one full reading per call.
#[allow(async_fn_in_trait)]
pub trait ParticulateSensor {
    async fn read(&mut self) -> Result<ParticulateReading, ParticulateError>;
}

/// Ranging sensor with a "sample ready" latch.
#[allow(async_fn_in_trait)]
pub trait RangingSensor {
    /// Non-blocking check whether a new sample is latched.
    async fn sample_ready(&mut self) -> Result<bool, RangingError>;
    /// Latched distance in millimetres.
    async fn read_distance(&mut self) -> Result<u16, RangingError>;
    /// Re-arms the latch so the next sample can be detected.
    async fn clear_latch(&mut self) -> Result<(), RangingError>;
}
