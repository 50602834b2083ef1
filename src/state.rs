//! Shared sensor state.
//!
//! One [`SensorState`] lives for the whole process. Every field is an atomic cell with exactly
//! one writing task; [`SensorState::split`] hands each owning task its writer and everyone
//! else a copyable [`StateReader`]. Tasks run on a single cooperative executor and a writer
//! never awaits between the stores of a multi-field update, so readers always observe a
//! complete reading.

use portable_atomic::{AtomicBool, AtomicU32, Ordering};
use static_cell::StaticCell;

/// One particulate sample: six bin counts (per 0.1 L) and three standard mass
/// concentrations (ug/m^3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ParticulateReading {
    pub pm03_count: u16,
    pub pm05_count: u16,
    pub pm10_count: u16,
    pub pm25_count: u16,
    pub pm50_count: u16,
    pub pm100_count: u16,
    pub pm1: u16,
    pub pm25: u16,
    pub pm10: u16,
}

impl ParticulateReading {
    /// Bin counts paired with their display labels, smallest particle first.
    pub fn labeled_counts(&self) -> [(&'static str, u16); 6] {
        [
            ("0.3um", self.pm03_count),
            ("0.5um", self.pm05_count),
            ("1.0um", self.pm10_count),
            ("2.5um", self.pm25_count),
            ("5.0um", self.pm50_count),
            ("10 um", self.pm100_count),
        ]
    }
}

const UNKNOWN: u32 = u32::MAX;

/// A `u16` reading that stays unknown until its writer stores the first sample.
struct Slot(AtomicU32);

impl Slot {
    const fn unknown() -> Self {
        Self(AtomicU32::new(UNKNOWN))
    }

    fn get(&self) -> Option<u16> {
        match self.0.load(Ordering::Acquire) {
            UNKNOWN => None,
            v => Some(v as u16),
        }
    }

    fn set(&self, value: u16) {
        self.0.store(u32::from(value), Ordering::Release);
    }
}

pub struct SensorState {
    pm03_count: Slot,
    pm05_count: Slot,
    pm10_count: Slot,
    pm25_count: Slot,
    pm50_count: Slot,
    pm100_count: Slot,
    pm1: Slot,
    pm25: Slot,
    pm10: Slot,
    distance_mm: Slot,
    previous_distance_mm: Slot,
    screen_active: AtomicBool,
}

impl Default for SensorState {
    fn default() -> Self {
        Self::new()
    }
}

impl SensorState {
    /// All readings unknown, screen active.
    pub const fn new() -> Self {
        Self {
            pm03_count: Slot::unknown(),
            pm05_count: Slot::unknown(),
            pm10_count: Slot::unknown(),
            pm25_count: Slot::unknown(),
            pm50_count: Slot::unknown(),
            pm100_count: Slot::unknown(),
            pm1: Slot::unknown(),
            pm25: Slot::unknown(),
            pm10: Slot::unknown(),
            distance_mm: Slot::unknown(),
            previous_distance_mm: Slot::unknown(),
            screen_active: AtomicBool::new(true),
        }
    }

    /// The process-wide instance. Panics if called twice.
    pub fn init_static() -> &'static mut Self {
        static SENSOR_STATE: StaticCell<SensorState> = StaticCell::new();
        SENSOR_STATE.init(Self::new())
    }

    /// Hands out the one writer per field group plus a shared reader.
    ///
    /// Requiring `&mut` means the writers can only exist once.
    pub fn split(&mut self) -> StateHandles<'_> {
        let state: &SensorState = self;
        StateHandles {
            reader: StateReader(state),
            distance: DistanceWriter(state),
            particulates: ParticulateWriter(state),
            presence: PresenceWriter(state),
        }
    }
}

pub struct StateHandles<'a> {
    pub reader: StateReader<'a>,
    pub distance: DistanceWriter<'a>,
    pub particulates: ParticulateWriter<'a>,
    pub presence: PresenceWriter<'a>,
}

/// Read-only view of the shared state.
#[derive(Clone, Copy)]
pub struct StateReader<'a>(&'a SensorState);

impl StateReader<'_> {
    /// Latest particulate reading, or `None` before the first successful read.
    pub fn particulates(&self) -> Option<ParticulateReading> {
        let s = self.0;
        Some(ParticulateReading {
            pm03_count: s.pm03_count.get()?,
            pm05_count: s.pm05_count.get()?,
            pm10_count: s.pm10_count.get()?,
            pm25_count: s.pm25_count.get()?,
            pm50_count: s.pm50_count.get()?,
            pm100_count: s.pm100_count.get()?,
            pm1: s.pm1.get()?,
            pm25: s.pm25.get()?,
            pm10: s.pm10.get()?,
        })
    }

    pub fn pm25(&self) -> Option<u16> {
        self.0.pm25.get()
    }

    pub fn distance_mm(&self) -> Option<u16> {
        self.0.distance_mm.get()
    }

    pub fn previous_distance_mm(&self) -> Option<u16> {
        self.0.previous_distance_mm.get()
    }

    pub fn screen_active(&self) -> bool {
        self.0.screen_active.load(Ordering::Acquire)
    }
}

/// Owned by the distance poller.
pub struct DistanceWriter<'a>(&'a SensorState);

impl DistanceWriter<'_> {
    pub fn store(&mut self, distance_mm: u16) {
        self.0.distance_mm.set(distance_mm);
    }
}

/// Owned by the air-quality poller.
pub struct ParticulateWriter<'a>(&'a SensorState);

impl ParticulateWriter<'_> {
    pub fn store(&mut self, reading: &ParticulateReading) {
        let s = self.0;
        s.pm03_count.set(reading.pm03_count);
        s.pm05_count.set(reading.pm05_count);
        s.pm10_count.set(reading.pm10_count);
        s.pm25_count.set(reading.pm25_count);
        s.pm50_count.set(reading.pm50_count);
        s.pm100_count.set(reading.pm100_count);
        s.pm1.set(reading.pm1);
        s.pm10.set(reading.pm10);
        // Last, so `pm25()` never runs ahead of the rest of the reading.
        s.pm25.set(reading.pm25);
    }
}

/// Owned by the presence/timeout monitor: previous distance and the screen flag.
pub struct PresenceWriter<'a>(&'a SensorState);

impl PresenceWriter<'_> {
    pub fn store_previous_distance(&mut self, distance_mm: u16) {
        self.0.previous_distance_mm.set(distance_mm);
    }

    pub fn set_screen_active(&mut self, active: bool) {
        self.0.screen_active.store(active, Ordering::Release);
    }
}
