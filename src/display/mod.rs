//! Display collaborator.
//!
//! Mutations are buffered; nothing reaches the panel until [`Display::flush`]. The display is
//! shared by the air-quality poller (text fields) and the mood animator (sprite and
//! visibility), so it sits behind an async mutex that neither holder keeps across an await.

pub mod face;
pub mod scene;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::mutex::{Mutex, MutexGuard};

pub use scene::SceneDisplay;

/// Number of face frames: five moods, four variants each.
pub const SPRITE_COUNT: u8 = 20;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DisplayError {
    /// The panel rejected a draw.
    Bus,
    /// Text longer than the field can hold.
    TextOverflow,
    SpriteOutOfRange(u8),
}

/// Text fields the air-quality poller writes.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Field {
    /// Large PM2.5 number next to the title.
    Pm25Value,
    /// Caption above the bin counts.
    CountsHeader,
    /// Multi-line bin counts.
    Counts,
}

pub trait Display {
    fn set_field(&mut self, field: Field, text: &str) -> Result<(), DisplayError>;
    fn set_sprite_index(&mut self, index: u8) -> Result<(), DisplayError>;
    /// Shows or hides the whole scene.
    fn set_layer_visible(&mut self, visible: bool);
    /// Pushes every buffered change to the panel.
    fn flush(&mut self) -> Result<(), DisplayError>;
}

pub struct SharedDisplay<'a, D>(&'a Mutex<CriticalSectionRawMutex, D>);

impl<'a, D: Display> SharedDisplay<'a, D> {
    pub fn new(display: &'a Mutex<CriticalSectionRawMutex, D>) -> Self {
        Self(display)
    }

    pub async fn lock(&self) -> MutexGuard<'a, CriticalSectionRawMutex, D> {
        self.0.lock().await
    }
}

impl<D> Clone for SharedDisplay<'_, D> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<D> Copy for SharedDisplay<'_, D> {}
