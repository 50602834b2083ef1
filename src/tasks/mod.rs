//! The five cooperative activities.
//!
//! Each is a struct owning its collaborators and state handles, with a single-step method the
//! tests drive directly and a `run` loop that never returns.

pub mod air_quality;
pub mod distance;
pub mod mood;
pub mod presence;
pub mod telemetry;

use embassy_time::{Duration, Timer};

pub use air_quality::AirQualityPoller;
pub use distance::DistancePoller;
pub use mood::MoodAnimator;
pub use presence::PresenceMonitor;
pub use telemetry::TelemetryPublisher;

/// Sleeps for `duration`. A zero duration still yields once so other tasks get to run.
pub(crate) async fn pause(duration: Duration) {
    if duration.as_ticks() == 0 {
        embassy_futures::yield_now().await;
    } else {
        Timer::after(duration).await;
    }
}
