//! Remote telemetry endpoint.

#[cfg(feature = "firmware")]
pub mod client;
pub mod mqtt;

use core::fmt::Write;

use heapless::String;

use mqtt::MqttError;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TelemetryError {
    /// Broker hostname did not resolve.
    Dns,
    /// TCP connect failed.
    Connect,
    /// TLS handshake with the broker failed.
    Tls,
    /// Socket read/write failed or the peer closed.
    Io,
    /// CONNACK carried a non-zero return code.
    Refused(u8),
    /// Unexpected packet from the broker.
    Protocol,
    /// The packet could not be built (buffer or field too large).
    Encode,
}

impl From<MqttError> for TelemetryError {
    fn from(_: MqttError) -> Self {
        TelemetryError::Encode
    }
}

#[allow(async_fn_in_trait)]
pub trait Telemetry {
    /// Opens (or verifies) the broker connection.
    async fn ensure_connected(&mut self) -> Result<(), TelemetryError>;
    async fn publish(&mut self, topic: &str, value: u16) -> Result<(), TelemetryError>;
}

pub type Topic = String<64>;

/// Topic of the form `<username><feed>`, e.g. `alice/feeds/pm25`.
pub fn topic(username: &str, feed: &str) -> Result<Topic, TelemetryError> {
    let mut topic = Topic::new();
    topic.push_str(username).map_err(|_| TelemetryError::Encode)?;
    topic.push_str(feed).map_err(|_| TelemetryError::Encode)?;
    Ok(topic)
}

/// Decimal text, the payload form the broker dashboards expect.
pub fn payload(value: u16) -> String<5> {
    let mut s = String::new();
    // u16::MAX is five digits
    let _ = write!(s, "{}", value);
    s
}
