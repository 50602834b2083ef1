//! Configuration constants for the PM monitor firmware.
//!
//! This module centralizes all configuration values that are set via
//! environment variables at compile time or hardcoded constants.

use embassy_time::Duration;

use crate::sensors::vl53l1x::DistanceMode;

/// WiFi power saving mode, mirrored here so the config stays buildable on the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerSave {
    None,
    Minimum,
    Maximum,
}

/// WiFi configuration settings.
#[derive(Debug, Clone, Copy)]
pub struct WifiConfig {
    /// WiFi SSID to connect to.
    pub ssid: Option<&'static str>,
    /// WiFi password for authentication.
    pub password: Option<&'static str>,
    /// Whether to log nearby access points before joining.
    pub scan: bool,
    /// Power saving mode for WiFi.
    pub power_save_mode: PowerSave,
    /// How long boot may wait for a DHCP lease before the device gives up.
    pub join_timeout: Duration,
    /// Delay between a failed join and the software reset.
    pub reset_delay: Duration,
}

/// MQTT broker settings.
#[derive(Debug, Clone, Copy)]
pub struct MqttConfig {
    /// Broker hostname, resolved over DNS.
    pub broker: &'static str,
    pub port: u16,
    /// TLS to the broker. Plain TCP only when `MQTT_TLS=false`.
    pub tls: bool,
    pub username: &'static str,
    /// Broker password (the Adafruit IO key).
    pub key: &'static str,
    /// Appended to `username` to form the publish topic.
    pub feed: &'static str,
    pub keep_alive: Duration,
}

/// Distance poller settings.
#[derive(Debug, Clone, Copy)]
pub struct RangingConfig {
    pub poll_interval: Duration,
    /// VL53L1X timing budget in milliseconds.
    pub timing_budget_ms: u16,
    pub distance_mode: DistanceMode,
}

/// Presence/timeout monitor settings.
#[derive(Debug, Clone, Copy)]
pub struct PresenceConfig {
    pub poll_interval: Duration,
    /// Screen turns off once this long has passed without an approach.
    pub timeout: Duration,
    /// Distance must drop by more than this between two observations to count as an approach.
    pub approach_threshold_mm: u16,
}

/// Air-quality poller settings.
#[derive(Debug, Clone, Copy)]
pub struct AirQualityConfig {
    pub poll_interval: Duration,
}

/// Mood animator settings.
#[derive(Debug, Clone, Copy)]
pub struct MoodConfig {
    /// Upper bound (exclusive) of the random hold between frames.
    pub max_hold: Duration,
    /// Re-check interval while the screen is timed out.
    pub hidden_interval: Duration,
}

/// Telemetry publisher settings.
#[derive(Debug, Clone, Copy)]
pub struct TelemetryConfig {
    pub publish_interval: Duration,
}

/// Global application configuration.
#[derive(Debug, Clone, Copy)]
pub struct Config {
    /// WiFi configuration.
    pub wifi: WifiConfig,
    pub mqtt: MqttConfig,
    pub ranging: RangingConfig,
    pub presence: PresenceConfig,
    pub air_quality: AirQualityConfig,
    pub mood: MoodConfig,
    pub telemetry: TelemetryConfig,
    /// Whether to print heap and network status in the main loop.
    pub print_status_loop: bool,
}

impl Config {
    /// Creates a new configuration from compile-time environment variables.
    const fn new() -> Self {
        let mqtt_tls = parse_tls(option_env!("MQTT_TLS"));
        Self {
            wifi: WifiConfig {
                ssid: option_env!("WIFI_SSID"),
                password: option_env!("WIFI_PASSWORD"),
                scan: opt_eq(option_env!("WIFI_SCAN"), "true"),
                power_save_mode: match option_env!("WIFI_POWER_SAVE_MODE") {
                    Some(v) if str_eq(v, "0") => PowerSave::None,
                    Some(v) if str_eq(v, "1") => PowerSave::Minimum,
                    Some(v) if str_eq(v, "2") => PowerSave::Maximum,
                    Some(_) => panic!("Invalid WIFI_POWER_SAVE_MODE value"),
                    None => PowerSave::Minimum,
                },
                join_timeout: Duration::from_secs(60),
                reset_delay: Duration::from_secs(15),
            },
            mqtt: MqttConfig {
                broker: or_default(option_env!("MQTT_BROKER"), "io.adafruit.com"),
                port: match option_env!("MQTT_PORT") {
                    Some(port) => parse_port(port),
                    None => default_port(mqtt_tls),
                },
                tls: mqtt_tls,
                username: or_default(option_env!("MQTT_USERNAME"), ""),
                key: or_default(option_env!("MQTT_KEY"), ""),
                feed: or_default(option_env!("MQTT_FEED"), "/feeds/pm25"),
                keep_alive: Duration::from_secs(60),
            },
            ranging: RangingConfig {
                poll_interval: Duration::from_millis(200),
                timing_budget_ms: 200,
                distance_mode: DistanceMode::Long,
            },
            presence: PresenceConfig {
                poll_interval: Duration::from_millis(200),
                timeout: Duration::from_secs(30),
                approach_threshold_mm: 30,
            },
            air_quality: AirQualityConfig {
                poll_interval: Duration::from_secs(1),
            },
            mood: MoodConfig {
                max_hold: Duration::from_secs(3),
                hidden_interval: Duration::from_millis(250),
            },
            telemetry: TelemetryConfig {
                publish_interval: Duration::from_secs(30),
            },
            print_status_loop: opt_eq(option_env!("PRINT_STATUS_LOOP"), "true"),
        }
    }
}

const fn or_default(value: Option<&'static str>, default: &'static str) -> &'static str {
    match value {
        Some(v) => v,
        None => default,
    }
}

/// `str` equality usable in const context.
const fn str_eq(a: &str, b: &str) -> bool {
    let (a, b) = (a.as_bytes(), b.as_bytes());
    if a.len() != b.len() {
        return false;
    }
    let mut i = 0;
    while i < a.len() {
        if a[i] != b[i] {
            return false;
        }
        i += 1;
    }
    true
}

const fn opt_eq(value: Option<&str>, expected: &str) -> bool {
    match value {
        Some(v) => str_eq(v, expected),
        None => false,
    }
}

const fn parse_tls(value: Option<&str>) -> bool {
    match value {
        None => true,
        Some(v) if str_eq(v, "true") || str_eq(v, "1") => true,
        Some(v) if str_eq(v, "false") || str_eq(v, "0") => false,
        Some(_) => panic!("Invalid MQTT_TLS value"),
    }
}

/// MQTT over TLS listens on 8883, plain MQTT on 1883.
const fn default_port(tls: bool) -> u16 {
    if tls { 8883 } else { 1883 }
}

const fn parse_port(s: &str) -> u16 {
    let bytes = s.as_bytes();
    if bytes.is_empty() {
        panic!("Invalid MQTT_PORT value");
    }
    let mut port: u32 = 0;
    let mut i = 0;
    while i < bytes.len() {
        let b = bytes[i];
        if !b.is_ascii_digit() {
            panic!("Invalid MQTT_PORT value");
        }
        port = port * 10 + (b - b'0') as u32;
        if port > u16::MAX as u32 {
            panic!("Invalid MQTT_PORT value");
        }
        i += 1;
    }
    port as u16
}

/// Global configuration instance.
pub static CONFIG: Config = Config::new();
