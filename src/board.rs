//! ESP32-C3 wiring: concrete bus and panel types, and the executor tasks that run the
//! activities over them.
//!
//! | Signal          | Pin    |
//! |-----------------|--------|
//! | I2C SDA / SCL   | 7 / 6  |
//! | SPI SCK / MOSI  | 4 / 5  |
//! | Panel CS / DC   | 10 / 1 |
//! | Panel reset     | 0      |
//! | Backlight       | 3      |

use embassy_embedded_hal::shared_bus::asynch::i2c::I2cDevice;
use embassy_net::Stack;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::mutex::Mutex;
use embedded_hal_bus::spi::{ExclusiveDevice, NoDelay};
use esp_hal::gpio::{Level, Output, OutputConfig};
use esp_hal::i2c::master::{Config as I2cConfig, I2c};
use esp_hal::peripherals::{GPIO0, GPIO1, GPIO3, GPIO4, GPIO5, GPIO6, GPIO7, GPIO10, I2C0, SPI2};
use esp_hal::spi::Mode;
use esp_hal::spi::master::{Config as SpiConfig, Spi};
use esp_hal::time::Rate;
use esp_hal::{Async, Blocking};
use mipidsi::interface::SpiInterface;
use mipidsi::models::ILI9341Rgb565;
use rand::rngs::SmallRng;
use static_cell::StaticCell;

use crate::config::CONFIG;
use crate::display::SceneDisplay;
use crate::sensors::{Pmsa003i, RangingError, Vl53l1x};
use crate::state::StateReader;
use crate::tasks::{
    AirQualityPoller, DistancePoller, MoodAnimator, PresenceMonitor, TelemetryPublisher,
};
use crate::telemetry::Topic;
use crate::telemetry::client::{MqttTelemetry, RecordBuffers, TLS_READ_LEN, TLS_WRITE_LEN};

pub type I2cBus = Mutex<CriticalSectionRawMutex, I2c<'static, Async>>;
pub type SharedI2c = I2cDevice<'static, CriticalSectionRawMutex, I2c<'static, Async>>;

type PanelSpi = ExclusiveDevice<Spi<'static, Blocking>, Output<'static>, NoDelay>;
pub type Panel =
    mipidsi::Display<SpiInterface<'static, PanelSpi, Output<'static>>, ILI9341Rgb565, Output<'static>>;
pub type BoardDisplay = SceneDisplay<Panel>;
pub type DisplayMutex = Mutex<CriticalSectionRawMutex, BoardDisplay>;

const I2C_FREQUENCY_KHZ: u32 = 100;
const SPI_FREQUENCY_MHZ: u32 = 40;

const MQTT_RX_LEN: usize = 256;
const MQTT_TX_LEN: usize = 512;

pub fn i2c_bus(i2c: I2C0<'static>, sda: GPIO7<'static>, scl: GPIO6<'static>) -> &'static I2cBus {
    static BUS: StaticCell<I2cBus> = StaticCell::new();

    let config = I2cConfig::default().with_frequency(Rate::from_khz(I2C_FREQUENCY_KHZ));
    let i2c = I2c::new(i2c, config)
        .expect("I2C config rejected")
        .with_sda(sda)
        .with_scl(scl)
        .into_async();
    BUS.init(Mutex::new(i2c))
}

pub fn particulate_sensor(bus: &'static I2cBus) -> Pmsa003i<SharedI2c> {
    Pmsa003i::new(I2cDevice::new(bus))
}

/// Boots and calibrates the ranging sensor, then starts continuous ranging.
pub async fn ranging_sensor(bus: &'static I2cBus) -> Result<Vl53l1x<SharedI2c>, RangingError> {
    let mut sensor = Vl53l1x::new(I2cDevice::new(bus));
    sensor.init().await?;
    sensor.set_distance_mode(CONFIG.ranging.distance_mode).await?;
    sensor.set_timing_budget(CONFIG.ranging.timing_budget_ms).await?;
    sensor.start_ranging().await?;
    Ok(sensor)
}

pub struct PanelPins {
    pub sck: GPIO4<'static>,
    pub mosi: GPIO5<'static>,
    pub cs: GPIO10<'static>,
    pub dc: GPIO1<'static>,
    pub reset: GPIO0<'static>,
    pub backlight: GPIO3<'static>,
}

/// Initializes the ILI9341 and switches the backlight on. The backlight pin stays driven for
/// the life of the program.
pub fn display(spi: SPI2<'static>, pins: PanelPins) -> &'static DisplayMutex {
    static SPI_BUFFER: StaticCell<[u8; 512]> = StaticCell::new();
    static BACKLIGHT: StaticCell<Output<'static>> = StaticCell::new();
    static DISPLAY: StaticCell<DisplayMutex> = StaticCell::new();

    let spi_config = SpiConfig::default()
        .with_frequency(Rate::from_mhz(SPI_FREQUENCY_MHZ))
        .with_mode(Mode::_0);
    let spi = Spi::new(spi, spi_config)
        .expect("SPI config rejected")
        .with_sck(pins.sck)
        .with_mosi(pins.mosi);

    let cs = Output::new(pins.cs, Level::High, OutputConfig::default());
    let dc = Output::new(pins.dc, Level::Low, OutputConfig::default());
    let reset = Output::new(pins.reset, Level::High, OutputConfig::default());

    let device = ExclusiveDevice::new_no_delay(spi, cs).expect("panel CS");
    let interface = SpiInterface::new(device, dc, SPI_BUFFER.init([0; 512]));
    let panel = mipidsi::Builder::new(ILI9341Rgb565, interface)
        .reset_pin(reset)
        .init(&mut embassy_time::Delay)
        .expect("panel init");

    BACKLIGHT.init(Output::new(pins.backlight, Level::High, OutputConfig::default()));

    DISPLAY.init(Mutex::new(SceneDisplay::new(panel)))
}

#[embassy_executor::task]
pub async fn distance_task(poller: DistancePoller<'static, Vl53l1x<SharedI2c>>) -> ! {
    poller.run().await
}

#[embassy_executor::task]
pub async fn presence_task(monitor: PresenceMonitor<'static>) -> ! {
    monitor.run().await
}

#[embassy_executor::task]
pub async fn air_quality_task(
    poller: AirQualityPoller<'static, Pmsa003i<SharedI2c>, BoardDisplay>,
) -> ! {
    poller.run().await
}

#[embassy_executor::task]
pub async fn mood_task(animator: MoodAnimator<'static, BoardDisplay, SmallRng>) -> ! {
    animator.run().await
}

#[embassy_executor::task]
pub async fn telemetry_task(stack: Stack<'static>, reader: StateReader<'static>, topic: Topic) -> ! {
    let mut rx = [0u8; MQTT_RX_LEN];
    let mut tx = [0u8; MQTT_TX_LEN];
    let mut tls_read = [0u8; TLS_READ_LEN];
    let mut tls_write = [0u8; TLS_WRITE_LEN];
    let mut publisher = TelemetryPublisher::new(reader, topic, &CONFIG.telemetry);
    loop {
        // One client per broker connection; the buffers outlive them all.
        let records = RecordBuffers {
            read: &mut tls_read,
            write: &mut tls_write,
        };
        let mut client = MqttTelemetry::new(stack, &mut rx, &mut tx, records, &CONFIG.mqtt);
        let e = publisher.serve(&mut client).await;
        debug!("telemetry: dropping broker connection after {}", e);
    }
}
