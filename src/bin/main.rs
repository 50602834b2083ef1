#![no_std]
#![no_main]
#![feature(type_alias_impl_trait)]
#![feature(impl_trait_in_assoc_type)]
#![deny(
    clippy::mem_forget,
    reason = "mem::forget is generally not safe to do with esp_hal types, especially those \
    holding buffers for the duration of a data transfer."
)]

use embassy_executor::Spawner;
use embassy_time::{Duration, Instant, Timer};
use esp_backtrace as _; // Register the panic handler.
use esp_hal::clock::CpuClock;
use esp_hal::rng::Rng;
use esp_hal::timer::timg::TimerGroup;
use esp_println as _; // Register the defmt UART global logger.
use rand::SeedableRng;
use rand::rngs::SmallRng;
use static_cell::StaticCell;

use pm_monitor as lib;
use lib::board;
use lib::config::CONFIG;
use lib::display::SharedDisplay;
use lib::state::{SensorState, StateHandles};
use lib::tasks::{AirQualityPoller, DistancePoller, MoodAnimator, PresenceMonitor};

// This creates a default app-descriptor required by the esp-idf bootloader.
esp_bootloader_esp_idf::esp_app_desc!();

/// Logs, waits `reset_delay`, then restarts the chip.
async fn fatal_reset(reason: &str) -> ! {
    defmt::error!(
        "{}; resetting in {}s",
        reason,
        CONFIG.wifi.reset_delay.as_secs()
    );
    Timer::after(CONFIG.wifi.reset_delay).await;
    esp_hal::system::software_reset()
}

#[esp_rtos::main]
async fn main(spawner: Spawner) -> ! {
    defmt::info!("Init...");

    let reset_reason = esp_hal::system::reset_reason();
    defmt::info!("Reset reason: {:?}", defmt::Debug2Format(&reset_reason));

    let config = esp_hal::Config::default().with_cpu_clock(CpuClock::max());
    let peripherals = esp_hal::init(config);

    // Reclaim internal memory reserved from startup.
    esp_alloc::heap_allocator!(#[esp_hal::ram(reclaimed)] size: 64 * 1024);
    // The radio driver is the only heap user.
    esp_alloc::heap_allocator!(size: 32 * 1024);

    let timg0 = TimerGroup::new(peripherals.TIMG0);
    let sw_int =
        esp_hal::interrupt::software::SoftwareInterruptControl::new(peripherals.SW_INTERRUPT);
    esp_rtos::start(timg0.timer0, sw_int.software_interrupt0);
    defmt::info!("RTOS scheduler initialized");

    // Panel first, so the screen is lit while Wi-Fi joins.
    let display = board::display(
        peripherals.SPI2,
        board::PanelPins {
            sck: peripherals.GPIO4,
            mosi: peripherals.GPIO5,
            cs: peripherals.GPIO10,
            dc: peripherals.GPIO1,
            reset: peripherals.GPIO0,
            backlight: peripherals.GPIO3,
        },
    );

    static RADIO: StaticCell<esp_radio::Controller<'static>> = StaticCell::new();
    let radio_init =
        RADIO.init(esp_radio::init().expect("Failed to initialize Wi-Fi/BLE controller"));

    let rng = Rng::new();
    let seed = rng.random() as u64 | ((rng.random() as u64) << 32);
    let stack = match lib::wifi::start_wifi(radio_init, peripherals.WIFI, rng, &spawner).await {
        Ok(stack) => stack,
        Err(e) => {
            defmt::error!("wifi: {}", e);
            fatal_reset("could not join Wi-Fi").await
        }
    };

    let i2c = board::i2c_bus(peripherals.I2C0, peripherals.GPIO7, peripherals.GPIO6);
    let ranging = match board::ranging_sensor(i2c).await {
        Ok(sensor) => sensor,
        Err(e) => {
            defmt::error!("ranging: init failed: {}", e);
            fatal_reset("ranging sensor missing").await
        }
    };
    let particulates = board::particulate_sensor(i2c);

    let state = SensorState::init_static();
    let StateHandles {
        reader,
        distance,
        particulates: particulate_writer,
        presence,
    } = state.split();

    let shared_display: SharedDisplay<'static, board::BoardDisplay> = SharedDisplay::new(display);

    spawner.must_spawn(board::distance_task(DistancePoller::new(
        ranging,
        distance,
        &CONFIG.ranging,
    )));
    spawner.must_spawn(board::presence_task(PresenceMonitor::new(
        reader,
        presence,
        &CONFIG.presence,
        Instant::now(),
    )));
    spawner.must_spawn(board::air_quality_task(AirQualityPoller::new(
        particulates,
        particulate_writer,
        shared_display,
        &CONFIG.air_quality,
    )));
    spawner.must_spawn(board::mood_task(MoodAnimator::new(
        reader,
        shared_display,
        SmallRng::seed_from_u64(seed),
        &CONFIG.mood,
    )));
    match lib::telemetry::topic(CONFIG.mqtt.username, CONFIG.mqtt.feed) {
        Ok(topic) => spawner.must_spawn(board::telemetry_task(stack, reader, topic)),
        Err(e) => defmt::error!("telemetry: disabled, bad topic: {}", e),
    }
    defmt::info!("All tasks started");

    loop {
        if CONFIG.print_status_loop {
            let uptime = Instant::now().as_secs();
            let stats = esp_alloc::HEAP.stats();

            defmt::info!(
                "[{}s] Link: {} | IP: {} | Heap: {}/{} ({} free)",
                uptime,
                stack.is_link_up(),
                stack.config_v4().map(|c| c.address).is_some(),
                stats.current_usage,
                stats.size,
                stats.size - stats.current_usage
            );
        }

        Timer::after(Duration::from_secs(1)).await;
    }
}
