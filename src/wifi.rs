use embassy_executor::Spawner;
use embassy_net::{DhcpConfig, Runner, Stack, StackResources};
use embassy_time::{Duration, Timer, with_timeout};
use esp_hal::rng::Rng;
use esp_radio::wifi::{
    ClientConfig, ModeConfig, PowerSaveMode, ScanConfig, WifiController, WifiDevice, WifiEvent,
    WifiStaState,
};
use static_cell::StaticCell;

use crate::config::{CONFIG, PowerSave};

// DHCP, DNS and the MQTT socket.
const STACK_RESOURCES_SIZE: usize = 4;

const RETRY_DELAY: Duration = Duration::from_millis(5000);

#[derive(Debug, Copy, Clone, PartialEq, Eq, defmt::Format)]
pub enum WifiError {
    /// The radio driver refused to create the station interface.
    Init,
    /// No link and DHCP lease within the configured join timeout.
    JoinTimeout,
}

fn power_save_mode(mode: PowerSave) -> PowerSaveMode {
    match mode {
        PowerSave::None => PowerSaveMode::None,
        PowerSave::Minimum => PowerSaveMode::Minimum,
        PowerSave::Maximum => PowerSaveMode::Maximum,
    }
}

/// Keeps the station associated: waits for a disconnect, then reconnects, forever.
#[embassy_executor::task]
async fn connection(mut controller: WifiController<'static>) {
    let ssid = CONFIG.wifi.ssid.unwrap_or("");
    let password = CONFIG.wifi.password.unwrap_or("");

    if ssid.is_empty() {
        warn!("wifi: WIFI_SSID env var not specified!");
    }

    loop {
        if esp_radio::wifi::sta_state() == WifiStaState::Connected {
            controller.wait_for_event(WifiEvent::StaDisconnected).await;
            warn!("wifi: disconnected");
            Timer::after(RETRY_DELAY).await;
        }
        if !matches!(controller.is_started(), Ok(true)) {
            let mut client_config = ClientConfig::default().with_ssid(ssid.into());
            if !password.is_empty() {
                client_config = client_config.with_password(password.into());
            }

            if let Err(e) = controller.set_config(&ModeConfig::Client(client_config)) {
                error!("wifi: bad client config: {}", defmt::Debug2Format(&e));
                Timer::after(RETRY_DELAY).await;
                continue;
            }
            info!("wifi: starting");
            if let Err(e) = controller.start_async().await {
                error!("wifi: start failed: {}", defmt::Debug2Format(&e));
                Timer::after(RETRY_DELAY).await;
                continue;
            }

            if CONFIG.wifi.scan {
                let scan_config = ScanConfig::default().with_max(10);
                match controller.scan_with_config_async(scan_config).await {
                    Ok(aps) => {
                        for ap in aps {
                            info!("wifi: found AP: {}", defmt::Debug2Format(&ap));
                        }
                    }
                    Err(e) => warn!("wifi: scan failed: {}", defmt::Debug2Format(&e)),
                }
            }
        }

        info!("wifi: connecting to {}", ssid);
        match controller.connect_async().await {
            Ok(_) => info!("wifi: connected"),
            Err(e) => {
                warn!("wifi: failed to connect: {}", defmt::Debug2Format(&e));
                Timer::after(RETRY_DELAY).await
            }
        }
    }
}

#[embassy_executor::task]
async fn net_task(mut runner: Runner<'static, WifiDevice<'static>>) {
    runner.run().await
}

/// Brings up the station and waits for a DHCP lease, at most `join_timeout`.
///
/// The supervising tasks are spawned before waiting, so on timeout they keep trying in the
/// background; the caller decides whether to give up.
pub async fn start_wifi(
    radio_init: &'static esp_radio::Controller<'static>,
    wifi: esp_hal::peripherals::WIFI<'static>,
    rng: Rng,
    spawner: &Spawner,
) -> Result<Stack<'static>, WifiError> {
    static RESOURCES: StaticCell<StackResources<STACK_RESOURCES_SIZE>> = StaticCell::new();

    let wifi_config = esp_radio::wifi::Config::default()
        .with_power_save_mode(power_save_mode(CONFIG.wifi.power_save_mode));

    let (controller, interfaces) =
        esp_radio::wifi::new(radio_init, wifi, wifi_config).map_err(|_| WifiError::Init)?;

    let net_seed = rng.random() as u64 | ((rng.random() as u64) << 32);
    let net_config = embassy_net::Config::dhcpv4(DhcpConfig::default());

    let (stack, runner) = embassy_net::new(
        interfaces.sta,
        net_config,
        RESOURCES.init(StackResources::new()),
        net_seed,
    );

    spawner.must_spawn(connection(controller));
    spawner.must_spawn(net_task(runner));

    info!("wifi: waiting for link and DHCP lease");
    with_timeout(CONFIG.wifi.join_timeout, async {
        stack.wait_link_up().await;
        stack.wait_config_up().await;
    })
    .await
    .map_err(|_| WifiError::JoinTimeout)?;

    if let Some(config) = stack.config_v4() {
        info!("wifi: got IP {}", defmt::Display2Format(&config.address));
    }

    Ok(stack)
}
