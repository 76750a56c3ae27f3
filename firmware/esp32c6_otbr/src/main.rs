//! ESP32-C6 OpenThread Border Router
//!
//! Standalone border router: the native 802.15.4 radio runs the Thread
//! network and the Wi-Fi station is the backbone. Settings are compiled in
//! from the `OTBR_*` environment variables.
//!
//! ## Build Instructions
//! ```bash
//! # Install ESP toolchain
//! cargo install espup ldproxy espflash
//! espup install
//! . $HOME/export-esp.sh
//!
//! # Build with credentials baked in
//! OTBR_DEVICE_NAME=otbr-garage OTBR_WIFI_SSID=home OTBR_WIFI_PASSWORD=secret \
//!     cargo build --release
//!
//! # Flash and open the OpenThread console
//! espflash flash --monitor target/riscv32imac-esp-espidf/release/esp32c6-otbr
//! ```

use esp_idf_svc::hal::delay::FreeRtos;
use esp_idf_svc::hal::prelude::Peripherals;
use esp_idf_svc::log::EspLogger;
use log::{error, info};
use otbr_node::{
    share, BorderRouter, Components, Config, EspBackbone, EspMdnsResponder, EspNvsStore,
    EspOpenThread, EspPlatform, Error, Result,
};
use std::sync::Arc;

fn run() -> Result<()> {
    let config = Config::compiled();

    let peripherals = Peripherals::take().map_err(|e| Error::platform(e.to_string()))?;

    // nothing is initialized here; start() brings up NVS, eventfd and Wi-Fi in order
    let store = share(EspNvsStore::new(&config.storage.path));
    let backbone = EspBackbone::new(peripherals.modem);

    let components = Components {
        store,
        backbone: Box::new(backbone),
        responder: Box::new(EspMdnsResponder::new()),
        platform: Arc::new(EspPlatform),
        stack: EspOpenThread::new(),
    };

    let mut router = BorderRouter::new(config, components)?;
    let mesh = router.start()?;

    // the main task has nothing left to do; ot_main runs until reboot
    let source = mesh.join()?;
    info!("Thread main loop finished ({} dataset)", source);
    Ok(())
}

/// Main entry point for the ESP32 application
fn main() {
    // Initialize ESP-IDF components
    esp_idf_svc::sys::link_patches();
    EspLogger::initialize_default();

    info!("otbr {}", otbr_node::VERSION);

    if let Err(e) = run() {
        error!("[{}] {}", e.code(), e);
        if e.is_fatal() {
            error!("Halting");
            loop {
                FreeRtos::delay_ms(1000);
            }
        }
        esp_idf_svc::hal::reset::restart();
    }
}
