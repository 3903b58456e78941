//! ESP-IDF entry point.

use autobar::adapters::http::HttpClientAdapter;
use autobar::adapters::hx711::Hx711Driver;
use autobar::adapters::nvs::NvsStorage;
use autobar::adapters::ota::{self, OtaUpdater};
use autobar::adapters::portal::ProvisioningPortal;
use autobar::adapters::pump_pin::GpioPump;
use autobar::adapters::time::SystemClock;
use autobar::adapters::wifi::WifiAdapter;
use autobar::app::orchestrator::Orchestrator;
use autobar::app::store::DeviceStore;
use autobar::config::FIRMWARE_VERSION;
use autobar::protocol::client::DeviceClient;
use log::info;

fn main() -> anyhow::Result<()> {
    esp_idf_svc::sys::link_patches();
    esp_idf_logger::init()?;

    info!("AutoBar firmware {FIRMWARE_VERSION} starting");

    // We made it this far, so a freshly flashed image is not boot-looping.
    ota::mark_running_firmware_valid();

    let storage = NvsStorage::new().map_err(|e| anyhow::anyhow!("NVS init failed: {e}"))?;
    let mut store = DeviceStore::new(storage);

    let clock = SystemClock::new();
    let mut network = WifiAdapter::new();
    let mut driver = Hx711Driver::new();
    let mut pump = GpioPump::new();
    let mut ota = OtaUpdater::new();
    let exchange =
        HttpClientAdapter::new().map_err(|e| anyhow::anyhow!("TLS setup failed: {e}"))?;
    let mut client = DeviceClient::new(exchange);

    let mut orchestrator = Orchestrator::new();
    loop {
        orchestrator.run_until_portal(
            &mut client,
            &mut store,
            &clock,
            &mut network,
            &mut ota,
            &mut driver,
            &mut pump,
        );
        // Only reachable when provisioning is missing or enrollment was
        // rejected; the portal restarts the device after a submission.
        ProvisioningPortal::new().run(&mut store);
    }
}
