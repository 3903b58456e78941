//! Pump GPIO adapter.
//!
//! Implements [`PumpPort`].  The pump is a relay/MOSFET on a single GPIO;
//! high = pumping.  Initialization drives the pin low before any dosing
//! decision runs, so a reset mid-dose cannot leave liquid flowing.

use crate::app::ports::PumpPort;
use crate::error::SampleError;
use log::{info, warn};

pub struct GpioPump {
    /// Pin currently configured as an output, driven low at setup.
    active_pin: Option<u8>,
    on: bool,
}

impl GpioPump {
    pub fn new() -> Self {
        Self {
            active_pin: None,
            on: false,
        }
    }

    /// Configure `pin` as an output and drive it low.
    fn setup_pin(&mut self, pin: u8) -> Result<(), SampleError> {
        if self.active_pin == Some(pin) {
            return Ok(());
        }
        self.platform_setup(pin)?;
        self.active_pin = Some(pin);
        self.on = false;
        info!("pump: GPIO {pin} configured, output low");
        Ok(())
    }

    // ── Platform-specific ─────────────────────────────────────

    #[cfg(target_os = "espidf")]
    fn platform_setup(&mut self, pin: u8) -> Result<(), SampleError> {
        use esp_idf_svc::sys::*;
        // SAFETY: GPIO configuration on the pin the server assigned to us.
        unsafe {
            if gpio_reset_pin(i32::from(pin)) != ESP_OK
                || gpio_set_direction(i32::from(pin), gpio_mode_t_GPIO_MODE_OUTPUT) != ESP_OK
                || gpio_set_level(i32::from(pin), 0) != ESP_OK
            {
                return Err(SampleError::ReadFailed);
            }
        }
        Ok(())
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_setup(&mut self, _pin: u8) -> Result<(), SampleError> {
        Ok(())
    }

    #[cfg(target_os = "espidf")]
    fn platform_set(&mut self, pin: u8, high: bool) {
        // SAFETY: level write on a pin configured by platform_setup.
        unsafe {
            esp_idf_svc::sys::gpio_set_level(i32::from(pin), u32::from(high));
        }
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_set(&mut self, pin: u8, high: bool) {
        info!("pump(sim): GPIO {pin} -> {}", if high { "high" } else { "low" });
    }
}

impl Default for GpioPump {
    fn default() -> Self {
        Self::new()
    }
}

impl PumpPort for GpioPump {
    fn energize(&mut self, pin: u8) {
        if self.setup_pin(pin).is_err() {
            warn!("pump: GPIO {pin} setup failed, refusing to energize");
            return;
        }
        self.platform_set(pin, true);
        self.on = true;
    }

    fn release(&mut self, pin: u8) {
        // Force the level low even if setup never ran; releasing must
        // always be possible.
        if self.setup_pin(pin).is_err() {
            warn!("pump: GPIO {pin} setup failed during release");
        }
        self.platform_set(pin, false);
        self.on = false;
    }

    fn is_on(&self) -> bool {
        self.on
    }
}
