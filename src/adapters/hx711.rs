//! HX711 load-cell ADC driver.
//!
//! Implements [`ScaleDriverPort`].  The HX711 is a two-wire device: DOUT
//! goes low when a conversion is ready, then 24 bits are clocked out
//! MSB-first on SCK, plus one extra pulse to select channel A / gain 128
//! for the next conversion.
//!
//! ## cfg gating
//!
//! - **`target_os = "espidf"`**: bit-banged over raw GPIO with interrupts
//!   masked during the 24-bit burst (a >60 µs SCK high puts the chip into
//!   power-down).
//! - **all other targets**: scripted simulation backend.

use crate::app::ports::ScaleDriverPort;
use crate::error::SampleError;
use log::info;

/// Poll interval while waiting for DOUT to go low.
#[cfg(target_os = "espidf")]
const READY_POLL_INTERVAL_MS: u32 = 1;

pub struct Hx711Driver {
    signal_pin: u8,
    clock_pin: u8,
    initialized: bool,
    #[cfg(not(target_os = "espidf"))]
    sim_raw: i32,
}

impl Hx711Driver {
    /// Create an unbound driver.  [`ScaleDriverPort::reinit`] binds it to
    /// pins once calibration is known.
    pub fn new() -> Self {
        Self {
            signal_pin: 0,
            clock_pin: 0,
            initialized: false,
            #[cfg(not(target_os = "espidf"))]
            sim_raw: 0,
        }
    }

    pub fn pins(&self) -> (u8, u8) {
        (self.signal_pin, self.clock_pin)
    }

    /// Simulation only: the raw count every sample returns.
    #[cfg(not(target_os = "espidf"))]
    pub fn sim_set_raw(&mut self, raw: i32) {
        self.sim_raw = raw;
    }

    // ── Platform-specific ─────────────────────────────────────

    #[cfg(target_os = "espidf")]
    fn platform_init(&mut self) -> Result<(), SampleError> {
        use esp_idf_svc::sys::*;

        // SAFETY: plain GPIO matrix configuration on pins this driver owns.
        unsafe {
            if gpio_reset_pin(i32::from(self.signal_pin)) != ESP_OK
                || gpio_reset_pin(i32::from(self.clock_pin)) != ESP_OK
            {
                return Err(SampleError::ReadFailed);
            }
            if gpio_set_direction(i32::from(self.signal_pin), gpio_mode_t_GPIO_MODE_INPUT)
                != ESP_OK
                || gpio_set_direction(i32::from(self.clock_pin), gpio_mode_t_GPIO_MODE_OUTPUT)
                    != ESP_OK
            {
                return Err(SampleError::ReadFailed);
            }
            // SCK low = converter running.
            if gpio_set_level(i32::from(self.clock_pin), 0) != ESP_OK {
                return Err(SampleError::ReadFailed);
            }
        }
        Ok(())
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_init(&mut self) -> Result<(), SampleError> {
        Ok(())
    }

    #[cfg(target_os = "espidf")]
    fn platform_read(&mut self, timeout_ms: u32) -> Result<i32, SampleError> {
        use esp_idf_svc::sys::*;

        let dout = i32::from(self.signal_pin);
        let sck = i32::from(self.clock_pin);

        // Wait for data-ready (DOUT low).
        let mut waited: u32 = 0;
        // SAFETY: level reads/writes on pins configured in platform_init.
        unsafe {
            while gpio_get_level(dout) != 0 {
                if waited >= timeout_ms {
                    return Err(SampleError::Timeout);
                }
                esp_idf_hal::delay::FreeRtos::delay_ms(READY_POLL_INTERVAL_MS);
                waited += READY_POLL_INTERVAL_MS;
            }

            // The 25-pulse burst must not be stretched: >60 µs of SCK high
            // resets the chip into power-down.
            let mut raw: u32 = 0;
            esp_idf_hal::interrupt::free(|| {
                for _ in 0..24 {
                    gpio_set_level(sck, 1);
                    esp_rom_delay_us(1);
                    raw = (raw << 1) | (gpio_get_level(dout) as u32);
                    gpio_set_level(sck, 0);
                    esp_rom_delay_us(1);
                }
                // 25th pulse: channel A, gain 128.
                gpio_set_level(sck, 1);
                esp_rom_delay_us(1);
                gpio_set_level(sck, 0);
            });

            // Sign-extend the 24-bit two's-complement value.
            if raw & 0x0080_0000 != 0 {
                raw |= 0xFF00_0000;
            }
            Ok(raw as i32)
        }
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_read(&mut self, _timeout_ms: u32) -> Result<i32, SampleError> {
        Ok(self.sim_raw)
    }
}

impl Default for Hx711Driver {
    fn default() -> Self {
        Self::new()
    }
}

impl ScaleDriverPort for Hx711Driver {
    fn read_sample(&mut self, timeout_ms: u32) -> Result<i32, SampleError> {
        if !self.initialized {
            return Err(SampleError::ReadFailed);
        }
        self.platform_read(timeout_ms)
    }

    fn reinit(&mut self, signal_pin: u8, clock_pin: u8) -> Result<(), SampleError> {
        self.signal_pin = signal_pin;
        self.clock_pin = clock_pin;
        self.platform_init()?;
        self.initialized = true;
        info!("hx711: bound to DT={signal_pin} SCK={clock_pin}");
        Ok(())
    }
}
