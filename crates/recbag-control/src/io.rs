/// Digital I/O capability: active-high levels on BCM-numbered pins.
///
/// Opening is the backend's constructor; `close` releases the pins and
/// must leave every output low.
pub trait DigitalIo {
    fn read(&mut self, pin: u8) -> bool;
    fn write(&mut self, pin: u8, level: bool);
    fn close(&mut self) {}
}

#[cfg(feature = "rpi")]
mod rpi {
    use super::DigitalIo;
    use crate::{config::Pins, ControlError, Result};
    use log::warn;
    use rppal::gpio::{Gpio, InputPin, OutputPin};

    /// Raspberry Pi GPIO through `/dev/gpiomem`.
    pub struct RppalIo {
        pins: Pins,
        button: Option<InputPin>,
        led: Option<OutputPin>,
    }

    impl RppalIo {
        pub fn open(pins: Pins) -> Result<Self> {
            let gpio = Gpio::new().map_err(|e| ControlError::Gpio(e.to_string()))?;
            let button = gpio
                .get(pins.button)
                .map_err(|e| ControlError::Gpio(format!("button pin {}: {e}", pins.button)))?
                .into_input();
            let led = gpio
                .get(pins.led)
                .map_err(|e| ControlError::Gpio(format!("led pin {}: {e}", pins.led)))?
                .into_output_low();
            Ok(Self {
                pins,
                button: Some(button),
                led: Some(led),
            })
        }
    }

    impl DigitalIo for RppalIo {
        fn read(&mut self, pin: u8) -> bool {
            match &self.button {
                Some(button) if pin == self.pins.button => button.is_high(),
                _ => {
                    warn!("read from unconfigured pin {pin}");
                    false
                }
            }
        }

        fn write(&mut self, pin: u8, level: bool) {
            match &mut self.led {
                Some(led) if pin == self.pins.led => {
                    if level {
                        led.set_high()
                    } else {
                        led.set_low()
                    }
                }
                _ => warn!("write to unconfigured pin {pin}"),
            }
        }

        fn close(&mut self) {
            if let Some(mut led) = self.led.take() {
                led.set_low();
            }
            self.button = None;
        }
    }

    impl Drop for RppalIo {
        fn drop(&mut self) {
            self.close();
        }
    }
}

#[cfg(feature = "rpi")]
pub use rpi::RppalIo;
