#[cfg(target_os = "linux")]
use crate::button::{ButtonInput, Indicator};
#[cfg(target_os = "linux")]
use crate::error::AppError;
#[cfg(target_os = "linux")]
use rppal::gpio::{Gpio, InputPin, OutputPin};

/// Active-low momentary switch using the internal pull-up.
#[cfg(target_os = "linux")]
pub struct GpioButton {
    pin: InputPin,
}

#[cfg(target_os = "linux")]
impl GpioButton {
    pub fn new(gpio: &Gpio, pin: u8) -> Result<Self, AppError> {
        let pin = gpio
            .get(pin)
            .map_err(|err| AppError::Gpio(err.to_string()))?
            .into_input_pullup();
        Ok(Self { pin })
    }
}

#[cfg(target_os = "linux")]
impl ButtonInput for GpioButton {
    fn is_pressed(&mut self) -> Result<bool, AppError> {
        Ok(self.pin.is_low())
    }
}

#[cfg(target_os = "linux")]
pub struct GpioLed {
    pin: OutputPin,
}

#[cfg(target_os = "linux")]
impl GpioLed {
    pub fn new(gpio: &Gpio, pin: u8) -> Result<Self, AppError> {
        let pin = gpio
            .get(pin)
            .map_err(|err| AppError::Gpio(err.to_string()))?
            .into_output_low();
        Ok(Self { pin })
    }
}

#[cfg(target_os = "linux")]
impl Indicator for GpioLed {
    fn set(&mut self, on: bool) -> Result<(), AppError> {
        if on {
            self.pin.set_high();
        } else {
            self.pin.set_low();
        }
        Ok(())
    }
}
