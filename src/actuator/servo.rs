use crate::error::AppError;
use std::time::Duration;

/// Standard hobby-servo frame period.
pub const SERVO_PERIOD: Duration = Duration::from_millis(20);

pub trait ServoDriver: Send {
    fn set_angle(&mut self, angle: i32) -> Result<(), AppError>;

    /// Stop driving the output.
    fn release(&mut self) -> Result<(), AppError> {
        Ok(())
    }
}

/// Linear angle to pulse-width mapping across the servo's travel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PulseMap {
    pub min_angle: i32,
    pub max_angle: i32,
    pub min_pulse: Duration,
    pub max_pulse: Duration,
}

impl PulseMap {
    /// Pulse width for `angle`, clamped to the servo's travel.
    pub fn pulse_for(&self, angle: i32) -> Duration {
        let span = i64::from(self.max_angle) - i64::from(self.min_angle);
        if span <= 0 {
            return self.min_pulse;
        }
        let offset = i64::from(angle.clamp(self.min_angle, self.max_angle))
            - i64::from(self.min_angle);
        let min_us = self.min_pulse.as_micros() as i64;
        let max_us = self.max_pulse.as_micros() as i64;
        let pulse_us = min_us + (max_us - min_us) * offset / span;
        Duration::from_micros(pulse_us.max(0) as u64)
    }
}

/// Software-PWM servo on a Raspberry Pi GPIO pin.
#[cfg(target_os = "linux")]
pub struct RppalServo {
    pin: rppal::gpio::OutputPin,
    pulses: PulseMap,
}

#[cfg(target_os = "linux")]
impl RppalServo {
    pub fn new(gpio: &rppal::gpio::Gpio, pin: u8, pulses: PulseMap) -> Result<Self, AppError> {
        let pin = gpio
            .get(pin)
            .map_err(|err| AppError::Gpio(err.to_string()))?
            .into_output();
        Ok(Self { pin, pulses })
    }
}

#[cfg(target_os = "linux")]
impl ServoDriver for RppalServo {
    fn set_angle(&mut self, angle: i32) -> Result<(), AppError> {
        self.pin
            .set_pwm(SERVO_PERIOD, self.pulses.pulse_for(angle))
            .map_err(|err| AppError::Actuator(err.to_string()))
    }

    fn release(&mut self) -> Result<(), AppError> {
        self.pin
            .clear_pwm()
            .map_err(|err| AppError::Actuator(err.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map() -> PulseMap {
        PulseMap {
            min_angle: 0,
            max_angle: 270,
            min_pulse: Duration::from_micros(500),
            max_pulse: Duration::from_micros(2500),
        }
    }

    #[test]
    fn endpoints_map_to_pulse_limits() {
        assert_eq!(map().pulse_for(0), Duration::from_micros(500));
        assert_eq!(map().pulse_for(270), Duration::from_micros(2500));
        assert_eq!(map().pulse_for(135), Duration::from_micros(1500));
    }

    #[test]
    fn out_of_travel_angles_are_clamped() {
        assert_eq!(map().pulse_for(-30), Duration::from_micros(500));
        assert_eq!(map().pulse_for(400), Duration::from_micros(2500));
    }
}
