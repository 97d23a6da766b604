//! Bring-up of several VL53L1X sensors sharing one I2C bus: every sensor
//! boots at the same default address, so they are released one at a time via
//! XSHUT and moved to a unique address before the next one wakes.

use crate::error::AppError;
use crate::sensor::{
    ADDRESS_BASE_7BIT, DEFAULT_I2C_ADDRESS_7BIT, I2C_7BIT_MAX, SensorConfig, SensorDriver,
    SensorDriverFactory, SensorInfo, SensorStatus,
};
use tracing::{debug, info, warn};

pub trait XshutController {
    fn set_all_low(&mut self) -> Result<(), AppError>;
    fn set_high(&mut self, pin: u8) -> Result<(), AppError>;
}

/// Sensor wiring with the address it will be moved to.
#[derive(Debug, Clone)]
pub struct AddressedSensor {
    pub bay: usize,
    pub xshut_pin: u8,
    pub i2c_address: u8,
}

/// Allocate deterministic 7-bit I2C addresses using a base + offset strategy.
pub fn allocate_addresses(
    base_address: u8,
    sensors: &[SensorConfig],
) -> Result<Vec<AddressedSensor>, AppError> {
    if base_address > I2C_7BIT_MAX {
        return Err(AppError::InvalidAddress(base_address));
    }

    sensors
        .iter()
        .enumerate()
        .map(|(offset, sensor)| {
            let address = u8::try_from(offset)
                .ok()
                .and_then(|offset| base_address.checked_add(offset))
                .filter(|address| *address <= I2C_7BIT_MAX)
                .ok_or(AppError::AddressAllocationOverflow)?;
            Ok(AddressedSensor {
                bay: sensor.bay,
                xshut_pin: sensor.xshut_pin,
                i2c_address: address,
            })
        })
        .collect()
}

/// Wake each bay's sensor in turn and readdress it. A sensor that fails any
/// step is reported with an error status; the others still come up.
pub fn discover_bay_sensors<X, F>(
    xshut: &mut X,
    factory: &mut F,
    sensors: &[SensorConfig],
) -> Result<Vec<SensorInfo>, AppError>
where
    X: XshutController,
    F: SensorDriverFactory,
{
    let addressed = allocate_addresses(ADDRESS_BASE_7BIT, sensors)?;
    xshut.set_all_low()?;
    info!(
        count = addressed.len(),
        default_address = format_args!("{DEFAULT_I2C_ADDRESS_7BIT:#04x}"),
        "Starting presence sensor bring-up"
    );

    let mut results = Vec::with_capacity(addressed.len());
    for sensor in addressed {
        xshut.set_high(sensor.xshut_pin)?;
        // Allow sensor boot time after XSHUT release (2ms per VL53L1X datasheet)
        std::thread::sleep(std::time::Duration::from_millis(2));
        debug!(bay = sensor.bay, xshut_pin = sensor.xshut_pin, "Sensor XSHUT enabled");

        let status = match bring_up(factory, &sensor) {
            Ok(()) => SensorStatus::Ready,
            Err(err) => {
                warn!(
                    bay = sensor.bay,
                    address = format_args!("{:#04x}", sensor.i2c_address),
                    error = %err,
                    "Presence sensor bring-up failed"
                );
                SensorStatus::Error {
                    message: err.to_string(),
                }
            }
        };

        results.push(SensorInfo {
            bay: sensor.bay,
            xshut_pin: sensor.xshut_pin,
            i2c_address: sensor.i2c_address,
            status,
        });
    }

    Ok(results)
}

fn bring_up<F: SensorDriverFactory>(
    factory: &mut F,
    sensor: &AddressedSensor,
) -> Result<(), AppError> {
    let mut driver = factory.create_default()?;
    driver.init_default()?;
    driver.set_address(sensor.i2c_address)?;
    driver.verify()?;
    driver.start_ranging()
}

#[cfg(target_os = "linux")]
pub struct RppalXshutController {
    pins: std::collections::HashMap<u8, rppal::gpio::OutputPin>,
}

#[cfg(target_os = "linux")]
impl RppalXshutController {
    pub fn new(gpio: &rppal::gpio::Gpio, pins: &[u8]) -> Result<Self, AppError> {
        let mut map = std::collections::HashMap::new();
        for pin in pins {
            let output = gpio
                .get(*pin)
                .map_err(|err| AppError::Gpio(err.to_string()))?
                .into_output();
            map.insert(*pin, output);
        }
        Ok(Self { pins: map })
    }
}

#[cfg(target_os = "linux")]
impl XshutController for RppalXshutController {
    fn set_all_low(&mut self) -> Result<(), AppError> {
        for pin in self.pins.values_mut() {
            pin.set_low();
        }
        Ok(())
    }

    fn set_high(&mut self, pin: u8) -> Result<(), AppError> {
        let output = self
            .pins
            .get_mut(&pin)
            .ok_or_else(|| AppError::Xshut(format!("missing XSHUT pin {pin}")))?;
        output.set_high();
        Ok(())
    }
}
