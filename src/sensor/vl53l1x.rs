use crate::error::AppError;
use crate::sensor::{DistanceMeasurement, SensorDriver, SensorDriverFactory};

#[cfg(target_os = "linux")]
use crate::sensor::{DEFAULT_I2C_ADDRESS_7BIT, SensorRangeStatus};
#[cfg(target_os = "linux")]
use rppal::i2c::I2c;
#[cfg(target_os = "linux")]
use std::collections::HashMap;
#[cfg(target_os = "linux")]
use std::sync::{Arc, Mutex};
#[cfg(target_os = "linux")]
use vl53l1x_uld::{IOVoltage, RangeStatus as Vl53l1xRangeStatus, VL53L1X};

#[cfg(target_os = "linux")]
type Device = VL53L1X<I2c>;

#[cfg(target_os = "linux")]
fn sensor_error(err: impl std::fmt::Debug) -> AppError {
    AppError::Sensor(format!("{err:?}"))
}

/// Creates VL53L1X handles. Handles for an assigned address are cached so a
/// bay and the discovery pass share one bus connection per sensor.
#[cfg(target_os = "linux")]
pub struct Vl53l1xFactory {
    io_voltage: IOVoltage,
    cache: HashMap<u8, Arc<Mutex<Device>>>,
}

#[cfg(target_os = "linux")]
impl Vl53l1xFactory {
    pub fn new(io_voltage: IOVoltage) -> Self {
        Self {
            io_voltage,
            cache: HashMap::new(),
        }
    }
}

#[cfg(target_os = "linux")]
impl Default for Vl53l1xFactory {
    fn default() -> Self {
        Self::new(IOVoltage::Volt2_8)
    }
}

#[cfg(target_os = "linux")]
enum Vl53l1xInner {
    Owned(Device),
    Shared(Arc<Mutex<Device>>),
}

#[cfg(target_os = "linux")]
pub struct Vl53l1xDriver {
    inner: Vl53l1xInner,
    io_voltage: IOVoltage,
}

#[cfg(target_os = "linux")]
impl Vl53l1xDriver {
    fn with_device<T>(
        &mut self,
        op: impl FnOnce(&mut Device) -> Result<T, AppError>,
    ) -> Result<T, AppError> {
        match &mut self.inner {
            Vl53l1xInner::Owned(device) => op(device),
            Vl53l1xInner::Shared(device) => {
                let mut guard = device
                    .lock()
                    .map_err(|_| AppError::Sensor("sensor driver lock poisoned".to_string()))?;
                op(&mut *guard)
            }
        }
    }
}

#[cfg(target_os = "linux")]
impl SensorDriver for Vl53l1xDriver {
    fn init_default(&mut self) -> Result<(), AppError> {
        let io_voltage = self.io_voltage;
        self.with_device(|device| device.init(io_voltage).map_err(sensor_error))
    }

    fn set_address(&mut self, new_address: u8) -> Result<(), AppError> {
        self.with_device(|device| device.set_address(new_address).map_err(sensor_error))
    }

    fn verify(&mut self) -> Result<(), AppError> {
        self.with_device(|device| device.get_sensor_id().map(|_| ()).map_err(sensor_error))
    }

    fn start_ranging(&mut self) -> Result<(), AppError> {
        self.with_device(|device| device.start_ranging().map_err(sensor_error))
    }

    fn read_distance(&mut self) -> Result<DistanceMeasurement, AppError> {
        self.with_device(|device| {
            let result = device.get_result().map_err(sensor_error)?;
            // Clear interrupt to trigger next measurement
            device
                .clear_interrupt()
                .map_err(|err| AppError::Sensor(format!("clear_interrupt: {err:?}")))?;
            Ok(DistanceMeasurement {
                distance_mm: result.distance_mm,
                range_status: SensorRangeStatus::from(result.status),
            })
        })
    }
}

#[cfg(target_os = "linux")]
impl SensorDriverFactory for Vl53l1xFactory {
    type Driver = Vl53l1xDriver;

    fn create_default(&mut self) -> Result<Self::Driver, AppError> {
        let i2c = I2c::new().map_err(|err| AppError::I2c(err.to_string()))?;
        Ok(Vl53l1xDriver {
            inner: Vl53l1xInner::Owned(VL53L1X::new(i2c, DEFAULT_I2C_ADDRESS_7BIT)),
            io_voltage: self.io_voltage,
        })
    }

    fn create_for_address(&mut self, address: u8) -> Result<Self::Driver, AppError> {
        let shared = match self.cache.get(&address) {
            Some(shared) => shared.clone(),
            None => {
                let i2c = I2c::new().map_err(|err| AppError::I2c(err.to_string()))?;
                let shared = Arc::new(Mutex::new(VL53L1X::new(i2c, address)));
                self.cache.insert(address, shared.clone());
                shared
            }
        };
        Ok(Vl53l1xDriver {
            inner: Vl53l1xInner::Shared(shared),
            io_voltage: self.io_voltage,
        })
    }
}

#[cfg(target_os = "linux")]
impl From<Vl53l1xRangeStatus> for SensorRangeStatus {
    fn from(status: Vl53l1xRangeStatus) -> Self {
        match status {
            Vl53l1xRangeStatus::Valid => Self::Valid,
            Vl53l1xRangeStatus::SigmaFailure => Self::SigmaFailure,
            Vl53l1xRangeStatus::SignalFailure => Self::SignalFailure,
            Vl53l1xRangeStatus::MinRangeClipped => Self::MinRangeClipped,
            Vl53l1xRangeStatus::OutOfBounds => Self::OutOfBounds,
            Vl53l1xRangeStatus::HardwareFailure => Self::HardwareFailure,
            Vl53l1xRangeStatus::WrapCheckFail => Self::WrapCheckFail,
            Vl53l1xRangeStatus::Wraparound => Self::Wraparound,
            Vl53l1xRangeStatus::ProcessingFailure => Self::ProcessingFailure,
            Vl53l1xRangeStatus::CrosstalkSignal => Self::CrosstalkSignal,
            Vl53l1xRangeStatus::Synchronisation => Self::Synchronisation,
            Vl53l1xRangeStatus::MergedPulse => Self::MergedPulse,
            Vl53l1xRangeStatus::LackOfSignal => Self::LackOfSignal,
            Vl53l1xRangeStatus::MinRangeFail => Self::MinRangeFail,
            Vl53l1xRangeStatus::InvalidRange => Self::InvalidRange,
            Vl53l1xRangeStatus::None => Self::None,
        }
    }
}

#[cfg(not(target_os = "linux"))]
const UNSUPPORTED: &str = "VL53L1X driver requires Linux/Raspberry Pi";

#[cfg(not(target_os = "linux"))]
#[derive(Default)]
pub struct Vl53l1xFactory;

#[cfg(not(target_os = "linux"))]
pub struct Vl53l1xDriver;

#[cfg(not(target_os = "linux"))]
impl SensorDriver for Vl53l1xDriver {
    fn init_default(&mut self) -> Result<(), AppError> {
        Err(AppError::Sensor(UNSUPPORTED.to_string()))
    }

    fn set_address(&mut self, _new_address: u8) -> Result<(), AppError> {
        Err(AppError::Sensor(UNSUPPORTED.to_string()))
    }

    fn verify(&mut self) -> Result<(), AppError> {
        Err(AppError::Sensor(UNSUPPORTED.to_string()))
    }

    fn start_ranging(&mut self) -> Result<(), AppError> {
        Err(AppError::Sensor(UNSUPPORTED.to_string()))
    }

    fn read_distance(&mut self) -> Result<DistanceMeasurement, AppError> {
        Err(AppError::Sensor(UNSUPPORTED.to_string()))
    }
}

#[cfg(not(target_os = "linux"))]
impl SensorDriverFactory for Vl53l1xFactory {
    type Driver = Vl53l1xDriver;

    fn create_default(&mut self) -> Result<Self::Driver, AppError> {
        Err(AppError::Sensor(UNSUPPORTED.to_string()))
    }

    fn create_for_address(&mut self, _address: u8) -> Result<Self::Driver, AppError> {
        Err(AppError::Sensor(UNSUPPORTED.to_string()))
    }
}
