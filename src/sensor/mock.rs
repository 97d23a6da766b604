use crate::error::AppError;
use crate::sensor::{DistanceMeasurement, SensorDriver, SensorDriverFactory, SensorRangeStatus};
use std::sync::{Arc, Mutex};

/// Which bring-up step a mock sensor should fail on, if any.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MockFailure {
    #[default]
    None,
    Create,
    Init,
    SetAddress,
    Verify,
}

/// Proximity sensor whose reading can be changed while a bay owns it.
/// Clones share the same reading.
#[derive(Debug, Clone)]
pub struct MockProximity {
    reading: Arc<Mutex<Option<DistanceMeasurement>>>,
    failure: MockFailure,
}

impl MockProximity {
    pub fn new(distance_mm: u16) -> Self {
        Self {
            reading: Arc::new(Mutex::new(Some(DistanceMeasurement {
                distance_mm,
                range_status: SensorRangeStatus::Valid,
            }))),
            failure: MockFailure::None,
        }
    }

    pub fn failing_at(failure: MockFailure) -> Self {
        Self {
            failure,
            ..Self::new(0)
        }
    }

    pub fn set_distance(&self, distance_mm: u16) {
        self.set(Some(DistanceMeasurement {
            distance_mm,
            range_status: SensorRangeStatus::Valid,
        }));
    }

    pub fn set_status(&self, distance_mm: u16, range_status: SensorRangeStatus) {
        self.set(Some(DistanceMeasurement {
            distance_mm,
            range_status,
        }));
    }

    /// Make subsequent reads fail.
    pub fn disconnect(&self) {
        self.set(None);
    }

    fn set(&self, reading: Option<DistanceMeasurement>) {
        if let Ok(mut guard) = self.reading.lock() {
            *guard = reading;
        }
    }

    fn step(&self, step: MockFailure, what: &str) -> Result<(), AppError> {
        if self.failure == step {
            Err(AppError::Sensor(format!("mock {what} failed")))
        } else {
            Ok(())
        }
    }
}

impl SensorDriver for MockProximity {
    fn init_default(&mut self) -> Result<(), AppError> {
        self.step(MockFailure::Init, "init")
    }

    fn set_address(&mut self, _new_address: u8) -> Result<(), AppError> {
        self.step(MockFailure::SetAddress, "set address")
    }

    fn verify(&mut self) -> Result<(), AppError> {
        self.step(MockFailure::Verify, "verify")
    }

    fn start_ranging(&mut self) -> Result<(), AppError> {
        Ok(())
    }

    fn read_distance(&mut self) -> Result<DistanceMeasurement, AppError> {
        let guard = self
            .reading
            .lock()
            .map_err(|_| AppError::Sensor("mock reading lock poisoned".to_string()))?;
        (*guard).ok_or_else(|| AppError::Sensor("mock read distance failed".to_string()))
    }
}

/// Hands out the given sensors in order, then healthy defaults.
pub struct MockSensorFactory {
    sensors: Vec<MockProximity>,
    next_index: usize,
}

impl MockSensorFactory {
    pub fn new(sensors: Vec<MockProximity>) -> Self {
        Self {
            sensors,
            next_index: 0,
        }
    }
}

impl SensorDriverFactory for MockSensorFactory {
    type Driver = MockProximity;

    fn create_default(&mut self) -> Result<Self::Driver, AppError> {
        let sensor = self
            .sensors
            .get(self.next_index)
            .cloned()
            .unwrap_or_else(|| MockProximity::new(0));
        self.next_index += 1;
        sensor.step(MockFailure::Create, "create")?;
        Ok(sensor)
    }

    fn create_for_address(&mut self, _address: u8) -> Result<Self::Driver, AppError> {
        self.create_default()
    }
}
