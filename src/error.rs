use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("invalid I2C address: {0:#04x}")]
    InvalidAddress(u8),
    #[error("address allocation exceeds 7-bit I2C range")]
    AddressAllocationOverflow,
    #[error("sensor error: {0}")]
    Sensor(String),
    #[error("xshut error: {0}")]
    Xshut(String),
    #[error("actuator error: {0}")]
    Actuator(String),
    #[error("motion already in flight on bay {0}")]
    MotionInFlight(usize),
    #[error("classifier unavailable: {0}")]
    Classifier(String),
    #[error("gpio error: {0}")]
    Gpio(String),
    #[error("i2c error: {0}")]
    I2c(String),
    #[error("state lock poisoned")]
    StateLock,
}
