use crate::actuator::servo::ServoDriver;
use crate::error::AppError;
use std::sync::{Arc, Mutex};

#[derive(Debug, Default)]
struct Recorded {
    angles: Vec<i32>,
    fail_after: Option<usize>,
    released: bool,
}

/// Servo that records every commanded angle. Clones share the record.
#[derive(Debug, Clone, Default)]
pub struct MockServo {
    inner: Arc<Mutex<Recorded>>,
}

impl MockServo {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail every command once `count` angles have been accepted.
    pub fn failing_after(count: usize) -> Self {
        let servo = Self::new();
        if let Ok(mut guard) = servo.inner.lock() {
            guard.fail_after = Some(count);
        }
        servo
    }

    pub fn angles(&self) -> Vec<i32> {
        self.inner
            .lock()
            .map(|guard| guard.angles.clone())
            .unwrap_or_default()
    }

    pub fn clear(&self) {
        if let Ok(mut guard) = self.inner.lock() {
            guard.angles.clear();
        }
    }

    pub fn released(&self) -> bool {
        self.inner.lock().map(|guard| guard.released).unwrap_or(false)
    }
}

impl ServoDriver for MockServo {
    fn set_angle(&mut self, angle: i32) -> Result<(), AppError> {
        let mut guard = self
            .inner
            .lock()
            .map_err(|_| AppError::Actuator("mock servo lock poisoned".to_string()))?;
        if guard.fail_after.is_some_and(|limit| guard.angles.len() >= limit) {
            return Err(AppError::Actuator("mock servo stalled".to_string()));
        }
        guard.angles.push(angle);
        Ok(())
    }

    fn release(&mut self) -> Result<(), AppError> {
        let mut guard = self
            .inner
            .lock()
            .map_err(|_| AppError::Actuator("mock servo lock poisoned".to_string()))?;
        guard.released = true;
        Ok(())
    }
}
