use crate::button::{ButtonInput, Indicator};
use crate::error::AppError;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

const RELEASED: u8 = 0;
const PRESSED: u8 = 1;
const FAILING: u8 = 2;

/// Button whose level tests set from outside. Clones share the level.
#[derive(Debug, Clone, Default)]
pub struct MockButton {
    level: Arc<AtomicU8>,
}

impl MockButton {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn press(&self) {
        self.level.store(PRESSED, Ordering::SeqCst);
    }

    pub fn release(&self) {
        self.level.store(RELEASED, Ordering::SeqCst);
    }

    pub fn fail(&self) {
        self.level.store(FAILING, Ordering::SeqCst);
    }
}

impl ButtonInput for MockButton {
    fn is_pressed(&mut self) -> Result<bool, AppError> {
        match self.level.load(Ordering::SeqCst) {
            FAILING => Err(AppError::Gpio("mock button read failed".to_string())),
            level => Ok(level == PRESSED),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct MockLed {
    on: Arc<AtomicU8>,
}

impl MockLed {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_on(&self) -> bool {
        self.on.load(Ordering::SeqCst) == 1
    }
}

impl Indicator for MockLed {
    fn set(&mut self, on: bool) -> Result<(), AppError> {
        self.on.store(u8::from(on), Ordering::SeqCst);
        Ok(())
    }
}
