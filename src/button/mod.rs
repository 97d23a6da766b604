//! Manual override: a momentary button debounced into a latched on/off
//! flag, mirrored on an indicator LED.

use crate::error::AppError;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

pub mod gpio;
pub mod mock;

pub trait ButtonInput: Send {
    fn is_pressed(&mut self) -> Result<bool, AppError>;
}

pub trait Indicator: Send {
    fn set(&mut self, on: bool) -> Result<(), AppError>;
}

/// How repeated presses are suppressed after a toggle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ButtonPolicy {
    /// Locked after each toggle until `set_clickable(true)`.
    ClickLock,
    /// Presses ignored for a fixed time after each toggle.
    Cooldown(Duration),
}

pub struct ManualOverride {
    bay: usize,
    input: Box<dyn ButtonInput>,
    indicator: Box<dyn Indicator>,
    policy: ButtonPolicy,
    turned_on: bool,
    clickable: bool,
    was_pressed: bool,
    last_toggle_at: Option<Instant>,
}

impl ManualOverride {
    pub fn new(
        bay: usize,
        input: Box<dyn ButtonInput>,
        mut indicator: Box<dyn Indicator>,
        policy: ButtonPolicy,
    ) -> Self {
        if let Err(err) = indicator.set(false) {
            warn!(bay, error = %err, "Failed to reset manual override indicator");
        }
        Self {
            bay,
            input,
            indicator,
            policy,
            turned_on: false,
            clickable: true,
            was_pressed: false,
            last_toggle_at: None,
        }
    }

    /// Current flag without polling the button.
    pub fn turned_on(&self) -> bool {
        self.turned_on
    }

    pub fn is_clickable(&self) -> bool {
        self.clickable
    }

    /// Poll the button and return the flag. Only the press edge counts, so a
    /// held button toggles once; an unreadable button counts as released.
    pub fn is_turned_on(&mut self, now: Instant) -> bool {
        let pressed = match self.input.is_pressed() {
            Ok(pressed) => pressed,
            Err(err) => {
                warn!(bay = self.bay, error = %err, "Manual override read failed");
                false
            }
        };
        let press_edge = pressed && !self.was_pressed;
        self.was_pressed = pressed;

        if press_edge && self.accepts_press(now) {
            self.toggle(now);
        }
        self.turned_on
    }

    pub fn set_clickable(&mut self, clickable: bool) {
        if self.clickable != clickable {
            debug!(bay = self.bay, clickable, "Manual override clickable changed");
        }
        self.clickable = clickable;
    }

    fn accepts_press(&self, now: Instant) -> bool {
        if !self.clickable {
            return false;
        }
        match (self.policy, self.last_toggle_at) {
            (ButtonPolicy::Cooldown(cooldown), Some(last)) => {
                now.saturating_duration_since(last) >= cooldown
            }
            _ => true,
        }
    }

    fn toggle(&mut self, now: Instant) {
        self.turned_on = !self.turned_on;
        self.last_toggle_at = Some(now);
        if let Err(err) = self.indicator.set(self.turned_on) {
            warn!(bay = self.bay, error = %err, "Failed to drive manual override indicator");
        }
        if self.policy == ButtonPolicy::ClickLock {
            self.clickable = false;
        }
        info!(bay = self.bay, turned_on = self.turned_on, "Manual override toggled");
    }
}
