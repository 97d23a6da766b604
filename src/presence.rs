//! Range-classified, cooldown-debounced presence signal for one bay.

use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Inclusive distance interval in millimetres.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DistanceRange {
    pub min_mm: u16,
    pub max_mm: u16,
}

impl DistanceRange {
    pub fn new(min_mm: u16, max_mm: u16) -> Self {
        Self { min_mm, max_mm }
    }

    pub fn contains(&self, distance_mm: u16) -> bool {
        (self.min_mm..=self.max_mm).contains(&distance_mm)
    }

    pub fn is_well_formed(&self) -> bool {
        self.min_mm <= self.max_mm
    }

    pub fn overlaps(&self, other: &DistanceRange) -> bool {
        self.min_mm <= other.max_mm && other.min_mm <= self.max_mm
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PresenceConfig {
    pub detected: DistanceRange,
    pub undetected: DistanceRange,
    pub cooldown: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProximityClass {
    Detected,
    Undetected,
    /// Missing reading, or one inside neither range.
    Fault,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PresenceState {
    pub present: bool,
    pub cooldown_started_at: Option<Instant>,
}

#[derive(Debug, Clone)]
pub struct PresenceDebouncer {
    bay: usize,
    config: PresenceConfig,
    state: PresenceState,
    faulting: bool,
}

impl PresenceDebouncer {
    pub fn new(bay: usize, config: PresenceConfig) -> Self {
        Self {
            bay,
            config,
            state: PresenceState::default(),
            faulting: false,
        }
    }

    pub fn state(&self) -> PresenceState {
        self.state
    }

    pub fn is_present(&self) -> bool {
        self.state.present
    }

    /// The latest poll was a fault.
    pub fn is_faulting(&self) -> bool {
        self.faulting
    }

    pub fn classify(&self, distance_mm: Option<u16>) -> ProximityClass {
        match distance_mm {
            Some(d) if self.config.detected.contains(d) => ProximityClass::Detected,
            Some(d) if self.config.undetected.contains(d) => ProximityClass::Undetected,
            _ => ProximityClass::Fault,
        }
    }

    /// Feed one poll. `None` means the sensor produced no usable reading.
    /// Faults count as detections so a flaky sensor never closes a bay early.
    pub fn observe(&mut self, distance_mm: Option<u16>, now: Instant) -> bool {
        let class = self.classify(distance_mm);
        let faulting = class == ProximityClass::Fault;
        match (self.faulting, faulting) {
            (false, true) => {
                warn!(bay = self.bay, distance_mm = ?distance_mm, "Proximity fault, assuming presence");
            }
            (true, true) => {
                debug!(bay = self.bay, distance_mm = ?distance_mm, "Proximity fault persists");
            }
            (true, false) => info!(bay = self.bay, "Proximity readings recovered"),
            (false, false) => {}
        }
        self.faulting = faulting;

        match class {
            ProximityClass::Detected | ProximityClass::Fault => {
                if self.state.cooldown_started_at.take().is_some() {
                    debug!(bay = self.bay, "Presence regained, cooldown cancelled");
                }
                self.state.present = true;
            }
            ProximityClass::Undetected if self.state.present => match self.state.cooldown_started_at
            {
                None => {
                    self.state.cooldown_started_at = Some(now);
                    debug!(bay = self.bay, "Presence cooldown started");
                }
                Some(started) if now.saturating_duration_since(started) >= self.config.cooldown => {
                    self.state.present = false;
                    self.state.cooldown_started_at = None;
                    debug!(bay = self.bay, "Presence lost");
                }
                Some(_) => {}
            },
            ProximityClass::Undetected => {}
        }

        self.state.present
    }

    /// Force presence and restart the cooldown clock, giving a full grace
    /// period before absence can be reported.
    pub fn reset_detecting(&mut self, now: Instant) {
        self.state.present = true;
        self.state.cooldown_started_at = Some(now);
    }
}
