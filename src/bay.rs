//! Per-bay access state machine combining identification, the manual
//! override and the presence signal into panel commands.

use crate::actuator::{ActuatorController, ActuatorState};
use crate::button::ManualOverride;
use crate::identify::SubjectId;
use crate::presence::PresenceDebouncer;
use crate::sensor::BaySensor;
use serde::Serialize;
use std::time::Instant;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BayState {
    Idle,
    Opening,
    Open,
    OpenManual,
    Closing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub bay: usize,
    pub from: BayState,
    pub to: BayState,
}

/// Inputs sampled at the start of a bay's turn in the tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BayInputs {
    pub manual: bool,
    pub present: bool,
    pub identified: bool,
    pub actuator: ActuatorState,
}

pub struct AccessController {
    index: usize,
    subject: SubjectId,
    state: BayState,
    actuator: ActuatorController,
    button: ManualOverride,
    presence: PresenceDebouncer,
    sensor: Option<BaySensor>,
}

impl AccessController {
    pub fn new(
        index: usize,
        subject: SubjectId,
        actuator: ActuatorController,
        button: ManualOverride,
        presence: PresenceDebouncer,
        sensor: Option<BaySensor>,
    ) -> Self {
        Self {
            index,
            subject,
            state: BayState::Idle,
            actuator,
            button,
            presence,
            sensor,
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn subject(&self) -> SubjectId {
        self.subject
    }

    pub fn state(&self) -> BayState {
        self.state
    }

    /// Idle bays are the only consumers of classifier output.
    pub fn needs_classifier(&self) -> bool {
        self.state == BayState::Idle
    }

    pub fn actuator(&self) -> &ActuatorController {
        &self.actuator
    }

    pub fn is_present(&self) -> bool {
        self.presence.is_present()
    }

    pub fn manual(&self) -> bool {
        self.button.turned_on()
    }

    /// Run one tick: poll the button and the proximity sensor, then decide.
    pub fn process(&mut self, identified: bool, now: Instant) -> Option<Transition> {
        let manual = self.button.is_turned_on(now);
        let distance = self.read_distance();
        let present = self.presence.observe(distance, now);
        let inputs = BayInputs {
            manual,
            present,
            identified,
            actuator: self.actuator.state(),
        };

        let next = next_state(self.state, inputs)?;
        self.enter(next, now)
    }

    /// Release the panel's servo output.
    pub fn shutdown(&mut self) {
        self.actuator.shutdown();
    }

    fn read_distance(&mut self) -> Option<u16> {
        let sensor = self.sensor.as_mut()?;
        match sensor.read_distance() {
            Ok(measurement) => measurement.usable_distance(),
            Err(err) => {
                debug!(bay = self.index, error = %err, "Proximity read failed");
                None
            }
        }
    }

    fn enter(&mut self, next: BayState, now: Instant) -> Option<Transition> {
        match next {
            BayState::Opening | BayState::Closing => {
                let command = if next == BayState::Opening {
                    self.actuator.open()
                } else {
                    self.actuator.close()
                };
                if let Err(err) = command {
                    warn!(bay = self.index, error = %err, state = ?next, "Panel command refused");
                    return None;
                }
                self.button.set_clickable(false);
            }
            BayState::Open => {
                self.presence.reset_detecting(now);
                self.button.set_clickable(true);
            }
            BayState::OpenManual | BayState::Idle => self.button.set_clickable(true),
        }

        let transition = Transition {
            bay: self.index,
            from: self.state,
            to: next,
        };
        self.state = next;
        debug!(bay = self.index, from = ?transition.from, to = ?transition.to, "Bay transition");
        Some(transition)
    }
}

/// Transition table. `None` means stay put.
pub fn next_state(state: BayState, inputs: BayInputs) -> Option<BayState> {
    match state {
        BayState::Idle if inputs.manual || inputs.identified => Some(BayState::Opening),
        BayState::Opening if inputs.actuator == ActuatorState::Open => Some(if inputs.manual {
            BayState::OpenManual
        } else {
            BayState::Open
        }),
        BayState::Open if inputs.manual => Some(BayState::OpenManual),
        BayState::Open if !inputs.present || !inputs.identified => Some(BayState::Closing),
        BayState::OpenManual if !inputs.manual => Some(BayState::Closing),
        BayState::Closing if inputs.actuator == ActuatorState::Closed => Some(BayState::Idle),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actuator::ActuatorConfig;
    use crate::actuator::mock::MockServo;
    use crate::button::ButtonPolicy;
    use crate::button::mock::{MockButton, MockLed};
    use crate::error::AppError;
    use crate::presence::{DistanceRange, PresenceConfig};
    use crate::sensor::mock::MockProximity;
    use std::time::Duration;

    const NEAR: u16 = 80;
    const FAR: u16 = 900;
    const COOLDOWN: Duration = Duration::from_secs(15);

    struct Rig {
        bay: AccessController,
        button: MockButton,
        proximity: MockProximity,
    }

    fn rig() -> Result<Rig, AppError> {
        let button = MockButton::new();
        let proximity = MockProximity::new(NEAR);
        let actuator = ActuatorController::new(
            0,
            ActuatorConfig {
                open_angle: 0,
                closed_angle: 90,
                step_degrees: 10,
                step_delay: Duration::ZERO,
            },
            Box::new(MockServo::new()),
        )?;
        let manual = ManualOverride::new(
            0,
            Box::new(button.clone()),
            Box::new(MockLed::new()),
            ButtonPolicy::ClickLock,
        );
        let presence = PresenceDebouncer::new(
            0,
            PresenceConfig {
                detected: DistanceRange::new(0, 150),
                undetected: DistanceRange::new(200, 4000),
                cooldown: COOLDOWN,
            },
        );
        let bay = AccessController::new(
            0,
            0,
            actuator,
            manual,
            presence,
            Some(Box::new(proximity.clone())),
        );
        Ok(Rig {
            bay,
            button,
            proximity,
        })
    }

    /// Tick until the bay reaches `wanted` or the deadline passes.
    fn settle(bay: &mut AccessController, identified: bool, now: Instant, wanted: BayState) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            bay.process(identified, now);
            if bay.state() == wanted {
                return true;
            }
            std::thread::sleep(Duration::from_millis(1));
        }
        false
    }

    fn inputs(manual: bool, present: bool, identified: bool, actuator: ActuatorState) -> BayInputs {
        BayInputs {
            manual,
            present,
            identified,
            actuator,
        }
    }

    #[test]
    fn idle_opens_on_identification_or_manual() {
        let closed = ActuatorState::Closed;
        assert_eq!(
            next_state(BayState::Idle, inputs(false, true, true, closed)),
            Some(BayState::Opening)
        );
        assert_eq!(
            next_state(BayState::Idle, inputs(true, false, false, closed)),
            Some(BayState::Opening)
        );
        assert_eq!(next_state(BayState::Idle, inputs(false, true, false, closed)), None);
    }

    #[test]
    fn opening_waits_for_actuator() {
        assert_eq!(
            next_state(BayState::Opening, inputs(false, true, true, ActuatorState::Opening)),
            None
        );
        assert_eq!(
            next_state(BayState::Opening, inputs(false, true, true, ActuatorState::Open)),
            Some(BayState::Open)
        );
        assert_eq!(
            next_state(BayState::Opening, inputs(true, true, true, ActuatorState::Open)),
            Some(BayState::OpenManual)
        );
    }

    #[test]
    fn open_closes_when_presence_or_identification_lost() {
        let open = ActuatorState::Open;
        assert_eq!(next_state(BayState::Open, inputs(false, true, true, open)), None);
        assert_eq!(
            next_state(BayState::Open, inputs(false, false, true, open)),
            Some(BayState::Closing)
        );
        assert_eq!(
            next_state(BayState::Open, inputs(false, true, false, open)),
            Some(BayState::Closing)
        );
        assert_eq!(
            next_state(BayState::Open, inputs(true, false, false, open)),
            Some(BayState::OpenManual)
        );
    }

    #[test]
    fn manual_open_ignores_presence_and_identification() {
        let open = ActuatorState::Open;
        assert_eq!(next_state(BayState::OpenManual, inputs(true, false, false, open)), None);
        assert_eq!(
            next_state(BayState::OpenManual, inputs(false, true, true, open)),
            Some(BayState::Closing)
        );
    }

    #[test]
    fn identified_subject_opens_then_bay_closes_after_presence_cooldown() -> Result<(), AppError> {
        let Rig {
            mut bay, proximity, ..
        } = rig()?;
        let start = Instant::now();

        assert!(bay.needs_classifier());
        assert!(settle(&mut bay, true, start, BayState::Open));
        assert!(!bay.needs_classifier());

        proximity.set_distance(FAR);
        bay.process(true, start + Duration::from_secs(1));
        assert_eq!(bay.state(), BayState::Open);

        let expired = start + COOLDOWN + Duration::from_secs(1);
        let transition = bay.process(true, expired);
        assert_eq!(
            transition,
            Some(Transition {
                bay: 0,
                from: BayState::Open,
                to: BayState::Closing,
            })
        );

        assert!(settle(&mut bay, false, expired, BayState::Idle));
        assert_eq!(bay.actuator().angle(), 90);
        Ok(())
    }

    #[test]
    fn button_pressed_as_presence_is_lost_holds_bay_open() -> Result<(), AppError> {
        let Rig {
            mut bay,
            button,
            proximity,
        } = rig()?;
        let start = Instant::now();
        assert!(settle(&mut bay, true, start, BayState::Open));

        proximity.set_distance(FAR);
        bay.process(true, start);
        let expired = start + COOLDOWN;
        button.press();
        let transition = bay.process(true, expired);

        assert_eq!(transition.map(|t| t.to), Some(BayState::OpenManual));
        assert!(bay.manual());

        // Presence and identification no longer matter.
        button.release();
        bay.process(false, expired + COOLDOWN);
        assert_eq!(bay.state(), BayState::OpenManual);

        button.press();
        let transition = bay.process(false, expired + COOLDOWN);
        assert_eq!(transition.map(|t| t.to), Some(BayState::Closing));
        bay.shutdown();
        Ok(())
    }

    #[test]
    fn presence_grace_period_restarts_on_open() -> Result<(), AppError> {
        let Rig {
            mut bay, proximity, ..
        } = rig()?;
        proximity.set_distance(FAR);
        let start = Instant::now();

        // Nobody at the bay, yet the panel stays open for a full cooldown.
        assert!(settle(&mut bay, true, start, BayState::Open));
        bay.process(true, start + COOLDOWN - Duration::from_millis(1));
        assert_eq!(bay.state(), BayState::Open);
        assert!(bay.is_present());

        bay.process(true, start + COOLDOWN);
        assert_eq!(bay.state(), BayState::Closing);
        bay.shutdown();
        Ok(())
    }

    #[test]
    fn sensor_fault_keeps_bay_open() -> Result<(), AppError> {
        let Rig {
            mut bay, proximity, ..
        } = rig()?;
        let start = Instant::now();
        assert!(settle(&mut bay, true, start, BayState::Open));

        proximity.disconnect();
        bay.process(true, start + COOLDOWN * 2);

        assert_eq!(bay.state(), BayState::Open);
        assert!(bay.is_present());
        bay.shutdown();
        Ok(())
    }

    #[test]
    fn manual_open_from_idle_lands_in_open_manual() -> Result<(), AppError> {
        let Rig {
            mut bay, button, ..
        } = rig()?;
        let now = Instant::now();

        button.press();
        bay.process(false, now);
        assert_eq!(bay.state(), BayState::Opening);
        button.release();

        assert!(settle(&mut bay, false, now, BayState::OpenManual));
        bay.shutdown();
        Ok(())
    }

    #[test]
    fn stuck_actuator_leaves_bay_opening() -> Result<(), AppError> {
        let servo = MockServo::failing_after(3);
        let actuator = ActuatorController::new(
            0,
            ActuatorConfig {
                open_angle: 0,
                closed_angle: 90,
                step_degrees: 10,
                step_delay: Duration::ZERO,
            },
            Box::new(servo),
        )?;
        let presence = PresenceDebouncer::new(
            0,
            PresenceConfig {
                detected: DistanceRange::new(0, 150),
                undetected: DistanceRange::new(200, 4000),
                cooldown: COOLDOWN,
            },
        );
        let manual = ManualOverride::new(
            0,
            Box::new(MockButton::new()),
            Box::new(MockLed::new()),
            ButtonPolicy::ClickLock,
        );
        let mut bay = AccessController::new(0, 0, actuator, manual, presence, None);
        let now = Instant::now();

        bay.process(true, now);
        std::thread::sleep(Duration::from_millis(50));
        for _ in 0..5 {
            bay.process(true, now);
        }

        assert_eq!(bay.state(), BayState::Opening);
        assert_eq!(bay.actuator().angle(), 80);
        Ok(())
    }
}
