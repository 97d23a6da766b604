//! Timed panel sweep driven from a background thread, with no mid-motion cancellation.
//!
//! `open()`/`close()` only start motion; callers poll [`ActuatorController::state`],
//! which is also what advances `Opening -> Open` and `Closing -> Closed` once the
//! motion thread has signalled completion. A motion thread that fails never
//! signals, leaving the actuator visibly stuck mid-motion rather than
//! reporting a position it never reached.

use crate::actuator::servo::ServoDriver;
use crate::error::AppError;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, info, warn};

pub mod mock;
pub mod servo;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ActuatorState {
    Closed,
    Opening,
    Open,
    Closing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActuatorConfig {
    pub open_angle: i32,
    pub closed_angle: i32,
    pub step_degrees: u32,
    pub step_delay: Duration,
}

/// Angles visited moving from `from` to `to`: both endpoints included,
/// strictly monotonic, the last step shortened to land exactly on `to`.
pub fn sweep(from: i32, to: i32, step: u32) -> Vec<i32> {
    let step = i64::from(step.max(1));
    let (from, to) = (i64::from(from), i64::from(to));
    let direction = if to >= from { 1 } else { -1 };
    let distance = (to - from).abs();

    let mut angles = Vec::with_capacity((distance / step + 2) as usize);
    let mut travelled = 0;
    while travelled < distance {
        angles.push((from + direction * travelled) as i32);
        travelled += step;
    }
    angles.push(to as i32);
    angles
}

struct MotionTask {
    handle: JoinHandle<()>,
    done: Arc<AtomicBool>,
}

type SharedServo = Arc<Mutex<Box<dyn ServoDriver>>>;

pub struct ActuatorController {
    bay: usize,
    config: ActuatorConfig,
    state: ActuatorState,
    angle: Arc<AtomicI32>,
    servo: SharedServo,
    motion: Option<MotionTask>,
}

impl ActuatorController {
    /// Drive the servo to the closed angle and start in `Closed`.
    pub fn new(
        bay: usize,
        config: ActuatorConfig,
        mut servo: Box<dyn ServoDriver>,
    ) -> Result<Self, AppError> {
        servo.set_angle(config.closed_angle)?;
        Ok(Self {
            bay,
            config,
            state: ActuatorState::Closed,
            angle: Arc::new(AtomicI32::new(config.closed_angle)),
            servo: Arc::new(Mutex::new(servo)),
            motion: None,
        })
    }

    pub fn angle(&self) -> i32 {
        self.angle.load(Ordering::Acquire)
    }

    /// Last observed state, without retiring a finished motion.
    pub fn current_state(&self) -> ActuatorState {
        self.state
    }

    pub fn is_moving(&self) -> bool {
        self.motion.is_some()
    }

    /// Current state, retiring a finished motion thread first.
    pub fn state(&mut self) -> ActuatorState {
        let finished = self
            .motion
            .as_ref()
            .is_some_and(|task| task.done.load(Ordering::Acquire));
        if finished && let Some(task) = self.motion.take() {
            if task.handle.join().is_err() {
                warn!(bay = self.bay, "Motion thread panicked after completing");
            }
            self.state = match self.state {
                ActuatorState::Opening => ActuatorState::Open,
                ActuatorState::Closing => ActuatorState::Closed,
                settled => settled,
            };
            info!(bay = self.bay, state = ?self.state, "Panel motion complete");
        }
        self.state
    }

    pub fn open(&mut self) -> Result<(), AppError> {
        self.start_motion(ActuatorState::Opening, self.config.open_angle)
    }

    pub fn close(&mut self) -> Result<(), AppError> {
        self.start_motion(ActuatorState::Closing, self.config.closed_angle)
    }

    fn start_motion(&mut self, moving: ActuatorState, target: i32) -> Result<(), AppError> {
        if self.motion.is_some() {
            return Err(AppError::MotionInFlight(self.bay));
        }

        let angles = sweep(self.angle(), target, self.config.step_degrees);
        let done = Arc::new(AtomicBool::new(false));
        let handle = {
            let bay = self.bay;
            let delay = self.config.step_delay;
            let servo = Arc::clone(&self.servo);
            let angle = Arc::clone(&self.angle);
            let done = Arc::clone(&done);
            std::thread::Builder::new()
                .name(format!("bay{bay}-motion"))
                .spawn(move || match run_sweep(&servo, &angle, &angles, delay) {
                    Ok(()) => done.store(true, Ordering::Release),
                    Err(err) => warn!(bay, error = %err, "Panel motion aborted"),
                })
                .map_err(|err| AppError::Actuator(format!("failed to spawn motion thread: {err}")))?
        };

        self.state = moving;
        self.motion = Some(MotionTask { handle, done });
        debug!(bay = self.bay, state = ?moving, target, "Panel motion started");
        Ok(())
    }

    /// Release the servo output. A motion still in flight is waited for.
    pub fn shutdown(&mut self) {
        if let Some(task) = self.motion.take()
            && task.handle.join().is_err()
        {
            warn!(bay = self.bay, "Motion thread panicked");
        }
        match self.servo.lock() {
            Ok(mut servo) => {
                if let Err(err) = servo.release() {
                    warn!(bay = self.bay, error = %err, "Failed to release servo");
                }
            }
            Err(_) => warn!(bay = self.bay, "Servo lock poisoned during shutdown"),
        }
    }
}

fn run_sweep(
    servo: &SharedServo,
    angle: &AtomicI32,
    angles: &[i32],
    delay: Duration,
) -> Result<(), AppError> {
    for &next in angles {
        {
            let mut servo = servo
                .lock()
                .map_err(|_| AppError::Actuator("servo lock poisoned".to_string()))?;
            servo.set_angle(next)?;
        }
        angle.store(next, Ordering::Release);
        std::thread::sleep(delay);
    }
    Ok(())
}
