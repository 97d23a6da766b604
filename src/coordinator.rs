//! One control tick across every bay, and the thread that repeats it.

use crate::bay::{AccessController, BayState, Transition};
use crate::error::AppError;
use crate::identify::{Detection, Subject, SubjectId, SubjectIdentifier};
use crate::state::{BaySnapshot, StationState};
use crate::tracking::{IdentificationTracker, Sighting, TickObservation, TrackerConfig};
use crate::vision::{Classifier, ColorSampler, Frame, FrameSource, Notifier};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::thread::JoinHandle;
use std::time::{Duration, Instant, SystemTime};
use tracing::{debug, info, warn};

/// The camera side of the station: where frames come from, how regions are
/// found and colored, and who hears about arrivals.
pub struct Vision {
    pub frames: Box<dyn FrameSource>,
    pub classifier: Box<dyn Classifier>,
    pub sampler: Box<dyn ColorSampler>,
    pub notifier: Box<dyn Notifier>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    /// A classification was requested this tick.
    pub classified: bool,
    /// Subjects whose identification was confirmed (and notified) this tick.
    pub confirmed: Vec<SubjectId>,
    pub transitions: Vec<Transition>,
}

pub struct Coordinator {
    subjects: Vec<Subject>,
    bays: Vec<AccessController>,
    tracker: IdentificationTracker,
    identifier: SubjectIdentifier,
    vision: Vision,
    state: Option<Arc<RwLock<StationState>>>,
}

impl Coordinator {
    pub fn new(
        subjects: Vec<Subject>,
        bays: Vec<AccessController>,
        tracker: TrackerConfig,
        identifier: SubjectIdentifier,
        vision: Vision,
    ) -> Self {
        let sides = subjects.iter().map(|subject| subject.side).collect();
        let tracker = IdentificationTracker::new(tracker, sides);
        Self {
            subjects,
            bays,
            tracker,
            identifier,
            vision,
            state: None,
        }
    }

    /// Publish bay snapshots to `state` after every tick.
    pub fn with_state(mut self, state: Arc<RwLock<StationState>>) -> Self {
        self.state = Some(state);
        self
    }

    pub fn bays(&self) -> &[AccessController] {
        &self.bays
    }

    pub fn tracker(&self) -> &IdentificationTracker {
        &self.tracker
    }

    pub fn tick(&mut self, now: Instant) -> TickReport {
        let classified = self.bays.iter().any(AccessController::needs_classifier);
        let mut confirmed = Vec::new();
        if classified {
            let (observation, frame) = self.observe();
            confirmed = self.tracker.update(&observation);
            if let Some(frame) = frame {
                for &subject in &confirmed {
                    if let Some(subject) = self.subjects.get(subject) {
                        self.vision.notifier.notify(&frame, subject);
                    }
                }
            }
        }

        // Every bay decides on the same identification snapshot.
        let identified = self.tracker.identified();
        let mut transitions = Vec::new();
        for bay in &mut self.bays {
            let subject = bay.subject();
            let is_identified = identified.get(subject).copied().unwrap_or(false);
            if let Some(transition) = bay.process(is_identified, now) {
                if transition.to == BayState::Idle {
                    self.tracker.reset_tracking(subject);
                }
                transitions.push(transition);
            }
        }

        if let Err(err) = self.publish(SystemTime::now()) {
            warn!(error = %err, "Failed to publish bay snapshots");
        }

        TickReport {
            classified,
            confirmed,
            transitions,
        }
    }

    pub fn snapshots(&self, updated_at: SystemTime) -> Vec<BaySnapshot> {
        self.bays
            .iter()
            .map(|bay| BaySnapshot {
                bay: bay.index(),
                subject: self
                    .subjects
                    .get(bay.subject())
                    .map(|s| s.name.clone())
                    .unwrap_or_default(),
                state: bay.state(),
                actuator: bay.actuator().current_state(),
                angle: bay.actuator().angle(),
                present: bay.is_present(),
                manual: bay.manual(),
                identified: self.tracker.is_identified(bay.subject()),
                updated_at,
            })
            .collect()
    }

    /// Release every panel's servo output.
    pub fn shutdown(&mut self) {
        for bay in &mut self.bays {
            bay.shutdown();
        }
        info!("All bays released");
    }

    /// Classify one frame. A missing frame or classification is an empty
    /// observation rather than an error.
    fn observe(&mut self) -> (TickObservation, Option<Frame>) {
        let frame = match self.vision.frames.capture() {
            Ok(frame) => frame,
            Err(err) => {
                debug!(error = %err, "No frame this tick");
                return (TickObservation::empty(), None);
            }
        };
        let regions = match self.vision.classifier.detect(&frame) {
            Ok(regions) => regions,
            Err(err) => {
                debug!(error = %err, "No classification this tick");
                return (TickObservation::empty(), None);
            }
        };

        let mut sightings: Vec<Sighting> = Vec::new();
        for region in &regions {
            let sample = self.vision.sampler.sample_color(&frame, &region.bbox);
            let Detection::Subject(subject) = self.identifier.identify(&sample) else {
                continue;
            };
            if sightings.iter().any(|s| s.subject == subject) {
                continue;
            }
            sightings.push(Sighting {
                subject,
                side: region.bbox.side(frame.width()),
            });
        }
        debug!(
            regions = regions.len(),
            sightings = sightings.len(),
            "Frame classified"
        );

        let observation = TickObservation {
            region_count: regions.len(),
            sightings,
        };
        (observation, Some(frame))
    }

    fn publish(&self, now: SystemTime) -> Result<(), AppError> {
        let Some(state) = &self.state else {
            return Ok(());
        };
        let snapshots = self.snapshots(now);
        let mut guard = state.write().map_err(|_| AppError::StateLock)?;
        guard.set_bays(snapshots);
        Ok(())
    }
}

/// Spawn the control loop. When `stop` is raised the loop finishes its
/// current tick and releases every bay before the thread exits.
pub fn spawn_control_thread(
    mut coordinator: Coordinator,
    interval: Duration,
    stop: Arc<AtomicBool>,
) -> JoinHandle<()> {
    std::thread::spawn(move || {
        info!(
            bays = coordinator.bays().len(),
            interval_ms = interval.as_millis() as u64,
            "Control loop started"
        );
        while !stop.load(Ordering::Relaxed) {
            let cycle_start = Instant::now();
            let report = coordinator.tick(cycle_start);
            if !report.transitions.is_empty() {
                debug!(transitions = report.transitions.len(), "Tick changed bay states");
            }
            sleep_with_stop(interval, &stop, cycle_start);
        }
        coordinator.shutdown();
    })
}

fn sleep_with_stop(duration: Duration, stop: &AtomicBool, start: Instant) {
    let step = Duration::from_millis(20);
    while !stop.load(Ordering::Relaxed) {
        let elapsed = start.elapsed();
        if elapsed >= duration {
            return;
        }
        std::thread::sleep((duration - elapsed).min(step));
    }
}
