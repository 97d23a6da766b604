//! Per-subject sighting debounce turning noisy frames into a stable
//! "identified" signal.

use crate::identify::{Side, SubjectId};
use serde::Serialize;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy)]
pub struct TrackerConfig {
    pub confirmation_frames: u32,
    pub cancel_frames: u32,
    pub wrong_side_frames: u32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TrackingState {
    pub frames_seen: u32,
    pub frames_unseen: u32,
    /// Notification already delivered for the current confirmation episode.
    pub notified: bool,
}

/// A subject credited to a region on one side of the frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sighting {
    pub subject: SubjectId,
    pub side: Side,
}

/// Everything the tracker learns from one classified frame.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickObservation {
    /// Regions the classifier reported, recognized or not.
    pub region_count: usize,
    pub sightings: Vec<Sighting>,
}

impl TickObservation {
    /// A tick with no classifier result.
    pub fn empty() -> Self {
        Self::default()
    }
}

#[derive(Debug, Clone)]
pub struct IdentificationTracker {
    config: TrackerConfig,
    states: Vec<TrackingState>,
    /// Configured side of each subject, in subject order.
    sides: Vec<Side>,
    wrong_side: [u32; 2],
}

impl IdentificationTracker {
    pub fn new(config: TrackerConfig, sides: Vec<Side>) -> Self {
        Self {
            config,
            states: vec![TrackingState::default(); sides.len()],
            sides,
            wrong_side: [0; 2],
        }
    }

    pub fn state(&self, subject: SubjectId) -> Option<&TrackingState> {
        self.states.get(subject)
    }

    pub fn wrong_side_count(&self, side: Side) -> u32 {
        self.wrong_side[side.index()]
    }

    pub fn is_identified(&self, subject: SubjectId) -> bool {
        self.states
            .get(subject)
            .is_some_and(|s| s.frames_seen >= self.config.confirmation_frames)
    }

    /// Identified flags for every subject, in subject order.
    pub fn identified(&self) -> Vec<bool> {
        (0..self.states.len()).map(|s| self.is_identified(s)).collect()
    }

    /// Zero a subject's counters and clear its notification gate.
    pub fn reset_tracking(&mut self, subject: SubjectId) {
        if let Some(state) = self.states.get_mut(subject) {
            *state = TrackingState::default();
            debug!(subject, "Tracking reset");
        }
    }

    /// Apply one frame. Returns the subjects that became identified in this
    /// tick and have not been notified yet in this episode; they are marked
    /// notified before returning.
    pub fn update(&mut self, observation: &TickObservation) -> Vec<SubjectId> {
        let subject_count = self.states.len();
        let mut seen = vec![false; subject_count];
        for sighting in &observation.sightings {
            if let Some(flag) = seen.get_mut(sighting.subject) {
                *flag = true;
            }
        }

        if subject_count > 0 && observation.region_count >= subject_count {
            for state in &mut self.states {
                state.frames_seen = state.frames_seen.max(self.config.confirmation_frames);
                state.frames_unseen = 0;
            }
            debug!(
                regions = observation.region_count,
                "All subjects visible, quick confirm"
            );
        } else {
            for (subject, was_seen) in seen.iter().enumerate() {
                self.count_frame(subject, *was_seen);
            }
        }

        self.check_wrong_side(observation);

        let mut confirmed = Vec::new();
        for subject in 0..subject_count {
            if self.is_identified(subject) && !self.states[subject].notified {
                self.states[subject].notified = true;
                info!(subject, "Subject identified");
                confirmed.push(subject);
            }
        }
        confirmed
    }

    fn count_frame(&mut self, subject: SubjectId, seen: bool) {
        let cancel_frames = self.config.cancel_frames;
        let state = &mut self.states[subject];
        if seen {
            state.frames_seen = state.frames_seen.saturating_add(1);
            state.frames_unseen = 0;
            return;
        }

        state.frames_unseen += 1;
        if state.frames_unseen >= cancel_frames {
            if state.frames_seen > 0 {
                info!(
                    subject,
                    frames = cancel_frames,
                    "Subject not seen, dropping identification"
                );
            }
            *state = TrackingState::default();
        }
    }

    fn check_wrong_side(&mut self, observation: &TickObservation) {
        for side in Side::ALL {
            let mut implicated: Vec<SubjectId> = observation
                .sightings
                .iter()
                .filter(|s| s.side == side)
                .map(|s| s.subject)
                .filter(|&s| self.states.get(s).is_some_and(|st| st.frames_seen > 0))
                .collect();
            implicated.sort_unstable();
            implicated.dedup();

            let counter = &mut self.wrong_side[side.index()];
            if implicated.len() <= 1 {
                *counter = 0;
                continue;
            }

            *counter += 1;
            if *counter >= self.config.wrong_side_frames {
                warn!(
                    side = ?side,
                    subjects = ?implicated,
                    frames = *counter,
                    "Several subjects kept appearing on one side, resetting"
                );
                *counter = 0;
                for (state, _) in self
                    .states
                    .iter_mut()
                    .zip(&self.sides)
                    .filter(|(_, assigned)| **assigned == side)
                {
                    *state = TrackingState::default();
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SIDES: [Side; 3] = [Side::Left, Side::Right, Side::Left];

    fn tracker(subjects: usize) -> IdentificationTracker {
        IdentificationTracker::new(
            TrackerConfig {
                confirmation_frames: 10,
                cancel_frames: 8,
                wrong_side_frames: 3,
            },
            SIDES[..subjects].to_vec(),
        )
    }

    fn seen(subjects: &[(SubjectId, Side)]) -> TickObservation {
        TickObservation {
            region_count: subjects.len(),
            sightings: subjects
                .iter()
                .map(|&(subject, side)| Sighting { subject, side })
                .collect(),
        }
    }

    #[test]
    fn confirms_exactly_on_threshold_tick() {
        let mut tracker = tracker(2);
        for tick in 1..=9 {
            let confirmed = tracker.update(&seen(&[(0, Side::Left)]));
            assert!(confirmed.is_empty(), "confirmed early on tick {tick}");
            assert!(!tracker.is_identified(0));
        }

        let confirmed = tracker.update(&seen(&[(0, Side::Left)]));

        assert_eq!(confirmed, vec![0]);
        assert!(tracker.is_identified(0));
        assert!(!tracker.is_identified(1));
    }

    #[test]
    fn short_absence_keeps_identification() {
        let mut tracker = tracker(2);
        for _ in 0..10 {
            tracker.update(&seen(&[(0, Side::Left)]));
        }
        for _ in 0..7 {
            tracker.update(&TickObservation::empty());
            assert!(tracker.is_identified(0));
        }

        tracker.update(&seen(&[(0, Side::Left)]));

        let state = tracker.state(0).copied().unwrap_or_default();
        assert_eq!(state.frames_unseen, 0);
        assert!(tracker.is_identified(0));
    }

    #[test]
    fn long_absence_cancels_identification() {
        let mut tracker = tracker(2);
        for _ in 0..10 {
            tracker.update(&seen(&[(0, Side::Left)]));
        }
        for _ in 0..8 {
            tracker.update(&TickObservation::empty());
        }

        assert_eq!(tracker.state(0), Some(&TrackingState::default()));
        assert!(!tracker.is_identified(0));
    }

    #[test]
    fn quick_confirm_when_all_subjects_visible() {
        let mut tracker = tracker(2);

        let confirmed = tracker.update(&seen(&[(0, Side::Left), (1, Side::Right)]));

        assert_eq!(confirmed, vec![0, 1]);
        assert_eq!(tracker.identified(), vec![true, true]);
    }

    #[test]
    fn quick_confirm_counts_unrecognized_regions() {
        let mut tracker = tracker(2);
        let observation = TickObservation {
            region_count: 3,
            sightings: Vec::new(),
        };

        tracker.update(&observation);

        assert_eq!(tracker.identified(), vec![true, true]);
    }

    #[test]
    fn sighting_clears_unseen_and_no_tick_bumps_both_counters() {
        let mut tracker = tracker(2);
        let script = [true, false, false, true, false, true, true, false];
        for was_seen in script {
            let before = tracker.state(0).copied().unwrap_or_default();
            let observation = if was_seen {
                seen(&[(0, Side::Left)])
            } else {
                TickObservation::empty()
            };
            tracker.update(&observation);
            let after = tracker.state(0).copied().unwrap_or_default();

            let seen_grew = after.frames_seen > before.frames_seen;
            let unseen_grew = after.frames_unseen > before.frames_unseen;
            assert!(!(seen_grew && unseen_grew));
            if was_seen {
                assert_eq!(after.frames_unseen, 0);
            }
        }
    }

    #[test]
    fn notification_fires_once_per_episode() {
        let mut tracker = tracker(1);
        let first = tracker.update(&seen(&[(0, Side::Left)]));
        let second = tracker.update(&seen(&[(0, Side::Left)]));
        assert_eq!(first, vec![0]);
        assert!(second.is_empty());

        tracker.reset_tracking(0);
        let third = tracker.update(&seen(&[(0, Side::Left)]));
        assert_eq!(third, vec![0]);
    }

    #[test]
    fn reset_tracking_is_idempotent() {
        let mut tracker = tracker(2);
        for _ in 0..4 {
            tracker.update(&seen(&[(1, Side::Right)]));
        }

        tracker.reset_tracking(1);
        let once = tracker.state(1).copied();
        tracker.reset_tracking(1);

        assert_eq!(tracker.state(1).copied(), once);
        assert_eq!(once, Some(TrackingState::default()));
    }

    #[test]
    fn repeated_wrong_side_resets_side() {
        let mut tracker = tracker(2);
        let crowded = seen(&[(0, Side::Left), (1, Side::Left)]);

        for _ in 0..2 {
            tracker.update(&crowded);
            assert_eq!(tracker.identified(), vec![true, true]);
        }
        assert_eq!(tracker.wrong_side_count(Side::Left), 2);

        tracker.update(&crowded);

        assert_eq!(tracker.wrong_side_count(Side::Left), 0);
        assert_eq!(tracker.state(0), Some(&TrackingState::default()));
        assert!(tracker.is_identified(1));
    }

    #[test]
    fn wrong_side_reset_spares_subject_assigned_elsewhere() {
        let mut tracker = tracker(3);
        let crowded = TickObservation {
            region_count: 2,
            sightings: vec![
                Sighting {
                    subject: 0,
                    side: Side::Left,
                },
                Sighting {
                    subject: 1,
                    side: Side::Left,
                },
            ],
        };

        for _ in 0..3 {
            tracker.update(&crowded);
        }

        assert_eq!(tracker.wrong_side_count(Side::Left), 0);
        assert_eq!(tracker.state(0), Some(&TrackingState::default()));
        let right = tracker.state(1).copied().unwrap_or_default();
        assert_eq!(right.frames_seen, 3);
        assert_eq!(right.frames_unseen, 0);
        assert_eq!(tracker.state(2), Some(&TrackingState::default()));
    }

    #[test]
    fn wrong_side_counter_needs_consecutive_ticks() {
        let mut tracker = tracker(2);
        let crowded = seen(&[(0, Side::Left), (1, Side::Left)]);
        tracker.update(&crowded);
        tracker.update(&crowded);

        tracker.update(&seen(&[(0, Side::Left), (1, Side::Right)]));

        assert_eq!(tracker.wrong_side_count(Side::Left), 0);
        assert_eq!(tracker.identified(), vec![true, true]);
    }
}
