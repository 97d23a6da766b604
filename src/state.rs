use crate::actuator::ActuatorState;
use crate::bay::BayState;
use crate::sensor::SensorInfo;
use std::time::SystemTime;
use tokio::sync::watch;
use tracing::info;

/// What a bay looked like at the end of the latest control tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BaySnapshot {
    pub bay: usize,
    pub subject: String,
    pub state: BayState,
    pub actuator: ActuatorState,
    pub angle: i32,
    pub present: bool,
    pub manual: bool,
    pub identified: bool,
    pub updated_at: SystemTime,
}

#[derive(Debug)]
pub struct StationState {
    sensors: Vec<SensorInfo>,
    bays: Vec<BaySnapshot>,
    bays_tx: watch::Sender<Vec<BaySnapshot>>,
}

impl StationState {
    pub fn new() -> Self {
        let (bays_tx, _bays_rx) = watch::channel(Vec::new());
        Self {
            sensors: Vec::new(),
            bays: Vec::new(),
            bays_tx,
        }
    }

    pub fn sensors(&self) -> &[SensorInfo] {
        &self.sensors
    }

    pub fn set_sensors(&mut self, sensors: Vec<SensorInfo>) {
        self.sensors = sensors;
    }

    pub fn bays(&self) -> &[BaySnapshot] {
        &self.bays
    }

    pub fn subscribe_bays(&self) -> watch::Receiver<Vec<BaySnapshot>> {
        self.bays_tx.subscribe()
    }

    pub fn set_bays(&mut self, bays: Vec<BaySnapshot>) {
        self.bays = bays.clone();
        self.bays_tx.send_replace(bays);
    }
}

impl Default for StationState {
    fn default() -> Self {
        Self::new()
    }
}

/// Bays whose state differs between two published snapshots, as
/// `(bay, from, to)`. Bays missing from `previous` are skipped.
pub fn bay_changes(
    previous: &[BaySnapshot],
    current: &[BaySnapshot],
) -> Vec<(usize, BayState, BayState)> {
    current
        .iter()
        .filter_map(|now| {
            let before = previous.iter().find(|b| b.bay == now.bay)?;
            (before.state != now.state).then_some((now.bay, before.state, now.state))
        })
        .collect()
}

/// Log every bay state change published on `bays` until the station state
/// is dropped. Returns how many changes were logged.
pub async fn log_bay_changes(mut bays: watch::Receiver<Vec<BaySnapshot>>) -> usize {
    let mut previous = bays.borrow_and_update().clone();
    let mut logged = 0;
    while bays.changed().await.is_ok() {
        let current = bays.borrow_and_update().clone();
        for (bay, from, to) in bay_changes(&previous, &current) {
            info!(bay, from = ?from, to = ?to, "Bay state changed");
            logged += 1;
        }
        previous = current;
    }
    logged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sensor::SensorStatus;
    use std::time::{Duration, UNIX_EPOCH};

    fn snapshot(bay: usize, state: BayState) -> BaySnapshot {
        BaySnapshot {
            bay,
            subject: format!("subject-{bay}"),
            state,
            actuator: ActuatorState::Closed,
            angle: 90,
            present: false,
            manual: false,
            identified: false,
            updated_at: UNIX_EPOCH + Duration::from_secs(1),
        }
    }

    #[test]
    fn set_bays_updates_state_and_watch() {
        let mut state = StationState::new();
        let receiver = state.subscribe_bays();
        let bays = vec![snapshot(0, BayState::Idle), snapshot(1, BayState::Open)];

        state.set_bays(bays.clone());

        assert_eq!(state.bays(), bays.as_slice());
        assert_eq!(receiver.borrow().as_slice(), bays.as_slice());
    }

    #[test]
    fn set_bays_without_subscribers_still_stores() {
        let mut state = StationState::new();

        state.set_bays(vec![snapshot(0, BayState::Closing)]);

        assert_eq!(state.bays().len(), 1);
        assert_eq!(state.subscribe_bays().borrow()[0].state, BayState::Closing);
    }

    #[test]
    fn bay_changes_reports_only_moved_bays() {
        let previous = vec![snapshot(0, BayState::Idle), snapshot(1, BayState::Open)];
        let current = vec![
            snapshot(0, BayState::Opening),
            snapshot(1, BayState::Open),
            snapshot(2, BayState::Idle),
        ];

        let changes = bay_changes(&previous, &current);

        assert_eq!(changes, vec![(0, BayState::Idle, BayState::Opening)]);
    }

    #[tokio::test]
    async fn change_log_drains_until_state_is_dropped() {
        let mut state = StationState::new();
        state.set_bays(vec![snapshot(0, BayState::Idle), snapshot(1, BayState::Idle)]);
        let receiver = state.subscribe_bays();

        state.set_bays(vec![snapshot(0, BayState::Opening), snapshot(1, BayState::Idle)]);
        drop(state);

        assert_eq!(log_bay_changes(receiver).await, 1);
    }

    #[test]
    fn set_sensors_updates_state() {
        let mut state = StationState::new();
        let sensors = vec![SensorInfo {
            bay: 0,
            xshut_pin: 20,
            i2c_address: 0x30,
            status: SensorStatus::Ready,
        }];

        state.set_sensors(sensors.clone());

        assert_eq!(state.sensors(), sensors.as_slice());
    }
}
