use crate::api::responses::{
    BayStatusResponse, BaysSuccessResponse, ErrorCode, ErrorResponse, HealthStatus,
    HealthSuccessResponse,
};
use crate::sensor::{SensorInfo, SensorStatus};
use crate::state::{BaySnapshot, StationState};
use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use std::sync::{Arc, RwLock};
use std::time::SystemTime;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tracing::error;

const INTERNAL_ERROR_MESSAGE: &str = "Internal server error";
const FALLBACK_TIMESTAMP: &str = "1970-01-01T00:00:00Z";

pub enum ApiResponse<T> {
    Success { status: StatusCode, body: T },
    Error { status: StatusCode, body: ErrorResponse },
}

impl<T: serde::Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        match self {
            ApiResponse::Success { status, body } => (status, Json(body)).into_response(),
            ApiResponse::Error { status, body } => (status, Json(body)).into_response(),
        }
    }
}

pub async fn get_health(State(state): State<Arc<RwLock<StationState>>>) -> impl IntoResponse {
    build_health_response(state, SystemTime::now())
}

pub async fn get_bays(State(state): State<Arc<RwLock<StationState>>>) -> impl IntoResponse {
    build_bays_response(state, SystemTime::now())
}

fn format_timestamp(timestamp: SystemTime) -> String {
    OffsetDateTime::from(timestamp)
        .format(&Rfc3339)
        .unwrap_or_else(|err| {
            error!(error = %err, "Failed to format timestamp");
            FALLBACK_TIMESTAMP.to_string()
        })
}

fn build_health_response(
    state: Arc<RwLock<StationState>>,
    now: SystemTime,
) -> ApiResponse<HealthSuccessResponse> {
    let guard = match state.read() {
        Ok(guard) => guard,
        Err(_) => {
            return internal_error("/api/health", "state lock poisoned while reading bays", now);
        }
    };
    let bays = guard.bays().len();
    let (ready, failed) = count_sensors(guard.sensors());
    drop(guard);

    let status = derive_health_status(bays, ready, failed);
    let status_code = match status {
        HealthStatus::Ko => StatusCode::SERVICE_UNAVAILABLE,
        HealthStatus::Ok | HealthStatus::Degraded => StatusCode::OK,
    };

    ApiResponse::Success {
        status: status_code,
        body: HealthSuccessResponse {
            status,
            bays,
            sensors_ready: ready,
            sensors_failed: failed,
            timestamp: format_timestamp(now),
        },
    }
}

fn count_sensors(sensors: &[SensorInfo]) -> (usize, usize) {
    sensors
        .iter()
        .fold((0, 0), |(ready, failed), sensor| match sensor.status {
            SensorStatus::Ready => (ready + 1, failed),
            SensorStatus::Error { .. } => (ready, failed + 1),
        })
}

/// No published bays means the control loop is not running. A failed
/// presence sensor leaves its bay running on fail-safe presence.
fn derive_health_status(bays: usize, ready: usize, failed: usize) -> HealthStatus {
    match (bays, ready, failed) {
        (0, _, _) => HealthStatus::Ko,
        (_, _, 0) => HealthStatus::Ok,
        _ => HealthStatus::Degraded,
    }
}

fn build_bays_response(
    state: Arc<RwLock<StationState>>,
    now: SystemTime,
) -> ApiResponse<BaysSuccessResponse> {
    let guard = match state.read() {
        Ok(guard) => guard,
        Err(_) => {
            return internal_error("/api/bays", "state lock poisoned while reading bays", now);
        }
    };
    let bays: Vec<BayStatusResponse> = guard.bays().iter().map(map_bay).collect();
    drop(guard);

    if bays.is_empty() {
        return ApiResponse::Error {
            status: StatusCode::SERVICE_UNAVAILABLE,
            body: ErrorResponse {
                error_code: ErrorCode::NoData,
                error_message: "No bay data available yet".to_string(),
                timestamp: format_timestamp(now),
            },
        };
    }

    ApiResponse::Success {
        status: StatusCode::OK,
        body: BaysSuccessResponse {
            bays,
            timestamp: format_timestamp(now),
        },
    }
}

fn map_bay(snapshot: &BaySnapshot) -> BayStatusResponse {
    BayStatusResponse {
        bay: snapshot.bay,
        subject: snapshot.subject.clone(),
        state: snapshot.state,
        actuator: snapshot.actuator,
        angle_degrees: snapshot.angle,
        present: snapshot.present,
        manual: snapshot.manual,
        identified: snapshot.identified,
        updated_at: format_timestamp(snapshot.updated_at),
    }
}

fn internal_error<T>(route: &str, message: &str, now: SystemTime) -> ApiResponse<T> {
    error!(route, message, "Internal error while handling request");
    ApiResponse::Error {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        body: ErrorResponse {
            error_code: ErrorCode::InternalError,
            error_message: INTERNAL_ERROR_MESSAGE.to_string(),
            timestamp: format_timestamp(now),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actuator::ActuatorState;
    use crate::bay::BayState;
    use std::time::{Duration, UNIX_EPOCH};

    fn snapshot(bay: usize, state: BayState) -> BaySnapshot {
        BaySnapshot {
            bay,
            subject: format!("subject-{bay}"),
            state,
            actuator: ActuatorState::Closed,
            angle: 90,
            present: true,
            manual: false,
            identified: false,
            updated_at: UNIX_EPOCH + Duration::from_secs(1),
        }
    }

    fn sensor(bay: usize, status: SensorStatus) -> SensorInfo {
        SensorInfo {
            bay,
            xshut_pin: 20 + bay as u8,
            i2c_address: 0x30 + bay as u8,
            status,
        }
    }

    fn poisoned_state() -> Arc<RwLock<StationState>> {
        let state = Arc::new(RwLock::new(StationState::new()));
        let state_for_thread = Arc::clone(&state);
        let _ = std::thread::spawn(move || {
            let _guard = state_for_thread.write().expect("lock for poison");
            panic!("poison lock");
        })
        .join();
        state
    }

    #[test]
    fn bays_handler_returns_published_snapshots() {
        let mut station = StationState::new();
        station.set_bays(vec![
            snapshot(0, BayState::Idle),
            snapshot(1, BayState::Opening),
        ]);
        let state = Arc::new(RwLock::new(station));

        let response = build_bays_response(state, UNIX_EPOCH + Duration::from_secs(2));

        match response {
            ApiResponse::Success { status, body } => {
                assert_eq!(status, StatusCode::OK);
                assert_eq!(body.bays.len(), 2);
                assert_eq!(body.bays[1].state, BayState::Opening);
                assert_eq!(body.bays[0].updated_at, "1970-01-01T00:00:01Z");
                assert_eq!(body.timestamp, "1970-01-01T00:00:02Z");
            }
            ApiResponse::Error { status, .. } => {
                panic!("expected success response, got error: {status}");
            }
        }
    }

    #[test]
    fn bays_handler_returns_no_data_before_first_tick() {
        let state = Arc::new(RwLock::new(StationState::new()));

        let response = build_bays_response(state, UNIX_EPOCH);

        match response {
            ApiResponse::Error { status, body } => {
                assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
                assert_eq!(body.error_code, ErrorCode::NoData);
            }
            ApiResponse::Success { .. } => panic!("expected no data response"),
        }
    }

    #[test]
    fn bays_handler_returns_internal_error_when_lock_poisoned() {
        let response = build_bays_response(poisoned_state(), UNIX_EPOCH);

        match response {
            ApiResponse::Error { status, body } => {
                assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
                assert_eq!(body.error_code, ErrorCode::InternalError);
                assert_eq!(body.error_message, "Internal server error");
            }
            ApiResponse::Success { .. } => panic!("expected internal error response"),
        }
    }

    #[test]
    fn health_is_ok_when_all_sensors_ready() {
        let mut station = StationState::new();
        station.set_bays(vec![snapshot(0, BayState::Idle)]);
        station.set_sensors(vec![sensor(0, SensorStatus::Ready)]);
        let state = Arc::new(RwLock::new(station));

        let response = build_health_response(state, UNIX_EPOCH + Duration::from_secs(2));

        match response {
            ApiResponse::Success { status, body } => {
                assert_eq!(status, StatusCode::OK);
                assert_eq!(body.status, HealthStatus::Ok);
                assert_eq!(body.sensors_ready, 1);
                assert_eq!(body.timestamp, "1970-01-01T00:00:02Z");
            }
            ApiResponse::Error { status, .. } => {
                panic!("expected success response, got error: {status}");
            }
        }
    }

    #[test]
    fn health_is_degraded_when_a_sensor_failed() {
        let mut station = StationState::new();
        station.set_bays(vec![snapshot(0, BayState::Idle), snapshot(1, BayState::Idle)]);
        station.set_sensors(vec![
            sensor(0, SensorStatus::Ready),
            sensor(
                1,
                SensorStatus::Error {
                    message: "no response".to_string(),
                },
            ),
        ]);
        let state = Arc::new(RwLock::new(station));

        let response = build_health_response(state, UNIX_EPOCH);

        match response {
            ApiResponse::Success { status, body } => {
                assert_eq!(status, StatusCode::OK);
                assert_eq!(body.status, HealthStatus::Degraded);
                assert_eq!(body.sensors_failed, 1);
            }
            ApiResponse::Error { status, .. } => {
                panic!("expected success response, got error: {status}");
            }
        }
    }

    #[test]
    fn health_is_ko_before_control_loop_publishes() {
        let state = Arc::new(RwLock::new(StationState::new()));

        let response = build_health_response(state, UNIX_EPOCH);

        match response {
            ApiResponse::Success { status, body } => {
                assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
                assert_eq!(body.status, HealthStatus::Ko);
            }
            ApiResponse::Error { status, .. } => {
                panic!("expected ko health response, got error: {status}");
            }
        }
    }

    #[test]
    fn health_returns_internal_error_when_lock_poisoned() {
        let response = build_health_response(poisoned_state(), UNIX_EPOCH);

        match response {
            ApiResponse::Error { status, body } => {
                assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
                assert_eq!(body.error_code, ErrorCode::InternalError);
            }
            ApiResponse::Success { .. } => panic!("expected internal error response"),
        }
    }
}
