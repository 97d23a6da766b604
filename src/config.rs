use crate::actuator::ActuatorConfig;
use crate::actuator::servo::PulseMap;
use crate::button::ButtonPolicy;
use crate::identify::{ColorSample, Side, Subject};
use crate::presence::{DistanceRange, PresenceConfig};
use crate::sensor::SensorConfig;
use crate::tracking::TrackerConfig;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_CONFIG_PATH: &str = "config/config.toml";
pub const DEFAULT_SERVER_PORT: u16 = 8080;
pub const DEFAULT_TICK_INTERVAL_MS: u64 = 100;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub app: AppSection,
    pub logging: LoggingSection,
    pub subjects: Vec<SubjectSection>,
    #[serde(default)]
    pub identification: IdentificationSection,
    #[serde(default)]
    pub presence: PresenceSection,
    #[serde(default)]
    pub actuator: ActuatorSection,
    #[serde(default)]
    pub button: ButtonSection,
    #[serde(default)]
    pub control: Option<ControlSection>,
    #[serde(default)]
    pub server: Option<ServerSection>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppSection {
    pub name: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingSection {
    pub level: String,
}

/// One subject and the bay that belongs to it.
#[derive(Debug, Deserialize, Clone)]
pub struct SubjectSection {
    pub name: String,
    /// Reference color, in the channel order the frame source delivers.
    pub color: Vec<f64>,
    #[serde(default)]
    pub gray: Option<f64>,
    pub side: Side,
    pub servo_pin: u8,
    pub button_pin: u8,
    pub led_pin: u8,
    /// XSHUT pin of the bay's time-of-flight sensor; no presence sensor when absent.
    #[serde(default)]
    pub xshut_pin: Option<u8>,
    pub open_angle: i32,
    pub closed_angle: i32,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct IdentificationSection {
    pub confirmation_frames: u32,
    pub cancel_frames: u32,
    pub wrong_side_frames: u32,
    /// Regions further than this from every reference color are left unrecognized.
    pub max_color_distance: Option<f64>,
    /// Pixels brighter than this (mean of channels) are excluded from color samples.
    pub white_threshold: u8,
}

impl Default for IdentificationSection {
    fn default() -> Self {
        Self {
            confirmation_frames: 10,
            cancel_frames: 8,
            wrong_side_frames: 5,
            max_color_distance: None,
            white_threshold: 200,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct PresenceSection {
    pub detected_range_mm: [u16; 2],
    pub undetected_range_mm: [u16; 2],
    pub cooldown_secs: u64,
}

impl Default for PresenceSection {
    fn default() -> Self {
        Self {
            detected_range_mm: [0, 150],
            undetected_range_mm: [151, 4000],
            cooldown_secs: 15,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ActuatorSection {
    pub step_degrees: u32,
    pub step_delay_ms: u64,
    pub min_angle: i32,
    pub max_angle: i32,
    pub min_pulse_us: u32,
    pub max_pulse_us: u32,
}

impl Default for ActuatorSection {
    fn default() -> Self {
        Self {
            step_degrees: 1,
            step_delay_ms: 10,
            min_angle: 0,
            max_angle: 270,
            min_pulse_us: 500,
            max_pulse_us: 2500,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ButtonPolicyKind {
    #[default]
    ClickLock,
    Cooldown,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ButtonSection {
    pub policy: ButtonPolicyKind,
    pub cooldown_ms: u64,
}

impl Default for ButtonSection {
    fn default() -> Self {
        Self {
            policy: ButtonPolicyKind::ClickLock,
            cooldown_ms: 1000,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ControlSection {
    /// Control loop period in milliseconds (default: 100)
    pub tick_interval_ms: Option<u64>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerSection {
    /// Port to listen on (default: 8080)
    pub port: Option<u16>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Read(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

pub fn load_default() -> Result<Config, ConfigError> {
    load_from_path(DEFAULT_CONFIG_PATH)
}

/// Read, parse and validate a configuration snapshot.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<Config, ConfigError> {
    let contents = std::fs::read_to_string(path)?;
    let config: Config = toml::from_str(&contents)?;
    config.validate()?;
    Ok(config)
}

/// Path given as the first CLI argument, or the default location.
pub fn path_from_args() -> PathBuf {
    std::env::args_os()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}

impl Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.subjects.is_empty() {
            return Err(invalid("at least one subject is required"));
        }

        let id = &self.identification;
        if id.confirmation_frames == 0 || id.cancel_frames == 0 || id.wrong_side_frames == 0 {
            return Err(invalid("identification frame thresholds must be non-zero"));
        }
        if let Some(max) = id.max_color_distance
            && !(max.is_finite() && max > 0.0)
        {
            return Err(invalid("max_color_distance must be a positive number"));
        }

        let presence = self.presence_config();
        if !presence.detected.is_well_formed() || !presence.undetected.is_well_formed() {
            return Err(invalid("presence ranges must have min <= max"));
        }
        if presence.detected.overlaps(&presence.undetected) {
            return Err(invalid("detected and undetected presence ranges overlap"));
        }

        let act = &self.actuator;
        if act.step_degrees == 0 {
            return Err(invalid("actuator step_degrees must be non-zero"));
        }
        if act.min_angle >= act.max_angle || act.min_pulse_us >= act.max_pulse_us {
            return Err(invalid("actuator angle and pulse limits must be increasing"));
        }

        for subject in &self.subjects {
            if subject.name.trim().is_empty() {
                return Err(invalid("subject name must not be empty"));
            }
            if subject.color.len() != 3 || subject.color.iter().any(|c| !c.is_finite()) {
                return Err(invalid(&format!(
                    "subject {} needs exactly three finite color channels",
                    subject.name
                )));
            }
            if subject.gray.is_some_and(|g| !g.is_finite()) {
                return Err(invalid(&format!("subject {} has a non-finite gray", subject.name)));
            }
            for angle in [subject.open_angle, subject.closed_angle] {
                if !(act.min_angle..=act.max_angle).contains(&angle) {
                    return Err(invalid(&format!(
                        "subject {} angle {angle} outside {}..={}",
                        subject.name, act.min_angle, act.max_angle
                    )));
                }
            }
            if subject.open_angle == subject.closed_angle {
                return Err(invalid(&format!(
                    "subject {} open and closed angles are equal",
                    subject.name
                )));
            }
        }

        Ok(())
    }

    /// Subjects in bay order; bay `i` serves subject `i`.
    pub fn subjects(&self) -> Vec<Subject> {
        self.subjects
            .iter()
            .enumerate()
            .map(|(bay, section)| Subject {
                name: section.name.clone(),
                signature: ColorSample {
                    channels: [section.color[0], section.color[1], section.color[2]],
                    gray: section.gray,
                },
                side: section.side,
                bay,
            })
            .collect()
    }

    pub fn tracker_config(&self) -> TrackerConfig {
        TrackerConfig {
            confirmation_frames: self.identification.confirmation_frames,
            cancel_frames: self.identification.cancel_frames,
            wrong_side_frames: self.identification.wrong_side_frames,
        }
    }

    pub fn presence_config(&self) -> PresenceConfig {
        let [det_min, det_max] = self.presence.detected_range_mm;
        let [und_min, und_max] = self.presence.undetected_range_mm;
        PresenceConfig {
            detected: DistanceRange::new(det_min, det_max),
            undetected: DistanceRange::new(und_min, und_max),
            cooldown: Duration::from_secs(self.presence.cooldown_secs),
        }
    }

    pub fn actuator_config(&self, bay: usize) -> Option<ActuatorConfig> {
        let subject = self.subjects.get(bay)?;
        Some(ActuatorConfig {
            open_angle: subject.open_angle,
            closed_angle: subject.closed_angle,
            step_degrees: self.actuator.step_degrees,
            step_delay: Duration::from_millis(self.actuator.step_delay_ms),
        })
    }

    pub fn pulse_map(&self) -> PulseMap {
        PulseMap {
            min_angle: self.actuator.min_angle,
            max_angle: self.actuator.max_angle,
            min_pulse: Duration::from_micros(u64::from(self.actuator.min_pulse_us)),
            max_pulse: Duration::from_micros(u64::from(self.actuator.max_pulse_us)),
        }
    }

    pub fn button_policy(&self) -> ButtonPolicy {
        match self.button.policy {
            ButtonPolicyKind::ClickLock => ButtonPolicy::ClickLock,
            ButtonPolicyKind::Cooldown => {
                ButtonPolicy::Cooldown(Duration::from_millis(self.button.cooldown_ms))
            }
        }
    }

    /// Presence sensors to bring up, one per bay that has an XSHUT pin.
    pub fn sensor_configs(&self) -> Vec<SensorConfig> {
        self.subjects
            .iter()
            .enumerate()
            .filter_map(|(bay, subject)| {
                subject
                    .xshut_pin
                    .map(|xshut_pin| SensorConfig { bay, xshut_pin })
            })
            .collect()
    }

    /// Returns the server port (default: 8080)
    pub fn server_port(&self) -> u16 {
        self.server
            .as_ref()
            .and_then(|s| s.port)
            .unwrap_or(DEFAULT_SERVER_PORT)
    }

    /// Returns the control loop period (default: 100 ms)
    pub fn tick_interval(&self) -> Duration {
        let millis = self
            .control
            .as_ref()
            .and_then(|c| c.tick_interval_ms)
            .unwrap_or(DEFAULT_TICK_INTERVAL_MS);
        Duration::from_millis(millis)
    }

    pub fn log_level(&self) -> tracing::Level {
        self.logging.level.parse().unwrap_or(tracing::Level::INFO)
    }
}

fn invalid(message: &str) -> ConfigError {
    ConfigError::Invalid(message.to_string())
}
