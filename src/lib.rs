pub mod actuator;
pub mod api;
pub mod bay;
pub mod button;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod identify;
pub mod presence;
pub mod sensor;
pub mod state;
pub mod tracking;
pub mod vision;
