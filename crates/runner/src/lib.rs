//! Runner for the order saga: configuration, telemetry and store wiring.

pub mod app;
pub mod config;
pub mod telemetry;

pub use app::{RunReport, build_workflow, run};
pub use config::{Config, LogFormat};
