pub mod key;
pub mod service;
pub mod telemetry;
