pub mod config;
pub mod error;
pub mod market;
pub mod monitor;
pub mod series;
pub mod signals;
pub mod sources;
pub mod telemetry;
