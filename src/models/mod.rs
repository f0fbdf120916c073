//! SeaORM entity models for the telemetry database.

pub mod sample;
