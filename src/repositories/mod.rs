//! Data access layer for the telemetry API.

pub mod sample;

pub use sample::SampleRepository;
