//! # Sungrow Edge Daemon Library
//!
//! Polls a Sungrow hybrid inverter over Modbus/TCP, normalizes raw register
//! words into typed samples, buffers them in a durable on-disk spool, and
//! batch-uploads them to the central ingest API over HTTPS.

pub mod config;
pub mod daemon;
pub mod health;
pub mod models;
pub mod modbus;
pub mod normalizer;
pub mod registers;
pub mod spool;
pub mod telemetry;
pub mod uploader;
