//! # Sungrow Telemetry API Library
//!
//! This library provides the core functionality for the Sungrow telemetry
//! API service: handlers, models, repositories, and server configuration.

pub mod auth;
pub mod cache;
pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod models;
pub mod repositories;
pub mod server;
pub mod telemetry;
pub use migration;
