//! Database migrations for the telemetry API.
//!
//! Owns the storage schema: the `sungrow_samples` hypertable and its three
//! continuous aggregate rollup views.

pub use sea_orm_migration::prelude::*;

mod m2026_02_14_000001_create_samples;
mod m2026_02_14_000002_continuous_aggregates;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m2026_02_14_000001_create_samples::Migration),
            Box::new(m2026_02_14_000002_continuous_aggregates::Migration),
        ]
    }
}
