//! Sample entity model
//!
//! SeaORM entity for the `sungrow_samples` hypertable. The composite
//! primary key `(device_id, ts)` is what makes batch ingestion idempotent:
//! replayed samples conflict and are skipped.

use sea_orm::entity::prelude::*;

/// One normalized inverter telemetry sample.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "sungrow_samples")]
pub struct Model {
    /// Identifier of the inverter device (primary key, first column)
    #[sea_orm(primary_key, auto_increment = false)]
    pub device_id: String,

    /// Measurement timestamp in UTC (primary key, hypertable dimension)
    #[sea_orm(primary_key, auto_increment = false)]
    pub ts: DateTimeUtc,

    /// Current total PV DC power in watts
    pub pv_power_w: f64,

    /// Cumulative PV energy generated today in kWh
    pub pv_daily_kwh: Option<f64>,

    /// Battery power in watts; positive = charging, negative = discharging
    pub battery_power_w: f64,

    /// Battery state of charge in percent (0-100)
    pub battery_soc_pct: f64,

    /// Battery temperature in degrees Celsius
    pub battery_temp_c: Option<f64>,

    /// Household load power in watts
    pub load_power_w: f64,

    /// Grid export power in watts; positive = export, negative = import
    pub export_power_w: f64,

    /// Number of raw samples aggregated into this row (defaults to 1)
    pub sample_count: i32,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
