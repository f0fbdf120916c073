//! # API Types
//!
//! Request and response records for the telemetry endpoints. Field names
//! are the wire contract; validation beyond shape (finite floats, state of
//! charge bounds) lives in [`SampleIn::validate`].

use chrono::{DateTime, Utc};
use sea_orm::Set;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::models::sample;
use crate::repositories::sample::SeriesBucket;

/// Single telemetry sample submitted by an edge device.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SampleIn {
    /// Identifier of the reporting device
    pub device_id: String,
    /// Sample timestamp (UTC, RFC 3339)
    pub ts: DateTime<Utc>,
    /// PV DC power in watts
    pub pv_power_w: f64,
    /// Cumulative PV energy today in kWh
    #[serde(default)]
    pub pv_daily_kwh: Option<f64>,
    /// Battery power in watts; positive = charging
    pub battery_power_w: f64,
    /// Battery state of charge in percent
    pub battery_soc_pct: f64,
    /// Battery temperature in degrees Celsius
    #[serde(default)]
    pub battery_temp_c: Option<f64>,
    /// Household load power in watts
    pub load_power_w: f64,
    /// Grid export power in watts; positive = export
    pub export_power_w: f64,
    /// Number of raw samples this row aggregates
    #[serde(default = "default_sample_count")]
    pub sample_count: i32,
}

fn default_sample_count() -> i32 {
    1
}

impl SampleIn {
    /// Field-level validation applied after deserialization.
    pub fn validate(&self, index: usize) -> Result<(), String> {
        let finite_fields = [
            ("pv_power_w", self.pv_power_w),
            ("battery_power_w", self.battery_power_w),
            ("battery_soc_pct", self.battery_soc_pct),
            ("load_power_w", self.load_power_w),
            ("export_power_w", self.export_power_w),
        ];
        for (name, value) in finite_fields {
            if !value.is_finite() {
                return Err(format!("samples[{index}].{name} must be a finite number"));
            }
        }
        if !(0.0..=100.0).contains(&self.battery_soc_pct) {
            return Err(format!(
                "samples[{index}].battery_soc_pct must be between 0 and 100, got {}",
                self.battery_soc_pct
            ));
        }
        if self.sample_count < 1 {
            return Err(format!(
                "samples[{index}].sample_count must be >= 1, got {}",
                self.sample_count
            ));
        }
        Ok(())
    }

    pub fn into_active_model(self) -> sample::ActiveModel {
        sample::ActiveModel {
            device_id: Set(self.device_id),
            ts: Set(self.ts),
            pv_power_w: Set(self.pv_power_w),
            pv_daily_kwh: Set(self.pv_daily_kwh),
            battery_power_w: Set(self.battery_power_w),
            battery_soc_pct: Set(self.battery_soc_pct),
            battery_temp_c: Set(self.battery_temp_c),
            load_power_w: Set(self.load_power_w),
            export_power_w: Set(self.export_power_w),
            sample_count: Set(self.sample_count),
        }
    }
}

/// Batch payload for `POST /v1/ingest`.
#[derive(Debug, Deserialize, ToSchema)]
pub struct IngestPayload {
    pub samples: Vec<SampleIn>,
}

/// Response from `POST /v1/ingest`.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct IngestResponse {
    /// Count of rows actually written (duplicates excluded)
    pub inserted: u64,
}

/// Full sample as returned by `GET /v1/realtime`.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SampleOut {
    pub device_id: String,
    pub ts: DateTime<Utc>,
    pub pv_power_w: f64,
    pub pv_daily_kwh: Option<f64>,
    pub battery_power_w: f64,
    pub battery_soc_pct: f64,
    pub battery_temp_c: Option<f64>,
    pub load_power_w: f64,
    pub export_power_w: f64,
    pub sample_count: i32,
}

impl From<sample::Model> for SampleOut {
    fn from(model: sample::Model) -> Self {
        Self {
            device_id: model.device_id,
            ts: model.ts,
            pv_power_w: model.pv_power_w,
            pv_daily_kwh: model.pv_daily_kwh,
            battery_power_w: model.battery_power_w,
            battery_soc_pct: model.battery_soc_pct,
            battery_temp_c: model.battery_temp_c,
            load_power_w: model.load_power_w,
            export_power_w: model.export_power_w,
            sample_count: model.sample_count,
        }
    }
}

/// Single time bucket in a series response.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct BucketOut {
    /// Start of the time bucket (UTC)
    pub bucket: DateTime<Utc>,
    pub avg_pv_power_w: f64,
    pub max_pv_power_w: f64,
    pub avg_battery_power_w: f64,
    pub avg_battery_soc_pct: f64,
    pub avg_load_power_w: f64,
    pub avg_export_power_w: f64,
    pub sample_count: i64,
}

impl From<SeriesBucket> for BucketOut {
    fn from(row: SeriesBucket) -> Self {
        Self {
            bucket: row.bucket,
            avg_pv_power_w: row.avg_pv_power_w,
            max_pv_power_w: row.max_pv_power_w,
            avg_battery_power_w: row.avg_battery_power_w,
            avg_battery_soc_pct: row.avg_battery_soc_pct,
            avg_load_power_w: row.avg_load_power_w,
            avg_export_power_w: row.avg_export_power_w,
            sample_count: row.sample_count,
        }
    }
}

/// Response from `GET /v1/series`.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SeriesResponse {
    pub device_id: String,
    pub frame: String,
    pub series: Vec<BucketOut>,
}

/// Response from `GET /health`.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_json() -> serde_json::Value {
        serde_json::json!({
            "device_id": "inv-01",
            "ts": "2026-02-15T10:30:00Z",
            "pv_power_w": 3450.0,
            "pv_daily_kwh": 12.5,
            "battery_power_w": -1200.0,
            "battery_soc_pct": 55.5,
            "battery_temp_c": 21.3,
            "load_power_w": 800.0,
            "export_power_w": 1450.0
        })
    }

    #[test]
    fn sample_count_defaults_to_one() {
        let sample: SampleIn = serde_json::from_value(sample_json()).unwrap();
        assert_eq!(sample.sample_count, 1);
        assert!(sample.validate(0).is_ok());
    }

    #[test]
    fn nullable_fields_may_be_absent() {
        let mut value = sample_json();
        value.as_object_mut().unwrap().remove("pv_daily_kwh");
        value.as_object_mut().unwrap().remove("battery_temp_c");
        let sample: SampleIn = serde_json::from_value(value).unwrap();
        assert_eq!(sample.pv_daily_kwh, None);
        assert_eq!(sample.battery_temp_c, None);
    }

    #[test]
    fn missing_required_field_fails_deserialization() {
        let mut value = sample_json();
        value.as_object_mut().unwrap().remove("pv_power_w");
        assert!(serde_json::from_value::<SampleIn>(value).is_err());
    }

    #[test]
    fn soc_out_of_bounds_fails_validation() {
        let mut sample: SampleIn = serde_json::from_value(sample_json()).unwrap();
        sample.battery_soc_pct = 101.0;
        assert!(sample.validate(0).is_err());
        sample.battery_soc_pct = -0.1;
        assert!(sample.validate(0).is_err());
    }

    #[test]
    fn zero_sample_count_fails_validation() {
        let mut sample: SampleIn = serde_json::from_value(sample_json()).unwrap();
        sample.sample_count = 0;
        assert!(sample.validate(3).is_err());
    }

    #[test]
    fn timestamp_round_trips_rfc3339() {
        let sample: SampleIn = serde_json::from_value(sample_json()).unwrap();
        let out = serde_json::to_value(&sample).unwrap();
        assert_eq!(out["ts"], "2026-02-15T10:30:00Z");
    }
}
