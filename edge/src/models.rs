//! Normalized telemetry sample model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single normalized telemetry sample from a Sungrow hybrid inverter.
///
/// All values are in engineering units after scaling and type conversion.
/// `device_id` and `ts` are injected by the caller, not derived from
/// register data, which keeps the normalizer a pure function.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub device_id: String,
    /// Sample timestamp (UTC, RFC 3339 on the wire)
    pub ts: DateTime<Utc>,
    /// Current total DC power from PV panels in watts
    pub pv_power_w: f64,
    /// PV energy generated today in kilowatt-hours
    pub pv_daily_kwh: f64,
    /// Battery power in watts; positive = charging, negative = discharging
    pub battery_power_w: f64,
    /// Battery state of charge as a percentage (0-100)
    pub battery_soc_pct: f64,
    /// Battery temperature in degrees Celsius
    pub battery_temp_c: f64,
    /// Total house load consumption in watts
    pub load_power_w: f64,
    /// Power exported to grid in watts; positive = exporting
    pub export_power_w: f64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn serializes_timestamp_as_rfc3339() {
        let sample = Sample {
            device_id: "inv-01".to_string(),
            ts: Utc.with_ymd_and_hms(2026, 2, 15, 10, 30, 0).unwrap(),
            pv_power_w: 3450.0,
            pv_daily_kwh: 12.5,
            battery_power_w: -1200.0,
            battery_soc_pct: 55.5,
            battery_temp_c: 21.3,
            load_power_w: 800.0,
            export_power_w: 1450.0,
        };
        let json = serde_json::to_value(&sample).unwrap();
        assert_eq!(json["ts"], "2026-02-15T10:30:00Z");
        assert_eq!(json["pv_power_w"], 3450.0);

        let back: Sample = serde_json::from_value(json).unwrap();
        assert_eq!(back, sample);
    }
}
