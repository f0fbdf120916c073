//! # Sample Repository
//!
//! Database operations on the `sungrow_samples` hypertable and its rollup
//! views: idempotent batch insertion, latest-sample lookup, and the
//! time-bucketed series queries behind `/v1/series`.

use sea_orm::sea_query::OnConflict;
use sea_orm::{
    ColumnTrait, ConnectionTrait, DatabaseBackend, DatabaseConnection, DbErr, EntityTrait,
    QueryFilter, QueryOrder, Statement,
};

use crate::models::sample::{self, Column as SampleColumn, Entity as Sample};

/// Time frame selecting a rollup granularity and window for series queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Frame {
    Day,
    Month,
    Year,
    All,
}

impl Frame {
    /// Accepted `frame` query values, in documentation order.
    pub const ALLOWED: [&'static str; 4] = ["day", "month", "year", "all"];

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "day" => Some(Frame::Day),
            "month" => Some(Frame::Month),
            "year" => Some(Frame::Year),
            "all" => Some(Frame::All),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Frame::Day => "day",
            Frame::Month => "month",
            Frame::Year => "year",
            Frame::All => "all",
        }
    }

    /// Maps the frame to its rollup view, bucket interval, and UTC window.
    fn spec(&self) -> FrameSpec {
        match self {
            Frame::Day => FrameSpec {
                source_view: "sungrow_hourly",
                bucket_interval: "1 hour",
                trunc_unit: Some("day"),
            },
            Frame::Month => FrameSpec {
                source_view: "sungrow_daily",
                bucket_interval: "1 day",
                trunc_unit: Some("month"),
            },
            Frame::Year => FrameSpec {
                source_view: "sungrow_monthly",
                bucket_interval: "1 month",
                trunc_unit: Some("year"),
            },
            Frame::All => FrameSpec {
                source_view: "sungrow_monthly",
                bucket_interval: "1 month",
                trunc_unit: None,
            },
        }
    }
}

struct FrameSpec {
    source_view: &'static str,
    bucket_interval: &'static str,
    /// `date_trunc` unit for the window lower bound; `None` means all-time.
    trunc_unit: Option<&'static str>,
}

/// One aggregated time bucket as returned by the series queries.
#[derive(Debug, Clone, PartialEq)]
pub struct SeriesBucket {
    pub bucket: sea_orm::prelude::DateTimeUtc,
    pub avg_pv_power_w: f64,
    pub max_pv_power_w: f64,
    pub avg_battery_power_w: f64,
    pub avg_battery_soc_pct: f64,
    pub avg_load_power_w: f64,
    pub avg_export_power_w: f64,
    pub sample_count: i64,
}

const BUCKET_COLUMNS: &str = "avg_pv_power_w, max_pv_power_w, avg_battery_power_w, \
     avg_battery_soc_pct, avg_load_power_w, avg_export_power_w, sample_count";

/// Repository for sample reads and writes.
pub struct SampleRepository<'a> {
    db: &'a DatabaseConnection,
}

impl<'a> SampleRepository<'a> {
    pub fn new(db: &'a DatabaseConnection) -> Self {
        Self { db }
    }

    /// Inserts a batch of samples, silently skipping rows whose
    /// `(device_id, ts)` already exists. Returns the number of rows actually
    /// written. The batch is a single statement, so it commits atomically.
    pub async fn insert_batch(&self, models: Vec<sample::ActiveModel>) -> Result<u64, DbErr> {
        if models.is_empty() {
            return Ok(0);
        }

        let inserted = Sample::insert_many(models)
            .on_conflict(
                OnConflict::columns([SampleColumn::DeviceId, SampleColumn::Ts])
                    .do_nothing()
                    .to_owned(),
            )
            .exec_without_returning(self.db)
            .await?;

        Ok(inserted)
    }

    /// Returns the most recent sample for a device, if any.
    pub async fn latest(&self, device_id: &str) -> Result<Option<sample::Model>, DbErr> {
        Sample::find()
            .filter(SampleColumn::DeviceId.eq(device_id))
            .order_by_desc(SampleColumn::Ts)
            .one(self.db)
            .await
    }

    /// Queries the rollup view for the requested frame, ordered by bucket
    /// ascending. When the view relation does not exist (fresh database
    /// without continuous aggregates), falls back to a `time_bucket`
    /// aggregation over the raw table; any other error propagates.
    pub async fn series(&self, device_id: &str, frame: Frame) -> Result<Vec<SeriesBucket>, DbErr> {
        let spec = frame.spec();

        match self.query_view(device_id, &spec).await {
            Ok(rows) => Ok(rows),
            Err(err) if is_undefined_relation(&err) => {
                tracing::warn!(
                    view = spec.source_view,
                    bucket = spec.bucket_interval,
                    "rollup view missing, falling back to raw time_bucket aggregation"
                );
                self.query_raw_fallback(device_id, &spec).await
            }
            Err(err) => Err(err),
        }
    }

    async fn query_view(
        &self,
        device_id: &str,
        spec: &FrameSpec,
    ) -> Result<Vec<SeriesBucket>, DbErr> {
        let mut sql = format!(
            "SELECT bucket, {BUCKET_COLUMNS} FROM {} WHERE device_id = $1",
            spec.source_view
        );
        if let Some(unit) = spec.trunc_unit {
            sql.push_str(&format!(" AND bucket >= date_trunc('{unit}', now())"));
        }
        sql.push_str(" ORDER BY bucket ASC");

        self.fetch_buckets(&sql, device_id).await
    }

    async fn query_raw_fallback(
        &self,
        device_id: &str,
        spec: &FrameSpec,
    ) -> Result<Vec<SeriesBucket>, DbErr> {
        let mut sql = format!(
            "SELECT time_bucket('{}', ts) AS bucket, \
             AVG(pv_power_w) AS avg_pv_power_w, \
             MAX(pv_power_w) AS max_pv_power_w, \
             AVG(battery_power_w) AS avg_battery_power_w, \
             AVG(battery_soc_pct) AS avg_battery_soc_pct, \
             AVG(load_power_w) AS avg_load_power_w, \
             AVG(export_power_w) AS avg_export_power_w, \
             COUNT(*) AS sample_count \
             FROM sungrow_samples WHERE device_id = $1",
            spec.bucket_interval
        );
        if let Some(unit) = spec.trunc_unit {
            sql.push_str(&format!(" AND ts >= date_trunc('{unit}', now())"));
        }
        sql.push_str(" GROUP BY device_id, bucket ORDER BY bucket ASC");

        self.fetch_buckets(&sql, device_id).await
    }

    async fn fetch_buckets(&self, sql: &str, device_id: &str) -> Result<Vec<SeriesBucket>, DbErr> {
        let stmt = Statement::from_sql_and_values(
            DatabaseBackend::Postgres,
            sql,
            [device_id.into()],
        );

        let rows = self.db.query_all(stmt).await?;
        rows.into_iter()
            .map(|row| {
                Ok(SeriesBucket {
                    bucket: row.try_get("", "bucket")?,
                    avg_pv_power_w: row.try_get("", "avg_pv_power_w")?,
                    max_pv_power_w: row.try_get("", "max_pv_power_w")?,
                    avg_battery_power_w: row.try_get("", "avg_battery_power_w")?,
                    avg_battery_soc_pct: row.try_get("", "avg_battery_soc_pct")?,
                    avg_load_power_w: row.try_get("", "avg_load_power_w")?,
                    avg_export_power_w: row.try_get("", "avg_export_power_w")?,
                    sample_count: row.try_get("", "sample_count")?,
                })
            })
            .collect()
    }
}

/// Detects the Postgres "undefined relation" condition (SQLSTATE 42P01)
/// through the driver's error message.
fn is_undefined_relation(err: &DbErr) -> bool {
    let message = err.to_string();
    message.contains("42P01") || message.contains("does not exist")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_parsing_accepts_documented_values() {
        assert_eq!(Frame::parse("day"), Some(Frame::Day));
        assert_eq!(Frame::parse("month"), Some(Frame::Month));
        assert_eq!(Frame::parse("year"), Some(Frame::Year));
        assert_eq!(Frame::parse("all"), Some(Frame::All));
        assert_eq!(Frame::parse("week"), None);
        assert_eq!(Frame::parse("DAY"), None);
    }

    #[test]
    fn frame_routing_table() {
        let day = Frame::Day.spec();
        assert_eq!(day.source_view, "sungrow_hourly");
        assert_eq!(day.bucket_interval, "1 hour");
        assert_eq!(day.trunc_unit, Some("day"));

        let month = Frame::Month.spec();
        assert_eq!(month.source_view, "sungrow_daily");
        assert_eq!(month.trunc_unit, Some("month"));

        let year = Frame::Year.spec();
        assert_eq!(year.source_view, "sungrow_monthly");
        assert_eq!(year.bucket_interval, "1 month");

        let all = Frame::All.spec();
        assert_eq!(all.source_view, "sungrow_monthly");
        assert_eq!(all.trunc_unit, None);
    }

    #[test]
    fn undefined_relation_is_detected() {
        let err = DbErr::Custom(
            "error returned from database: relation \"sungrow_hourly\" does not exist".to_string(),
        );
        assert!(is_undefined_relation(&err));

        let other = DbErr::Custom("syntax error at or near \"SELEC\"".to_string());
        assert!(!is_undefined_relation(&other));
    }
}
