//! Migration to create the continuous aggregate rollup views.
//!
//! Creates `sungrow_hourly`, `sungrow_daily`, and `sungrow_monthly`
//! materialized views over `sungrow_samples`, plus periodic refresh
//! policies so late-arriving rows (a drained spool backlog) eventually
//! propagate into the rollups.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

/// Shared SELECT columns for all three aggregates.
const AGG_COLUMNS: &str = "\
    AVG(pv_power_w)       AS avg_pv_power_w,\n\
    MAX(pv_power_w)       AS max_pv_power_w,\n\
    AVG(battery_power_w)  AS avg_battery_power_w,\n\
    AVG(battery_soc_pct)  AS avg_battery_soc_pct,\n\
    AVG(load_power_w)     AS avg_load_power_w,\n\
    AVG(export_power_w)   AS avg_export_power_w,\n\
    SUM(sample_count)     AS sample_count";

fn create_view_sql(view_name: &str, bucket_interval: &str) -> String {
    format!(
        "CREATE MATERIALIZED VIEW {view_name}\n\
         WITH (timescaledb.continuous) AS\n\
         SELECT\n\
         device_id,\n\
         time_bucket('{bucket_interval}', ts) AS bucket,\n\
         {AGG_COLUMNS}\n\
         FROM sungrow_samples\n\
         GROUP BY device_id, bucket\n\
         WITH NO DATA"
    )
}

fn add_refresh_policy_sql(
    view_name: &str,
    start_offset: &str,
    end_offset: &str,
    schedule_interval: &str,
) -> String {
    format!(
        "SELECT add_continuous_aggregate_policy('{view_name}',\n\
         start_offset  => INTERVAL '{start_offset}',\n\
         end_offset    => INTERVAL '{end_offset}',\n\
         schedule_interval => INTERVAL '{schedule_interval}'\n\
         )"
    )
}

fn remove_refresh_policy_sql(view_name: &str) -> String {
    format!("SELECT remove_continuous_aggregate_policy('{view_name}', if_exists => TRUE)")
}

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let conn = manager.get_connection();

        conn.execute_unprepared(&create_view_sql("sungrow_hourly", "1 hour"))
            .await?;
        conn.execute_unprepared(&create_view_sql("sungrow_daily", "1 day"))
            .await?;
        conn.execute_unprepared(&create_view_sql("sungrow_monthly", "1 month"))
            .await?;

        conn.execute_unprepared(&add_refresh_policy_sql(
            "sungrow_hourly",
            "3 hours",
            "1 hour",
            "1 hour",
        ))
        .await?;
        conn.execute_unprepared(&add_refresh_policy_sql(
            "sungrow_daily",
            "3 days",
            "1 day",
            "1 day",
        ))
        .await?;
        conn.execute_unprepared(&add_refresh_policy_sql(
            "sungrow_monthly",
            "3 months",
            "1 month",
            "1 day",
        ))
        .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let conn = manager.get_connection();

        // Policies must go before their views.
        conn.execute_unprepared(&remove_refresh_policy_sql("sungrow_monthly"))
            .await?;
        conn.execute_unprepared(&remove_refresh_policy_sql("sungrow_daily"))
            .await?;
        conn.execute_unprepared(&remove_refresh_policy_sql("sungrow_hourly"))
            .await?;

        conn.execute_unprepared("DROP MATERIALIZED VIEW IF EXISTS sungrow_monthly CASCADE")
            .await?;
        conn.execute_unprepared("DROP MATERIALIZED VIEW IF EXISTS sungrow_daily CASCADE")
            .await?;
        conn.execute_unprepared("DROP MATERIALIZED VIEW IF EXISTS sungrow_hourly CASCADE")
            .await?;

        Ok(())
    }
}
