//! Migration to create the `sungrow_samples` hypertable.
//!
//! Enables the TimescaleDB extension, creates the samples table with a
//! composite primary key `(device_id, ts)`, then converts it to a
//! hypertable partitioned on `ts` with a 7-day chunk interval.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let conn = manager.get_connection();

        conn.execute_unprepared("CREATE EXTENSION IF NOT EXISTS timescaledb")
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Samples::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Samples::DeviceId).text().not_null())
                    .col(
                        ColumnDef::new(Samples::Ts)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(ColumnDef::new(Samples::PvPowerW).double().not_null())
                    .col(ColumnDef::new(Samples::PvDailyKwh).double().null())
                    .col(ColumnDef::new(Samples::BatteryPowerW).double().not_null())
                    .col(ColumnDef::new(Samples::BatterySocPct).double().not_null())
                    .col(ColumnDef::new(Samples::BatteryTempC).double().null())
                    .col(ColumnDef::new(Samples::LoadPowerW).double().not_null())
                    .col(ColumnDef::new(Samples::ExportPowerW).double().not_null())
                    .col(
                        ColumnDef::new(Samples::SampleCount)
                            .integer()
                            .not_null()
                            .default(1),
                    )
                    .primary_key(
                        Index::create()
                            .col(Samples::DeviceId)
                            .col(Samples::Ts),
                    )
                    .to_owned(),
            )
            .await?;

        // Partition on ts with 7-day chunks; the composite PK already
        // includes the partitioning column as required by TimescaleDB.
        conn.execute_unprepared(
            "SELECT create_hypertable(\
             'sungrow_samples', 'ts', \
             chunk_time_interval => INTERVAL '7 days', \
             if_not_exists => TRUE\
             )",
        )
        .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // The timescaledb extension is left in place; other tables may use it.
        manager
            .drop_table(Table::drop().table(Samples::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Samples {
    #[sea_orm(iden = "sungrow_samples")]
    Table,
    DeviceId,
    Ts,
    PvPowerW,
    PvDailyKwh,
    BatteryPowerW,
    BatterySocPct,
    BatteryTempC,
    LoadPowerW,
    ExportPowerW,
    SampleCount,
}
