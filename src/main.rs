//! # Sungrow Telemetry API Main Entry Point
//!
//! Entry point for the telemetry API service: loads configuration, connects
//! to the database, optionally runs migrations, and starts the server.

use clap::{Parser, Subcommand};
use migration::{Migrator, MigratorTrait};
use sea_orm::DatabaseConnection;
use sungrow_api::{config::ConfigLoader, db, server::run_server, telemetry};

#[derive(Parser)]
#[command(name = "sungrow-api")]
#[command(about = "Sungrow telemetry API service")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run database migrations
    Migrate {
        #[command(subcommand)]
        action: MigrateAction,
    },
}

#[derive(Subcommand)]
enum MigrateAction {
    /// Apply all pending migrations
    Up,
    /// Rollback the last migration
    Down,
    /// Show migration status
    Status,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = ConfigLoader::new().load()?;
    telemetry::init_tracing(&config)?;

    let db = db::init_pool(&config).await?;

    if let Some(command) = cli.command {
        match command {
            Commands::Migrate { action } => {
                handle_migrate_command(&db, action).await?;
                return Ok(());
            }
        }
    }

    // Apply migrations automatically for local and test profiles.
    if config.profile == "local" || config.profile == "test" {
        tracing::info!(profile = %config.profile, "running migrations automatically");
        Migrator::up(&db, None).await?;
        tracing::info!("migrations completed");
    }

    if let Ok(redacted_json) = config.redacted_json() {
        tracing::info!(config = %redacted_json, "configuration loaded");
    }

    run_server(config, db).await
}

async fn handle_migrate_command(
    db: &DatabaseConnection,
    action: MigrateAction,
) -> Result<(), Box<dyn std::error::Error>> {
    match action {
        MigrateAction::Up => {
            println!("Applying migrations...");
            Migrator::up(db, None).await?;
            println!("All migrations applied successfully");
        }
        MigrateAction::Down => {
            println!("Rolling back last migration...");
            Migrator::down(db, Some(1)).await?;
            println!("Migration rolled back successfully");
        }
        MigrateAction::Status => {
            println!("Checking migration status...");
            let applied = Migrator::get_applied_migrations(db).await?;
            let pending = Migrator::get_pending_migrations(db).await?;

            if applied.is_empty() {
                println!("No migrations have been applied");
            } else {
                println!("Applied migrations: {} migration(s)", applied.len());
            }

            if pending.is_empty() {
                println!("No pending migrations");
            } else {
                println!("Pending migrations: {} migration(s)", pending.len());
            }
        }
    }
    Ok(())
}
