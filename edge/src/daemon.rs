//! Daemon supervisor: two concurrent loops sharing one spool.
//!
//! The poll loop reads the inverter, normalizes, and enqueues; the upload
//! loop drains the spool toward the server. Each iteration catches its own
//! errors so a failure in one loop never terminates the other. A shutdown
//! signal cancels both loops at their next wait; the upload loop then
//! performs one final drain attempt before the process exits.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use metrics::{counter, gauge};
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

use crate::config::EdgeConfig;
use crate::health::HealthWriter;
use crate::modbus::Poller;
use crate::normalizer::normalize;
use crate::spool::Spool;
use crate::uploader::Uploader;

type SharedHealth = Arc<Mutex<HealthWriter>>;

/// Runs the daemon until a shutdown signal arrives. Returns once both loops
/// have stopped and the final drain attempt has finished.
pub async fn run(config: EdgeConfig) -> anyhow::Result<()> {
    config.log_summary();

    let spool = Spool::open(&config.spool_path)?;
    let poller = Poller::new(&config);
    let uploader = Uploader::new(
        &config.vps_base_url,
        config.vps_device_token.clone(),
        config.batch_size,
        config.max_backoff,
    )?;
    let health: SharedHealth = Arc::new(Mutex::new(HealthWriter::new(&config.health_path)));

    let shutdown = CancellationToken::new();
    spawn_signal_listener(shutdown.clone());

    tracing::info!("starting concurrent poll and upload loops");

    let poll_handle = tokio::spawn(poll_loop(
        poller,
        spool.clone(),
        config.device_id.clone(),
        config.poll_interval,
        Arc::clone(&health),
        shutdown.clone(),
    ));
    let upload_handle = tokio::spawn(upload_loop(
        uploader,
        spool,
        config.upload_interval,
        health,
        shutdown,
    ));

    let _ = poll_handle.await;
    let _ = upload_handle.await;

    tracing::info!("shutdown complete");
    Ok(())
}

fn spawn_signal_listener(shutdown: CancellationToken) {
    tokio::spawn(async move {
        let ctrl_c = tokio::signal::ctrl_c();

        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};
            match signal(SignalKind::terminate()) {
                Ok(mut sigterm) => {
                    tokio::select! {
                        _ = ctrl_c => {}
                        _ = sigterm.recv() => {}
                    }
                }
                Err(err) => {
                    tracing::warn!(error = %err, "failed to install SIGTERM handler");
                    let _ = ctrl_c.await;
                }
            }
        }
        #[cfg(not(unix))]
        {
            let _ = ctrl_c.await;
        }

        tracing::info!("received shutdown signal, initiating graceful shutdown");
        shutdown.cancel();
    });
}

async fn poll_loop(
    mut poller: Poller,
    spool: Spool,
    device_id: String,
    interval: Duration,
    health: SharedHealth,
    shutdown: CancellationToken,
) {
    tracing::info!(interval_s = interval.as_secs(), "poll loop started");

    loop {
        if shutdown.is_cancelled() {
            break;
        }

        poll_once(&mut poller, &spool, &device_id, &health).await;

        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = sleep(interval) => {}
        }
    }

    tracing::info!("poll loop stopped");
}

/// One poll-normalize-enqueue cycle. All failure paths log and return so
/// the loop is never broken.
async fn poll_once(poller: &mut Poller, spool: &Spool, device_id: &str, health: &SharedHealth) {
    match poller.poll().await {
        Ok(Some(raw)) => {
            let ts = Utc::now();
            match normalize(&raw, device_id, ts) {
                Some(sample) => match serde_json::to_string(&sample) {
                    Ok(payload) => match spool.enqueue(payload).await {
                        Ok(()) => {
                            counter!("edge_samples_enqueued_total").increment(1);
                            tracing::info!(device_id, "poll success, sample enqueued");
                        }
                        Err(err) => {
                            tracing::error!(error = %err, "failed to enqueue sample");
                        }
                    },
                    Err(err) => {
                        tracing::error!(error = %err, "failed to serialize sample");
                    }
                },
                None => {
                    tracing::warn!("normalizer rejected sample, skipping enqueue");
                }
            }
        }
        // Backoff window still open; the poller already logged it.
        Ok(None) => {}
        Err(err) => {
            tracing::warn!(error = %err, "poll failed, skipping normalize and enqueue");
        }
    }

    // Update the heartbeat after every poll attempt, success or failure.
    match spool.count().await {
        Ok(count) => {
            gauge!("edge_spool_depth").set(count as f64);
            if let Ok(mut health) = health.lock() {
                if let Err(err) = health.set_spool_count(count).and_then(|_| health.record_poll())
                {
                    tracing::warn!(error = %err, "failed to write health file");
                }
            }
        }
        Err(err) => {
            tracing::warn!(error = %err, "failed to read spool count");
        }
    }
}

async fn upload_loop(
    mut uploader: Uploader,
    spool: Spool,
    interval: Duration,
    health: SharedHealth,
    shutdown: CancellationToken,
) {
    tracing::info!(interval_s = interval.as_secs(), "upload loop started");

    loop {
        if shutdown.is_cancelled() {
            break;
        }

        if uploader.upload_once(&spool).await {
            record_upload(&spool, &health).await;
        }

        // A failed cycle waits out the backoff; a healthy one keeps the
        // configured cadence.
        let wait = interval.max(uploader.current_backoff());
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = sleep(wait) => {}
        }
    }

    // One best-effort drain so a clean shutdown does not strand a batch.
    tracing::info!("attempting final upload drain before exit");
    if uploader.upload_once(&spool).await {
        record_upload(&spool, &health).await;
    }

    tracing::info!("upload loop stopped");
}

async fn record_upload(spool: &Spool, health: &SharedHealth) {
    counter!("edge_upload_batches_total").increment(1);
    let count = spool.count().await.unwrap_or(0);
    if let Ok(mut health) = health.lock() {
        if let Err(err) = health
            .record_upload()
            .and_then(|_| health.set_spool_count(count))
        {
            tracing::warn!(error = %err, "failed to write health file");
        }
    }
}
