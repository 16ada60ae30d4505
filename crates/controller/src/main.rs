mod actuators;
mod alerts;
mod config;
mod control;
mod db;
mod evaluator;
mod hardware;
mod health;
mod model;
mod mqtt;
mod sensors;
mod state;

use anyhow::{Context, Result};
use std::{env, path::Path, time::Duration};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use alerts::{AlertDispatcher, LogNotifier};
use config::Config;
use control::{ControlLoop, IntervalTicker};
use db::Db;
use mqtt::MqttNotifier;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // ── Config file ─────────────────────────────────────────────────
    let config_path = env::var("CONFIG_PATH").unwrap_or_else(|_| "config.toml".to_string());
    let cfg = if Path::new(&config_path).exists() {
        config::load(&config_path)?
    } else {
        warn!(path = %config_path, "config file not found, using defaults");
        let cfg = Config::default();
        cfg.validate()?;
        cfg
    };

    // ── Database ────────────────────────────────────────────────────
    let db_url = env::var("DB_URL").unwrap_or_else(|_| "sqlite:data/bloom.db?mode=rwc".to_string());
    ensure_db_dir(&db_url)?;
    let db = Db::connect(&db_url).await?;
    db.migrate().await?;
    info!(url = %db_url, "db ready");
    if let Some(last) = db.latest_snapshot().await? {
        info!(ts = last.ts, "previous run's last snapshot");
    }
    let recent = db.recent_snapshots(12).await?;
    let soil: Vec<f32> = recent.iter().filter_map(|s| s.mean_soil_moisture()).collect();
    if !soil.is_empty() {
        let avg = soil.iter().sum::<f32>() / soil.len() as f32;
        info!(samples = soil.len(), avg_soil_moisture = avg, "recent soil moisture");
    }
    if let Some(last) = db.recent_alerts(1).await?.pop() {
        info!(ts = last.ts, kind = %last.kind, message = %last.message, "previous run's last alert");
    }

    // ── Hardware ────────────────────────────────────────────────────
    let (sensors, actuators) = hardware::init(&cfg).context("hardware init failed")?;
    info!(zones = sensors.zone_count(), "hardware ready");

    // ── Alerts ──────────────────────────────────────────────────────
    let mut dispatcher = AlertDispatcher::new(Duration::from_secs(cfg.alerts.cooldown_secs))
        .with_sink(Box::new(LogNotifier));
    if let Some(mqtt) = &cfg.alerts.mqtt {
        dispatcher = dispatcher.with_sink(Box::new(MqttNotifier::connect(mqtt)));
    }

    // ── Control loop ────────────────────────────────────────────────
    let period = Duration::from_secs(cfg.timing.sensor_read_interval_secs);
    let mut ticker = IntervalTicker::new(period, shutdown_signal());
    let mut control = ControlLoop::new(cfg, sensors, actuators, dispatcher, db.clone());
    control.run(&mut ticker).await;

    db.close().await;
    Ok(())
}

/// `sqlite:data/bloom.db?mode=rwc` needs `data/` to exist before connecting.
fn ensure_db_dir(db_url: &str) -> Result<()> {
    let path = db_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:");
    let path = path.split('?').next().unwrap_or(path);
    if path.is_empty() || path == ":memory:" {
        return Ok(());
    }
    if let Some(dir) = Path::new(path).parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("failed to create db directory: {}", dir.display()))?;
    }
    Ok(())
}

/// Resolves on SIGINT or, on unix, SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("failed to listen for ctrl-c: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!("failed to listen for SIGTERM: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
