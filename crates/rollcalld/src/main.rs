use anyhow::{Context, Result};
use rollcall_core::config::DEFAULT_CONFIG_PATH;
use rollcall_core::{Config, OnnxFaceEngine};
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

mod dbus_interface;
mod engine;

use dbus_interface::{AttendanceService, BUS_NAME, OBJECT_PATH};

#[tokio::main]
async fn main() -> Result<()> {
    let config_path = std::env::var_os("ROLLCALL_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));
    let config = Config::load(&config_path)
        .with_context(|| format!("loading config {}", config_path.display()))?;

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.logging.level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    tracing::info!(config = %config_path.display(), "rollcalld starting");

    let face_engine = OnnxFaceEngine::load(&config).context("loading face models")?;
    let engine = engine::spawn_engine(face_engine, &config)?;

    let timeout = Duration::from_secs(config.daemon.request_timeout_secs);
    let service = AttendanceService::new(engine, timeout);

    let _connection = zbus::connection::Builder::session()?
        .name(BUS_NAME)?
        .serve_at(OBJECT_PATH, service)?
        .build()
        .await
        .context("registering on the session bus")?;

    tracing::info!(bus = BUS_NAME, path = OBJECT_PATH, "rollcalld ready");

    tokio::signal::ctrl_c().await?;
    tracing::info!("rollcalld shutting down");

    Ok(())
}
