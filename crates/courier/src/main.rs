//! # courier
//!
//! Delivery server binary: loads settings, opens the outbox, wires the
//! server together and drains it on Ctrl-C.

#![deny(unsafe_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use courier_core::logging::init_subscriber;
use courier_settings::CourierSettings;
use courier_store::{ConnectionConfig, MemoryOutbox, OutboxStore, SqliteOutbox};
use courier_server::{
    CourierServer, DeliveryConfig, JwtIdentityResolver, ServerConfig, StaticGroups,
    UnsupportedDispatcher,
};
use tracing::{info, warn};

/// Courier real-time delivery server.
#[derive(Parser, Debug)]
#[command(name = "courier", about = "Courier real-time delivery server")]
struct Cli {
    /// Host to bind (overrides settings).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind, 0 for auto-assign (overrides settings).
    #[arg(long)]
    port: Option<u16>,

    /// Settings file (defaults to `~/.courier/settings.json`).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Path to the `SQLite` outbox (overrides settings).
    #[arg(long, conflicts_with = "in_memory")]
    db_path: Option<PathBuf>,

    /// Keep pending events in memory only.
    #[arg(long)]
    in_memory: bool,
}

impl Cli {
    /// Settings from file and environment, with CLI flags applied last.
    fn settings(&self) -> Result<CourierSettings> {
        let path = self
            .config
            .clone()
            .unwrap_or_else(courier_settings::settings_path);
        let mut settings = courier_settings::load_settings_from_path(&path)
            .with_context(|| format!("Failed to load settings from {}", path.display()))?;
        if let Some(host) = &self.host {
            settings.server.host.clone_from(host);
        }
        if let Some(port) = self.port {
            settings.server.port = port;
        }
        Ok(settings)
    }

    fn db_path(&self, settings: &CourierSettings) -> PathBuf {
        self.db_path
            .clone()
            .or_else(|| settings.storage.db_path.as_ref().map(PathBuf::from))
            .unwrap_or_else(|| courier_settings::courier_home().join("outbox.db"))
    }
}

fn open_outbox(cli: &Cli, settings: &CourierSettings) -> Result<Arc<dyn OutboxStore>> {
    if cli.in_memory {
        warn!("using in-memory outbox, pending events are lost on exit");
        return Ok(Arc::new(MemoryOutbox::new()));
    }
    let path = cli.db_path(settings);
    let outbox = open_sqlite(&path)?;
    Ok(Arc::new(outbox))
}

fn open_sqlite(path: &Path) -> Result<SqliteOutbox> {
    SqliteOutbox::open(path, &ConnectionConfig::default())
        .with_context(|| format!("Failed to open outbox database: {}", path.display()))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = cli.settings()?;
    init_subscriber(&settings.logging.level, settings.logging.format);

    let secret = settings
        .auth
        .jwt_secret
        .as_deref()
        .context("auth.jwtSecret (or COURIER_JWT_SECRET) must be set")?;
    let identity = JwtIdentityResolver::new(
        secret,
        settings.auth.issuer.as_deref(),
        settings.auth.audience.as_deref(),
    );

    let outbox = open_outbox(&cli, &settings)?;
    let groups = StaticGroups::from_map(&settings.groups);
    info!(groups = groups.len(), "group membership loaded");

    let metrics = courier_server::metrics::install_recorder()
        .context("Failed to install metrics recorder")?;

    let server = CourierServer::new(
        ServerConfig::from_settings(&settings),
        DeliveryConfig::from_settings(&settings),
        outbox,
        Arc::new(groups),
        Arc::new(UnsupportedDispatcher),
        Arc::new(identity),
    )
    .with_metrics(metrics);

    let (addr, serve) = server.listen().await.context("Failed to bind listener")?;
    info!(%addr, "courier ready");

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    info!("shutdown signal received");

    if !server.drain().await {
        warn!("exiting with connections still open");
    }
    if let Err(e) = serve.await {
        warn!(error = %e, "http server task failed");
    }
    info!("courier stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_leave_settings_untouched() {
        let cli = Cli::try_parse_from(["courier"]).unwrap();
        assert!(cli.host.is_none());
        assert!(cli.port.is_none());
        assert!(!cli.in_memory);
    }

    #[test]
    fn flags_override_settings() {
        let dir = tempfile::tempdir().unwrap();
        let config = dir.path().join("settings.json");
        std::fs::write(&config, r#"{"server": {"port": 9000, "host": "10.0.0.1"}}"#).unwrap();

        let cli = Cli::try_parse_from([
            "courier",
            "--config",
            config.to_str().unwrap(),
            "--port",
            "7000",
        ])
        .unwrap();
        let settings = cli.settings().unwrap();
        assert_eq!(settings.server.port, 7000);
        assert_eq!(settings.server.host, "10.0.0.1");
    }

    #[test]
    fn db_path_precedence() {
        let mut settings = CourierSettings::default();
        let cli = Cli::try_parse_from(["courier"]).unwrap();
        assert!(cli.db_path(&settings).ends_with(".courier/outbox.db"));

        settings.storage.db_path = Some("/data/outbox.db".into());
        assert_eq!(cli.db_path(&settings), PathBuf::from("/data/outbox.db"));

        let cli = Cli::try_parse_from(["courier", "--db-path", "/tmp/x.db"]).unwrap();
        assert_eq!(cli.db_path(&settings), PathBuf::from("/tmp/x.db"));
    }

    #[test]
    fn in_memory_conflicts_with_db_path() {
        let result = Cli::try_parse_from(["courier", "--in-memory", "--db-path", "/tmp/x.db"]);
        assert!(result.is_err());
    }

    #[test]
    fn opens_sqlite_outbox_in_temp_dir() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("outbox.db");
        let _outbox = open_sqlite(&path).unwrap();
        assert!(path.exists());
    }
}
