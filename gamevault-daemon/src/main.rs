use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use gamevault_config::{ConfigLoad, ConfigLoader, ConfigSource, validate};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod app;

use app::Vault;

/// CLI entry point
#[derive(Parser, Debug)]
#[command(name = "gamevault")]
#[command(about = "Game catalog sync and metadata enrichment daemon")]
struct Cli {
    /// Config file (TOML or JSON); overrides GAMEVAULT_CONFIG_PATH
    #[arg(long)]
    config: Option<PathBuf>,

    /// Additional content root; may be repeated
    #[arg(long = "root")]
    roots: Vec<PathBuf>,

    /// Scan once, wait for enrichment to drain, then exit instead of watching
    #[arg(long, default_value_t = false)]
    once: bool,

    /// Re-enrich every entity, not only never-enriched ones
    #[arg(long, env = "GAMEVAULT_FORCE_ENRICH", default_value_t = false)]
    force_enrich: bool,

    /// JSON file the catalog is loaded from at startup and saved to on exit
    #[arg(long, env = "GAMEVAULT_CATALOG_SNAPSHOT")]
    catalog_snapshot: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let env_file_loaded = dotenvy::dotenv().map(|_| true).or_else(|err| match err {
        dotenvy::Error::Io(_) => Ok(false),
        _ => Err(err),
    })?;
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                // Override via RUST_LOG.
                "warn,gamevault=info,gamevault_core=info,gamevault_config=info".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if env_file_loaded {
        info!("loaded .env file");
    }

    let ConfigLoad {
        mut config,
        source,
        env_overrides,
    } = ConfigLoader::new()
        .with_path(cli.config.clone())
        .load()
        .context("failed to load configuration")?;
    config.roots.extend(cli.roots.iter().cloned());

    match &source {
        ConfigSource::Default => info!("no config file found; using defaults"),
        ConfigSource::Explicit(path) | ConfigSource::File(path) => {
            info!(path = %path.display(), "config loaded from file")
        }
        ConfigSource::EnvPath(path) => {
            info!(path = %path.display(), "config loaded from env path")
        }
        ConfigSource::EnvInline => info!("config loaded from inline environment json"),
    }
    if !env_overrides.is_empty() {
        info!(?env_overrides, "environment overrides applied");
    }
    for warning in validate(&config) {
        warn!(message = %warning, "configuration warning");
    }

    info!(
        roots = config.roots.len(),
        scan.max_concurrent_scans = config.scan.max_concurrent_scans,
        manifest.max_concurrent_hashes = config.manifest.max_concurrent_hashes,
        watch.debounce_secs = config.watch.debounce_secs,
        enrichment.workers = config.enrichment.workers,
        "configuration in effect"
    );

    let vault = Vault::build(config, cli.catalog_snapshot.clone()).await?;

    if cli.once {
        let report = vault.run_once(cli.force_enrich).await?;
        info!(
            directories = report.directories.len(),
            failures = report.failures(),
            "single pass complete"
        );
        return Ok(());
    }

    vault.serve(cli.force_enrich, shutdown_signal()).await
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!("failed to listen for ctrl-c: {err}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                warn!("failed to listen for SIGTERM: {err}");
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_parse() {
        let cli = Cli::try_parse_from([
            "gamevault",
            "--once",
            "--root",
            "/srv/games",
            "--root",
            "/mnt/more",
            "--catalog-snapshot",
            "/var/lib/gamevault/catalog.json",
        ])
        .unwrap();
        assert!(cli.once);
        assert_eq!(cli.roots.len(), 2);
        assert_eq!(
            cli.catalog_snapshot,
            Some(PathBuf::from("/var/lib/gamevault/catalog.json"))
        );
        assert!(cli.config.is_none());
    }
}
