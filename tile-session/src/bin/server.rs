use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tile_session::{ServerConfig, TileServer};
use tracing_subscriber::EnvFilter;

/// Reference tile server
///
/// Answers each tile request with a synthetic payload sized from the
/// requested bitrate, on the stream the request arrived on.
#[derive(Parser)]
#[command(name = "tile-server")]
#[command(about = "Serve synthetic video tiles over QUIC")]
struct Cli {
    /// Config file (default: ~/.config/tile-stream/server.toml)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Listen address (ip:port)
    #[arg(short, long)]
    listen: Option<String>,

    /// Set the push acknowledgement on responses
    #[arg(long)]
    push: bool,

    /// Certificate chain (PEM)
    #[arg(long, requires = "key")]
    cert: Option<PathBuf>,

    /// Private key (PEM)
    #[arg(long, requires = "cert")]
    key: Option<PathBuf>,

    /// Write the generated self-signed certificate here for clients
    #[arg(long)]
    cert_out: Option<PathBuf>,

    /// Debug logging
    #[arg(short, long)]
    verbose: bool,
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)),
        )
        .init();
}

fn quic_config(config: &ServerConfig) -> Result<quinn::ServerConfig> {
    if let (Some(cert), Some(key)) = (&config.cert, &config.key) {
        tracing::info!(cert = %cert.display(), "loading TLS certificate");
        return Ok(tile_quic::server_config_from_pem_files(cert, key)?);
    }

    tracing::info!("generating self-signed TLS certificate");
    let generated = tile_quic::generate_self_signed(vec!["localhost".to_string()])?;
    if let Some(path) = &config.cert_out {
        std::fs::write(path, &generated.cert_pem)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        tracing::info!(path = %path.display(), "wrote certificate for clients");
    }
    Ok(tile_quic::server_config(vec![generated.cert], generated.key)?)
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    tile_quic::install_crypto_provider();

    let mut config = ServerConfig::load_or_default(cli.config.as_deref())
        .context("Failed to load server config")?;
    if let Some(listen) = cli.listen {
        config.listen = listen;
    }
    if cli.push {
        config.push = true;
    }
    if cli.cert.is_some() {
        config.cert = cli.cert;
        config.key = cli.key;
    }
    if cli.cert_out.is_some() {
        config.cert_out = cli.cert_out;
    }
    config.validate()?;

    let quic = quic_config(&config)?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    runtime.block_on(async {
        let server = TileServer::bind(config, quic)?;
        tokio::select! {
            _ = server.run() => {}
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("shutting down");
                server.close();
            }
        }
        Ok::<_, anyhow::Error>(())
    })
}
