use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tile_abr::AbrAlgorithm;
use tile_session::{ClientConfig, Session};
use tracing_subscriber::EnvFilter;

/// Tile streaming client
///
/// - Connects to a tile server over QUIC with a HIGH and a LOW priority stream
/// - Requests each segment's tiles at the bitrate chosen by the ABR strategy
/// - Reassembles tiles into segments as they arrive on either stream
#[derive(Parser)]
#[command(name = "tile-client")]
#[command(about = "Stream tiled video segments with adaptive bitrate selection")]
struct Cli {
    /// Config file (default: ~/.config/tile-stream/client.toml)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Server address (host:port)
    #[arg(short, long)]
    server: Option<String>,

    /// CA certificate (PEM) used to verify the server
    #[arg(long)]
    ca_cert: Option<PathBuf>,

    /// ABR strategy: basic, basic2, buffer_occupation, channel_flow_rate, bola
    #[arg(short, long)]
    algorithm: Option<AbrAlgorithm>,

    /// Number of segments to request
    #[arg(long)]
    segments: Option<u32>,

    /// Link capacity in Mbit/s, for reporting channel usage
    #[arg(long)]
    link_mbps: Option<f64>,

    /// Write the effective config to this path and exit
    #[arg(long)]
    save_config: Option<PathBuf>,

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

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    tile_quic::install_crypto_provider();

    let mut config = ClientConfig::load_or_default(cli.config.as_deref())
        .context("Failed to load client config")?;
    if let Some(server) = cli.server {
        config.server_address = server;
    }
    if let Some(ca_cert) = cli.ca_cert {
        config.ca_cert = Some(ca_cert);
    }
    if let Some(algorithm) = cli.algorithm {
        config.algorithm = algorithm;
    }
    if let Some(segments) = cli.segments {
        config.segments = segments;
    }
    if cli.link_mbps.is_some() {
        config.link_mbps = cli.link_mbps;
    }
    config.validate()?;

    if let Some(path) = cli.save_config {
        config.save_to(&path)?;
        println!("Config written to {}", path.display());
        return Ok(());
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    let report = runtime.block_on(async {
        let session = Session::new(config)?;
        tracing::info!(client = session.client_id(), "starting client");
        session.run().await
    })?;

    println!("Client {}", report.client_id);
    println!(
        "Segments: {}/{} complete, {} played, in {:.2}s",
        report.segments_completed,
        report.segments_requested,
        report.segments_played,
        report.elapsed.as_secs_f64()
    );
    for (segment, bitrate) in &report.bitrates {
        println!("  segment {:>3}  bitrate {}", segment, bitrate);
    }
    println!(
        "Received {} at {}",
        tile_metrics::format_bytes(report.bytes),
        tile_metrics::format_rate(report.throughput_bps / 8.0)
    );
    if let Some(usage) = report.channel_usage {
        println!("Channel usage: {:.1}%", usage * 100.0);
    }
    Ok(())
}
