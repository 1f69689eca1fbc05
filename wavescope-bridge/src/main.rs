//! wavescope-bridge — entry point.
//!
//! ```text
//! wavescope-bridge                  Run in the foreground
//! wavescope-bridge --config <path>  Load a custom config TOML
//! wavescope-bridge --gen-config    Write default config to stdout
//! ```

use std::path::PathBuf;

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use wavescope_bridge::config::BridgeConfig;
use wavescope_bridge::service::BridgeService;

// ── CLI ──────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "wavescope-bridge", about = "Audio session/frame analysis bridge")]
struct Cli {
    /// Path to configuration TOML file.
    #[arg(short, long, default_value = "wavescope-bridge.toml")]
    config: PathBuf,

    /// Print the default configuration to stdout and exit.
    #[arg(long)]
    gen_config: bool,
}

// ── Main ─────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // --gen-config: dump defaults and exit.
    if cli.gen_config {
        let text = toml::to_string_pretty(&BridgeConfig::default())?;
        println!("{text}");
        return Ok(());
    }

    let config = BridgeConfig::load(&cli.config);

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("wavescope-bridge v{}", env!("CARGO_PKG_VERSION"));
    info!("ingest socket: {}", config.transport.ingest_path);
    info!("session prefix: {}", config.session.output_prefix);
    info!(
        "window: {} frames x {} samples at {} Hz",
        config.audio.frames_per_window, config.audio.samples_per_frame, config.audio.sample_rate
    );

    let service = BridgeService::new(config);
    let stop = service.stop_handle();

    // Ctrl-C handler.
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Ctrl-C received — shutting down");
        stop.store(false, std::sync::atomic::Ordering::SeqCst);
    });

    service.run().await?;

    Ok(())
}
