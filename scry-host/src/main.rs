//! Scry host — entry point.
//!
//! ```text
//! scry-host                  Run in the foreground, capturing the desktop
//! scry-host --config <path>  Load a custom config TOML
//! scry-host --gen-config     Write default config to stdout
//! ```

use std::path::PathBuf;
use std::sync::mpsc;

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use scry_core::updater::ScreenUpdater;
use scry_host::config::HostConfig;
use scry_host::sink;

// ── CLI ──────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "scry-host", about = "Scry host screen-capture service")]
struct Cli {
    /// Path to configuration TOML file.
    #[arg(short, long, default_value = "scry-host.toml")]
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
        let text = toml::to_string_pretty(&HostConfig::default())?;
        println!("{text}");
        return Ok(());
    }

    // Load config.
    let config = HostConfig::load(&cli.config);

    // Init tracing.
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("scry-host v{}", env!("CARGO_PKG_VERSION"));
    info!("target FPS: {}", config.screen.fps);
    info!("encoding: {}", config.encoder.encoding);

    let updater_config = config.to_updater_config()?;

    // Events flow capture thread -> channel -> drain thread; the drain
    // acks each update so the loop keeps producing.
    let (tx, rx) = mpsc::channel();
    let updater = start_updater(updater_config, tx)?;
    let handle = updater.handle();
    let drainer = std::thread::spawn(move || sink::drain(rx, handle));

    // Ctrl-C stops the capture loop; dropping the updater joins it and
    // disconnects the drain.
    tokio::signal::ctrl_c().await.ok();
    info!("Ctrl-C received; shutting down");
    drop(updater);

    if let Ok(stats) = drainer.join() {
        info!(
            packets = stats.video_packets,
            kib = stats.video_bytes / 1024,
            cursor_shapes = stats.cursor_shapes,
            errors = stats.errors,
            "final update statistics"
        );
    }

    Ok(())
}

#[cfg(target_os = "windows")]
fn start_updater(
    config: scry_core::updater::UpdaterConfig,
    tx: mpsc::Sender<scry_core::updater::UpdateEvent>,
) -> Result<ScreenUpdater, scry_core::error::CaptureError> {
    ScreenUpdater::start(config, scry_core::gdi::GdiDesktop::new(), move |ev| {
        tx.send(ev).ok();
    })
}

#[cfg(not(target_os = "windows"))]
fn start_updater(
    config: scry_core::updater::UpdaterConfig,
    tx: mpsc::Sender<scry_core::updater::UpdateEvent>,
) -> Result<ScreenUpdater, scry_core::error::CaptureError> {
    // No live display backend on this platform; capture from an
    // in-memory desktop so the pipeline can still be exercised.
    info!("no native display backend on this platform; using a virtual desktop");
    let mut desktop = scry_core::desktop::VirtualDesktop::new(1280, 720);
    desktop.fill_rect(
        scry_core::geometry::Rect::from_size(1280, 720),
        [32, 32, 32, 255],
    );
    ScreenUpdater::start(config, desktop, move |ev| {
        tx.send(ev).ok();
    })
}
