//! flare detector client: entry point.
//!
//! ```text
//! flare-client webcam                   Stream the configured camera
//! flare-client video <file>             Upload a video and stream the results
//! flare-client annotate <image> [-o]    Annotate one image over HTTP
//! flare-client connect                  Just hold the connection open
//! flare-client --gen-config             Dump default config and exit
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use flare_core::{
    Admission, Collaborators, FlareError, SessionHandle, StreamingSession,
    WsConnector,
};

use flare_client::config::ClientConfig;
use flare_client::http::DetectorHttp;
use flare_client::media;
use flare_client::sink::TracingSink;
use flare_client::surface::SnapshotSurface;

// ── CLI ──────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "flare-client", about = "Fire and smoke detector client")]
struct Cli {
    /// Path to configuration TOML file.
    #[arg(short, long, default_value = "flare-client.toml")]
    config: PathBuf,

    /// Detector address (overrides config). Example: 192.168.1.20:5000
    #[arg(short, long)]
    server: Option<String>,

    /// Print the default configuration to stdout and exit.
    #[arg(long)]
    gen_config: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Stream the configured capture source until Ctrl-C.
    Webcam,
    /// Upload a video and stream the annotated output until it ends.
    Video {
        /// Video file (MP4, AVI, MOV, MKV, WMV or FLV).
        file: PathBuf,
    },
    /// Send one image for annotation and save the result.
    Annotate {
        /// Image file (JPEG, PNG, BMP or TIFF).
        image: PathBuf,
        /// Where to write the annotated image.
        #[arg(short, long, default_value = "annotated.png")]
        output: PathBuf,
    },
    /// Connect and report status until Ctrl-C.
    Connect,
}

// ── Main ─────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    if cli.gen_config {
        let text = toml::to_string_pretty(&ClientConfig::default())?;
        println!("{text}");
        return Ok(());
    }

    let mut config = ClientConfig::load(&cli.config);
    if let Some(addr) = cli.server {
        config.network.server = addr;
    }

    // Init tracing.
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("flare-client v{}", env!("CARGO_PKG_VERSION"));

    let http = Arc::new(DetectorHttp::new(
        config.http_base(),
        config.http_timeout(),
        config.upload.max_video_mb,
        config.upload.max_image_mb,
    )?);

    let command = cli.command.unwrap_or(Command::Connect);

    // ── One-shot annotation needs no session ────────────────────

    if let Command::Annotate { image, output } = &command {
        let annotated = http.annotate_image(image).await?;
        std::fs::write(output, &annotated)?;
        info!("annotated image saved to {}", output.display());
        return Ok(());
    }

    // ── 1. Build the session ────────────────────────────────────

    let (session, handle) = StreamingSession::new(
        config.session_config(),
        Collaborators {
            connector: Arc::new(WsConnector::new()),
            uploader: http.clone(),
            media: media::provider_for(&config.capture),
            surface: Box::new(SnapshotSurface::new(
                &config.render.output,
                config.render.display_width,
            )),
            status: Arc::new(TracingSink::new()),
        },
    );
    let session_task = tokio::spawn(session.run());

    // ── 2. Issue the request ────────────────────────────────────

    let slack = Duration::from_millis(config.network.pending_window_ms + 500);
    match command {
        Command::Webcam => {
            if let Some(admission) = request(handle.start_webcam().await) {
                info!("webcam {admission:?}; Ctrl-C to stop");
                wait_for_ctrl_c().await;
            }
        }
        Command::Video { file } => {
            if let Some(admission) = request(handle.start_video(file).await) {
                info!("video {admission:?}; Ctrl-C to stop");
                tokio::select! {
                    _ = wait_for_video(&handle, slack) => {}
                    _ = wait_for_ctrl_c() => {}
                }
            }
        }
        Command::Connect => wait_for_ctrl_c().await,
        Command::Annotate { .. } => {}
    }

    // ── 3. Shutdown ─────────────────────────────────────────────

    info!("shutting down");
    if handle.mode().is_streaming() {
        if let Err(e) = handle.stop().await {
            warn!("stop failed: {e}");
        }
    }
    handle.shutdown().await?;
    session_task.await?;

    Ok(())
}

fn request(result: Result<Admission, FlareError>) -> Option<Admission> {
    match result {
        Ok(admission) => Some(admission),
        Err(e) => {
            error!("request refused: {e}");
            None
        }
    }
}

/// Wait for a video session to start (allowing for a deferred start)
/// and then to return to idle.
async fn wait_for_video(handle: &SessionHandle, slack: Duration) {
    let started = tokio::time::timeout(slack, handle.wait_for_mode(|m| m.is_active())).await;
    if !matches!(started, Ok(Ok(_))) {
        warn!("video session did not start");
        return;
    }
    let _ = handle.wait_for_mode(|m| m.is_idle()).await;
    info!("video session finished");
}

async fn wait_for_ctrl_c() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("cannot listen for Ctrl-C: {e}");
    }
}
