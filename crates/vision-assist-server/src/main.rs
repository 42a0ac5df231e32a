//! Vision Assist Server - WebSocket frame server for assistive navigation.
//!
//! Clients stream camera frames to `/ws` and receive one instruction list (or
//! error) per processed frame.

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;
use vision_assist_core::config::{PipelineConfig, ServerConfig};
use vision_assist_core::{ConnectionRegistry, PassthroughDetector, Pipeline, PipelineSettings};
use vision_assist_server::start_server;

#[derive(Parser, Debug)]
#[command(name = "vision-assist-server")]
#[command(about = "WebSocket frame server for Vision Assist")]
struct Args {
    /// Port to listen on (0 = auto-assign)
    #[arg(short, long, default_value_t = ServerConfig::DEFAULT_PORT)]
    port: u16,

    /// Host to bind to
    #[arg(long, default_value = ServerConfig::DEFAULT_HOST)]
    host: String,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Minimum milliseconds between processed frames on one connection
    #[arg(long, default_value_t = PipelineConfig::DEFAULT_MIN_FRAME_INTERVAL.as_millis() as u64)]
    min_interval_ms: u64,

    /// Store every annotated frame as JPEG in this directory
    #[arg(long)]
    frames_dir: Option<PathBuf>,

    /// Send the annotated frame back with each success envelope
    #[arg(long)]
    echo_frames: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Set up logging
    let log_level = if args.debug { Level::DEBUG } else { Level::INFO };
    FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(false)
        .compact()
        .init();

    info!("Starting Vision Assist Server");

    let settings = PipelineSettings {
        min_frame_interval: Duration::from_millis(args.min_interval_ms),
        echo_frames: args.echo_frames,
        frames_dir: args.frames_dir,
    };
    if let Some(dir) = &settings.frames_dir {
        info!("Storing processed frames in {}", dir.display());
    }

    let registry = Arc::new(ConnectionRegistry::new());
    let pipeline = Arc::new(Pipeline::new(
        Arc::new(PassthroughDetector),
        registry,
        settings,
    )?);

    // Start the server
    let handle = start_server(pipeline, &args.host, args.port).await?;

    // Print port for launch scripts to read (intentional stdout)
    println!("VISION_ASSIST_PORT={}", handle.addr().port());

    info!("Frame server running on ws://{}/ws", handle.addr());

    // Wait for shutdown signal
    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received, exiting");
    handle.stop().await;

    Ok(())
}
