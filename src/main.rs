use anyhow::{Context, Result};
use clap::Parser;
use live_transcriber::{Config, Transcriber, TranscriberEvent, WavFileSource};
use std::path::PathBuf;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Stream a WAV file to a transcription backend and print the results
#[derive(Debug, Parser)]
#[command(name = "live-transcriber", version)]
struct Args {
    /// Configuration file (TOML, JSON or YAML)
    #[arg(short, long)]
    config: Option<String>,

    /// WAV file to stream (overrides source.wav_path)
    #[arg(short, long)]
    file: Option<PathBuf>,

    /// Transcription backend endpoint (overrides transcriber.endpoint)
    #[arg(short, long)]
    endpoint: Option<String>,

    /// Longest wait for the final result when stopping, in milliseconds
    #[arg(long)]
    max_final_wait_ms: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let mut cfg = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };
    if let Some(endpoint) = args.endpoint {
        cfg.transcriber.endpoint = endpoint;
    }
    if let Some(max_wait) = args.max_final_wait_ms {
        cfg.transcriber.max_final_wait_ms = max_wait;
    }

    let wav_path = args
        .file
        .or_else(|| cfg.source.wav_path.as_ref().map(PathBuf::from))
        .context("No input file: pass --file or set source.wav_path")?;

    let source = WavFileSource::new(&wav_path)
        .frame_ms(cfg.source.frame_ms)
        .realtime(cfg.source.realtime);
    let duration = source.duration()?;

    info!("Live Transcriber v{}", env!("CARGO_PKG_VERSION"));
    info!("Endpoint: {}", cfg.transcriber.endpoint);
    info!("Input: {} ({:.1}s)", wav_path.display(), duration.as_secs_f64());

    let transcriber = Transcriber::builder(cfg.transcriber)
        .permission(source)
        .build()?;

    let mut events = transcriber.subscribe();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(TranscriberEvent::DataReceived { payload, .. }) => println!("{}", payload),
                Ok(event) => info!("Transcriber {}", event.name()),
                Err(RecvError::Lagged(skipped)) => warn!("Missed {} events", skipped),
                Err(RecvError::Closed) => break,
            }
        }
    });

    transcriber.initialize().await?;
    info!("Capturing from: {}", transcriber.device().unwrap_or_default());

    transcriber.start()?.await?;

    tokio::select! {
        _ = tokio::time::sleep(duration) => info!("Input finished"),
        _ = tokio::signal::ctrl_c() => info!("Interrupted"),
    }

    transcriber.stop().await?;
    transcriber.destroy();

    Ok(())
}
