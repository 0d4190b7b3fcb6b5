use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::{info, warn};
use std::path::PathBuf;
use std::time::Duration;

use iqcapture::engine::{CaptureControls, CapturePipeline};
use iqcapture::nodes::BurstSource;
use iqcapture::CaptureConfig;

#[derive(Parser)]
#[command(name = "iqcapture")]
#[command(about = "Power-triggered I/Q capture", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the capture pipeline over a synthetic burst source
    Run {
        /// JSON capture configuration
        #[arg(long)]
        config: PathBuf,

        /// Stop after this many frames (runs until Ctrl-C when omitted)
        #[arg(long)]
        frames: Option<u64>,

        /// Items per generated frame
        #[arg(long, default_value = "1024")]
        frame_size: usize,

        /// Delay between frames
        #[arg(long, default_value = "10")]
        interval_ms: u64,

        /// Re-arm the trigger every N frames (0 leaves arming to the controls)
        #[arg(long, default_value = "0")]
        arm_every: u64,
    },

    /// Set the capture flag of a running pipeline
    Start {
        #[arg(long)]
        flag_dir: PathBuf,
    },

    /// Clear the capture flag of a running pipeline
    Stop {
        #[arg(long)]
        flag_dir: PathBuf,
    },

    /// Arm the level trigger of a running pipeline
    Arm {
        #[arg(long)]
        flag_dir: PathBuf,
    },

    /// Disarm the level trigger of a running pipeline
    Disarm {
        #[arg(long)]
        flag_dir: PathBuf,
    },

    /// Print both flags
    Status {
        #[arg(long)]
        flag_dir: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Run {
            config,
            frames,
            frame_size,
            interval_ms,
            arm_every,
        } => run(config, frames, frame_size, Duration::from_millis(interval_ms), arm_every).await,
        Commands::Start { flag_dir } => {
            CaptureControls::attach(flag_dir)?.start_capture();
            Ok(())
        }
        Commands::Stop { flag_dir } => {
            CaptureControls::attach(flag_dir)?.stop_capture();
            Ok(())
        }
        Commands::Arm { flag_dir } => {
            CaptureControls::attach(flag_dir)?.arm();
            Ok(())
        }
        Commands::Disarm { flag_dir } => {
            CaptureControls::attach(flag_dir)?.disarm();
            Ok(())
        }
        Commands::Status { flag_dir } => {
            let controls = CaptureControls::attach(flag_dir)?;
            println!("capturing: {}", controls.is_capturing());
            println!("armed: {}", controls.is_armed());
            Ok(())
        }
    }
}

async fn run(
    config_path: PathBuf,
    frames: Option<u64>,
    frame_size: usize,
    interval: Duration,
    arm_every: u64,
) -> Result<()> {
    let config = CaptureConfig::from_json_file(&config_path)
        .with_context(|| format!("loading {}", config_path.display()))?;

    let mut source = BurstSource::new(frame_size, config.vector_len())
        .with_sample_rate(config.samp_rate.max(1) as f64);
    let mut pipeline = CapturePipeline::from_config(&config).await?;
    let controls = pipeline.controls();
    pipeline.start()?;

    info!(
        "streaming {} items/frame, trigger level {}, captures under {}",
        frame_size,
        config.trigger.level,
        config.capture_dir.display()
    );

    let mut ticker = tokio::time::interval(interval);
    let mut sent = 0u64;
    loop {
        if frames.is_some_and(|limit| sent >= limit) {
            break;
        }
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted");
                break;
            }
            _ = ticker.tick() => {
                if arm_every > 0 && sent % arm_every == 0 {
                    controls.arm();
                }
                if let Err(e) = pipeline.push(source.next_frame()).await {
                    warn!("{}", e);
                    break;
                }
                sent += 1;
            }
        }
    }

    let result = pipeline.stop().await;

    for node in pipeline.node_metrics() {
        println!(
            "{}: {} frames, {} items, {} errors, {} us avg",
            node.node_id,
            node.frames_processed,
            node.items_processed,
            node.errors_count,
            node.avg_latency_us
        );
    }
    let captures = pipeline.capture_metrics().snapshot();
    println!(
        "captures: {} started, {} persisted, {} dropped, \
         {} storage failures, {} publish failures, {} insert failures",
        captures.captures_started,
        captures.captures_persisted,
        captures.captures_dropped,
        captures.storage_failures,
        captures.publish_failures,
        captures.insert_failures
    );

    result.map(|_| ())
}
