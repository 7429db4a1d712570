//! falld - fall detection daemon
//!
//! This daemon:
//! 1. Loads configuration (`FALL_CONFIG` file + `FALL_*` env overrides)
//! 2. Pulls frames from the configured feed
//! 3. Runs the inference and render threads
//! 4. Offloads alert frames to the upload server
//! 5. Logs pipeline health every few seconds until Ctrl-C

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::mpsc;
use std::time::{Duration, Instant};

use fall_sentinel::{
    FeedConfig, HttpNotifier, JpegFrameEncoder, LogOverlaySink, OverlaySink, Pipeline,
    PipelineConfig, SentinelConfig, ShoulderScript, StubPoseEngine, SvgFileSink, SyntheticFeed,
    UploadQueue,
};

const HEALTH_LOG_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// JSON config file.
    #[arg(long, env = "FALL_CONFIG")]
    config: Option<PathBuf>,
    /// Feed URL (overrides config). Only stub:// feeds are built in.
    #[arg(long)]
    feed_url: Option<String>,
    /// Feed rate in frames per second (overrides config).
    #[arg(long)]
    fps: Option<u32>,
    /// Write the latest overlay to this SVG file.
    #[arg(long)]
    overlay_out: Option<PathBuf>,
    /// Stub engine: frames per scripted fall cycle (at least 2).
    #[arg(long, default_value_t = 150, value_parser = clap::value_parser!(u64).range(2..))]
    fall_every: u64,
    /// Stop after this many seconds (runs until Ctrl-C when absent).
    #[arg(long)]
    seconds: Option<u64>,
    /// Do not start the upload worker.
    #[arg(long)]
    no_upload: bool,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let mut cfg = SentinelConfig::load_from(args.config.as_deref())?;
    if let Some(url) = args.feed_url {
        cfg.feed.url = url;
    }
    if let Some(fps) = args.fps {
        if fps == 0 {
            return Err(anyhow!("fps must be >= 1"));
        }
        cfg.feed.target_fps = fps;
    }
    log::info!(
        "falld {} resolution={} threshold={:.1}px cooldown={:.1}s server={}",
        env!("CARGO_PKG_VERSION"),
        cfg.resolution,
        cfg.fall.threshold,
        cfg.fall.cooldown.as_secs_f64(),
        cfg.upload.server_url
    );

    // Frames arrive letterboxed at the model's input size.
    let inference_size = cfg.resolution.inference_size();
    let mut feed = SyntheticFeed::new(FeedConfig {
        url: cfg.feed.url.clone(),
        target_fps: cfg.feed.target_fps,
        size: inference_size,
    })?;

    let engine = StubPoseEngine::new(inference_size, fall_script(args.fall_every))?;

    let sink: Box<dyn OverlaySink> = match args.overlay_out {
        Some(path) => {
            log::info!("overlay output: {}", path.display());
            Box::new(SvgFileSink::new(path))
        }
        None => Box::new(LogOverlaySink),
    };

    let uploads = if args.no_upload {
        log::warn!("uploads disabled; alerts stay local");
        None
    } else {
        let notifier = HttpNotifier::new(&cfg.upload.server_url, cfg.upload.timeout)?;
        Some(UploadQueue::start(
            cfg.upload.capacity,
            JpegFrameEncoder::new(cfg.upload.jpeg_quality),
            notifier,
        )?)
    };

    let pipeline = Pipeline::start(
        PipelineConfig::for_resolution(cfg.resolution, cfg.fall)?,
        engine,
        sink,
        uploads,
    )?;
    let frames = pipeline.feed();

    let (tx, rx) = mpsc::channel();
    ctrlc::set_handler(move || {
        let _ = tx.send(());
    })
    .context("install Ctrl-C handler")?;

    let deadline = args
        .seconds
        .map(|secs| Instant::now() + Duration::from_secs(secs));
    let interval = feed.frame_interval();
    let mut last_health_log = Instant::now();

    log::info!("falld running. press Ctrl-C to stop");
    loop {
        if rx.try_recv().is_ok() {
            log::info!("shutdown signal received, stopping pipeline...");
            break;
        }
        if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
            log::info!("run time elapsed, stopping pipeline...");
            break;
        }
        if !pipeline.is_running() {
            break;
        }

        let frame = feed.next_frame()?;
        if !frames.publish(frame) {
            break;
        }

        if last_health_log.elapsed() >= HEALTH_LOG_INTERVAL {
            let stats = pipeline.stats();
            let feed_stats = feed.stats();
            log::info!(
                "health frames={} inferred={} rendered={} dropped={} alerts={} uploads: queued={} delivered={} failed={} full={} url={}",
                feed_stats.frames_captured,
                stats.inferred,
                stats.rendered,
                stats.capture_replaced + stats.result_replaced,
                stats.alerts,
                stats.uploads.enqueued,
                stats.uploads.delivered,
                stats.uploads.failed + stats.uploads.encode_failed,
                stats.uploads.dropped_full,
                feed_stats.url
            );
            last_health_log = Instant::now();
        }

        std::thread::sleep(interval);
    }

    pipeline.shutdown()
}

/// Scripted cycle of `fall_every` frames, the last eighth of it fallen.
fn fall_script(fall_every: u64) -> ShoulderScript {
    ShoulderScript {
        period: fall_every,
        fallen_frames: (fall_every / 8).max(1),
        ..ShoulderScript::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fall_every_below_two_is_rejected() {
        for value in ["0", "1"] {
            let err = Args::try_parse_from(["falld", "--fall-every", value]).unwrap_err();
            assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);
        }
    }

    #[test]
    fn shortest_fall_cycle_builds_stub_engine() {
        let args = Args::try_parse_from(["falld", "--fall-every", "2"]).unwrap();
        let script = fall_script(args.fall_every);
        assert_eq!(script.fallen_frames, 1);
        assert!(StubPoseEngine::new(fall_sentinel::FrameSize::new(4, 4), script).is_ok());
    }
}
