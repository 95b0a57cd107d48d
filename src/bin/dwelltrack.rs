use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use dwelltrack_rs::integration::opencv_backend::{
    OpenCvBackend, OpenCvStreamOpener, OpenCvYoloDetector,
};
use dwelltrack_rs::stream::{FrameCallback, StreamPoller};
use dwelltrack_rs::{AnalyzerConfig, Annotator, DetectorAdapter, Frame, VideoAnalyzer};

#[derive(Parser, Debug)]
#[command(name = "dwelltrack", about = "Person tracking and dwell-time risk scoring")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Analyze a video file and print the JSON report
    Process {
        input: PathBuf,
        /// Annotated output video; defaults to a timestamped file in the output dir
        #[arg(long, short)]
        output: Option<PathBuf>,
        #[arg(long, value_name = "PATH")]
        model: Option<PathBuf>,
        #[arg(long)]
        gpu: bool,
        #[arg(long)]
        conf: Option<f32>,
        #[arg(long)]
        iou: Option<f32>,
        #[arg(long)]
        max_distance: Option<f64>,
        #[arg(long)]
        max_frames_skip: Option<u32>,
        /// TrueType font for the track labels
        #[arg(long, value_name = "PATH")]
        font: Option<PathBuf>,
    },
    /// Poll a live stream and log every frame pulled
    Watch {
        camera_id: String,
        url: String,
        #[arg(long)]
        interval_ms: Option<u64>,
        /// Stop after this many seconds; otherwise run until the stream ends
        #[arg(long)]
        duration_secs: Option<u64>,
    },
}

fn main() -> Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let mut config = AnalyzerConfig::from_env();

    match args.command {
        Command::Process {
            input,
            output,
            model,
            gpu,
            conf,
            iou,
            max_distance,
            max_frames_skip,
            font,
        } => {
            config.model_path = model.unwrap_or(config.model_path);
            config.use_gpu |= gpu;
            config.confidence_threshold = conf.unwrap_or(config.confidence_threshold);
            config.iou_threshold = iou.unwrap_or(config.iou_threshold);
            config.max_distance = max_distance.unwrap_or(config.max_distance);
            config.max_frames_skip = max_frames_skip.unwrap_or(config.max_frames_skip);
            if font.is_some() {
                config.label_font_path = font;
            }
            process(config, input, output)
        }
        Command::Watch {
            camera_id,
            url,
            interval_ms,
            duration_secs,
        } => {
            config.frame_interval_ms = interval_ms.unwrap_or(config.frame_interval_ms);
            watch(config, camera_id, url, duration_secs.map(Duration::from_secs))?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn process(config: AnalyzerConfig, input: PathBuf, output: Option<PathBuf>) -> Result<ExitCode> {
    let annotator = match &config.label_font_path {
        Some(path) => Annotator::from_font_file(path).context("Failed to load label font")?,
        None => Annotator::default(),
    };
    let detector = DetectorAdapter::from_load(
        OpenCvYoloDetector::load(&config.model_path, config.use_gpu),
        config.detection_params(),
    );

    let mut analyzer =
        VideoAnalyzer::new(OpenCvBackend, detector, config).with_annotator(annotator);
    let response = analyzer.process_response(&input, output.as_deref());
    println!("{}", serde_json::to_string_pretty(&response)?);

    Ok(if response.success {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn watch(
    config: AnalyzerConfig,
    camera_id: String,
    url: String,
    limit: Option<Duration>,
) -> Result<()> {
    let runtime = tokio::runtime::Runtime::new().context("Failed to start tokio runtime")?;
    runtime.block_on(async move {
        let poller = StreamPoller::from_config(OpenCvStreamOpener, &config);
        let callback: FrameCallback = Arc::new(|camera_id: &str, frame: Frame| {
            info!(camera_id, width = frame.width(), height = frame.height(), "frame received");
        });
        poller.start(&camera_id, &url, callback)?;

        if let Some(limit) = limit {
            tokio::time::sleep(limit).await;
            poller.stop(&camera_id);
        }
        while poller.stats(&camera_id).is_some_and(|s| s.active) {
            tokio::time::sleep(config.frame_interval()).await;
        }

        if let Some(stats) = poller.stats(&camera_id) {
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
        Ok(())
    })
}
