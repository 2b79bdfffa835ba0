use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::process;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use crossbeam_channel::Sender;

use turret_core::camera::infrastructure::camera_stream::CameraStream;
use turret_core::camera::infrastructure::ffmpeg_camera::FfmpegCamera;
use turret_core::detection::infrastructure::bytetrack_tracker::ByteTracker;
use turret_core::detection::infrastructure::onnx_yolo_detector::{
    OnnxYoloDetector, YoloFaceLocator, YoloFaceModel,
};
use turret_core::pipeline::frame_renderer::LogRenderer;
use turret_core::pipeline::recognition_loop::{LoopCommand, RecognitionLoop};
use turret_core::recognition::domain::embedding_extractor::EmbeddingExtractor;
use turret_core::recognition::domain::identity_database::IdentityDatabase;
use turret_core::recognition::domain::matcher::NearestNeighborMatcher;
use turret_core::recognition::domain::recognizer::{
    AttemptDispatcher, InlineDispatcher, Recognizer,
};
use turret_core::recognition::infrastructure::enrollment::enroll_directory;
use turret_core::recognition::infrastructure::onnx_arcface_extractor::OnnxArcFaceExtractor;
use turret_core::recognition::infrastructure::recognition_pool::RecognitionPool;
use turret_core::shared::config::TurretConfig;
use turret_core::shared::constants::{
    EMBEDDING_MODEL_NAME, EMBEDDING_MODEL_URL, TRACKER_MAX_LOST, YOLO_MODEL_NAME, YOLO_MODEL_URL,
};
use turret_core::shared::model_resolver::ModelResolver;
use turret_core::tracking::domain::box_stabilizer::BoxStabilizer;
use turret_core::tracking::domain::identity_resolver::IdentityResolver;

/// Live face identification against an enrolled embedding database.
#[derive(Parser)]
#[command(name = "turret")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Identify faces from a camera or video file until interrupted.
    Run(RunArgs),
    /// Build the embedding database from a directory of labeled photos.
    Enroll(EnrollArgs),
}

/// Settings shared by both subcommands. Flags override the config file.
#[derive(Args)]
struct CommonArgs {
    /// JSON config file; missing fields keep their defaults.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Directory searched for model files before the user cache.
    #[arg(long)]
    models_dir: Option<PathBuf>,

    /// Face detection confidence threshold (0.0-1.0).
    #[arg(long)]
    det_conf: Option<f64>,

    /// Run inference on the CPU even when a GPU provider is available.
    #[arg(long)]
    cpu: bool,
}

#[derive(Args)]
struct RunArgs {
    #[command(flatten)]
    common: CommonArgs,

    /// Camera device or video file.
    #[arg(long)]
    device: Option<String>,

    /// Embedding database to match against.
    #[arg(long)]
    database: Option<PathBuf>,

    /// Maximum cosine distance accepted as a match (0.0-2.0).
    #[arg(long)]
    threshold: Option<f32>,

    /// Seconds between attempts for a face that is still unknown.
    #[arg(long)]
    retry_interval: Option<f64>,

    /// Bounding box smoothing factor (0.0-1.0].
    #[arg(long)]
    alpha: Option<f64>,

    /// Recognition worker threads.
    #[arg(long)]
    workers: Option<usize>,

    /// Recognize on the processing thread instead of the worker pool.
    #[arg(long)]
    sync_recognition: bool,
}

#[derive(Args)]
struct EnrollArgs {
    #[command(flatten)]
    common: CommonArgs,

    /// Directory laid out as <images>/<person>/<photo>.
    #[arg(long)]
    images: PathBuf,

    /// Where to write the database (defaults to the configured path).
    #[arg(long)]
    output: Option<PathBuf>,
}

fn main() {
    env_logger::init();

    if let Err(e) = run() {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    match Cli::parse().command {
        Command::Run(args) => run_live(args),
        Command::Enroll(args) => run_enroll(args),
    }
}

fn run_live(args: RunArgs) -> Result<(), Box<dyn std::error::Error>> {
    let config = live_config(&args)?;
    let use_gpu = config.use_gpu;
    let (yolo_path, embedding_path) = resolve_models(&config)?;

    let database = Arc::new(IdentityDatabase::load_or_empty(&config.database_path)?);

    let extractor = build_extractor(&yolo_path, &embedding_path, &config)?;
    let recognizer = Recognizer::new(
        extractor,
        database,
        NearestNeighborMatcher::new(config.reg_conf_threshold),
    );
    let dispatcher: Box<dyn AttemptDispatcher> = if args.sync_recognition {
        Box::new(InlineDispatcher::new(recognizer))
    } else {
        Box::new(RecognitionPool::new(recognizer, config.recognition_workers))
    };
    let resolver = IdentityResolver::new(
        Box::new(BoxStabilizer::new(config.alpha)),
        dispatcher,
        config.retry_interval(),
        config.track_ttl(),
    );

    let detector = OnnxYoloDetector::new(
        YoloFaceModel::load(&yolo_path, use_gpu)?,
        ByteTracker::new(TRACKER_MAX_LOST, config.det_conf_threshold),
    );

    let cancelled = Arc::new(AtomicBool::new(false));
    let (command_tx, command_rx) = crossbeam_channel::unbounded();
    watch_ctrl_c(cancelled.clone())?;
    watch_stdin(cancelled.clone(), command_tx);

    let mut stream = CameraStream::start(
        Box::new(FfmpegCamera::new(config.camera.clone())),
        cancelled.clone(),
    )?;
    eprintln!("Running. Keys + Enter: q quit, f freeze, r resume, c clear tracks");

    let mut recognition_loop = RecognitionLoop::new(
        Box::new(detector),
        resolver,
        Box::new(LogRenderer::default()),
        config.frame_interval(),
        config.min_sleep(),
    )
    .with_commands(command_rx);
    let processed = recognition_loop.run(&stream.latest(), &cancelled);

    stream.stop();
    log::info!("Stopped after {processed} frames");
    Ok(())
}

fn run_enroll(args: EnrollArgs) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = load_config(&args.common)?;
    if let Some(output) = args.output {
        config.database_path = output;
    }
    config.validate()?;
    if !args.images.is_dir() {
        return Err(format!("Images directory not found: {}", args.images.display()).into());
    }

    let (yolo_path, embedding_path) = resolve_models(&config)?;
    let extractor = build_extractor(&yolo_path, &embedding_path, &config)?;

    let (database, summary) = enroll_directory(&args.images, extractor.as_ref())?;
    if database.is_empty() {
        return Err(format!("No faces enrolled from {}", args.images.display()).into());
    }
    database.save(&config.database_path)?;
    eprintln!(
        "Enrolled {} images ({} skipped) into {}",
        summary.enrolled,
        summary.skipped,
        config.database_path.display()
    );
    Ok(())
}

fn load_config(common: &CommonArgs) -> Result<TurretConfig, Box<dyn std::error::Error>> {
    let mut config = match &common.config {
        Some(path) => TurretConfig::load(path)?,
        None => TurretConfig::default(),
    };
    if let Some(dir) = &common.models_dir {
        config.models_dir = dir.clone();
    }
    if let Some(det_conf) = common.det_conf {
        config.det_conf_threshold = det_conf;
    }
    if common.cpu {
        config.use_gpu = false;
    }
    Ok(config)
}

fn live_config(args: &RunArgs) -> Result<TurretConfig, Box<dyn std::error::Error>> {
    let mut config = load_config(&args.common)?;
    if let Some(device) = &args.device {
        config.camera.device = device.clone();
    }
    if let Some(database) = &args.database {
        config.database_path = database.clone();
    }
    if let Some(threshold) = args.threshold {
        config.reg_conf_threshold = threshold;
    }
    if let Some(retry) = args.retry_interval {
        config.retry_interval_secs = retry;
    }
    if let Some(alpha) = args.alpha {
        config.alpha = alpha;
    }
    if let Some(workers) = args.workers {
        config.recognition_workers = workers;
    }
    config.validate()?;
    Ok(config)
}

fn resolve_models(config: &TurretConfig) -> Result<(PathBuf, PathBuf), Box<dyn std::error::Error>> {
    let resolver = ModelResolver::with_default_cache(Some(config.models_dir.clone()))?;

    log::info!("Resolving model: {YOLO_MODEL_NAME}");
    let yolo = resolver.resolve(YOLO_MODEL_NAME, YOLO_MODEL_URL, Some(Box::new(download_progress)))?;
    log::info!("Resolving model: {EMBEDDING_MODEL_NAME}");
    let embedding = resolver.resolve(
        EMBEDDING_MODEL_NAME,
        EMBEDDING_MODEL_URL,
        Some(Box::new(download_progress)),
    )?;
    eprintln!();
    Ok((yolo, embedding))
}

fn build_extractor(
    yolo_path: &Path,
    embedding_path: &Path,
    config: &TurretConfig,
) -> Result<Arc<dyn EmbeddingExtractor>, Box<dyn std::error::Error>> {
    let locator = YoloFaceLocator::new(
        YoloFaceModel::load(yolo_path, config.use_gpu)?,
        config.det_conf_threshold,
    );
    Ok(Arc::new(OnnxArcFaceExtractor::new(
        embedding_path,
        config.use_gpu,
        Box::new(locator),
    )?))
}

/// Raises `cancelled` on Ctrl-C. The watcher thread lives until process exit.
fn watch_ctrl_c(cancelled: Arc<AtomicBool>) -> Result<(), Box<dyn std::error::Error>> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    std::thread::spawn(move || {
        runtime.block_on(async {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    log::info!("Interrupt received, shutting down");
                    cancelled.store(true, Ordering::Relaxed);
                }
                Err(e) => log::warn!("Ctrl-C handler unavailable: {e}"),
            }
        });
    });
    Ok(())
}

/// Reads single-letter commands from stdin until quit or EOF.
fn watch_stdin(cancelled: Arc<AtomicBool>, commands: Sender<LoopCommand>) {
    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            let Ok(line) = line else {
                break;
            };
            match parse_key(&line) {
                Some(Key::Quit) => {
                    cancelled.store(true, Ordering::Relaxed);
                    break;
                }
                Some(Key::Command(command)) => {
                    if commands.send(command).is_err() {
                        break;
                    }
                }
                None => eprintln!("Unknown key {:?} (q, f, r, c)", line.trim()),
            }
        }
    });
}

#[derive(Debug, PartialEq)]
enum Key {
    Quit,
    Command(LoopCommand),
}

fn parse_key(line: &str) -> Option<Key> {
    match line.trim() {
        "q" | "Q" => Some(Key::Quit),
        "f" => Some(Key::Command(LoopCommand::Freeze)),
        "r" => Some(Key::Command(LoopCommand::Resume)),
        "c" => Some(Key::Command(LoopCommand::Reset)),
        _ => None,
    }
}

fn download_progress(downloaded: u64, total: u64) {
    if total > 0 {
        let pct = (downloaded as f64 / total as f64 * 100.0) as u32;
        eprint!("\rDownloading model... {pct}%");
    } else {
        eprint!("\rDownloading model... {downloaded} bytes");
    }
}
