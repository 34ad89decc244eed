mod settings;

use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;

use clap::Parser;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use facecheck_core::decoding::domain::file_decoder::FileDecoder;
use facecheck_core::decoding::domain::raw_file::RawFile;
use facecheck_core::decoding::infrastructure::path_file::PathFile;
use facecheck_core::detection::domain::detector_gateway::DetectorGateway;
use facecheck_core::detection::infrastructure::onnx_face_detector::{
    OnnxDetectorConfig, OnnxFaceDetector,
};
use facecheck_core::imaging::domain::image_resource_manager::ImageResourceManager;
use facecheck_core::imaging::infrastructure::temp_file_locator_store::TempFileLocatorStore;
use facecheck_core::pipeline::pipeline_controller::PipelineController;
use facecheck_core::pipeline::pipeline_logger::{
    LogPipelineLogger, PipelineLogger, SummaryPipelineLogger,
};
use facecheck_core::shared::constants::mime_for_extension;

use settings::Settings;

/// Reports whether each image contains at least one human face.
///
/// Prints `<path>\t<true|false>` per input. Exits 0 when every input has a
/// face, 1 otherwise, 2 on usage or setup errors.
#[derive(Parser, Debug)]
#[command(name = "facecheck")]
struct Cli {
    /// Image files to check.
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// Face detection confidence threshold (0.0-1.0).
    #[arg(long)]
    confidence: Option<f32>,

    /// Directory searched for the face model before downloading it.
    #[arg(long)]
    model_dir: Option<PathBuf>,

    /// Give up on detector start-up after this many milliseconds.
    #[arg(long)]
    readiness_timeout_ms: Option<u64>,

    /// Give up on a single detection after this many milliseconds.
    #[arg(long)]
    detection_timeout_ms: Option<u64>,

    /// Report files larger than this as having no face without reading them.
    #[arg(long)]
    max_bytes: Option<u64>,

    /// Files checked at once (default: available CPU cores).
    #[arg(long)]
    jobs: Option<NonZeroUsize>,

    /// Print outcome counts and stage timings to stderr.
    #[arg(long)]
    summary: bool,

    /// Persist the effective options as the new defaults.
    #[arg(long)]
    save_settings: bool,
}

impl Cli {
    fn apply(&self, mut settings: Settings) -> Settings {
        if let Some(confidence) = self.confidence {
            settings.confidence = confidence;
        }
        if let Some(dir) = &self.model_dir {
            settings.model_dir = Some(dir.clone());
        }
        if self.readiness_timeout_ms.is_some() {
            settings.readiness_timeout_ms = self.readiness_timeout_ms;
        }
        if self.detection_timeout_ms.is_some() {
            settings.detection_timeout_ms = self.detection_timeout_ms;
        }
        if self.max_bytes.is_some() {
            settings.max_bytes = self.max_bytes;
        }
        settings
    }
}

#[tokio::main]
async fn main() {
    env_logger::init();
    let cli = Cli::parse();

    match run(cli).await {
        Ok(true) => process::exit(0),
        Ok(false) => process::exit(1),
        Err(e) => {
            eprintln!("Error: {e}");
            process::exit(2);
        }
    }
}

/// Returns whether every input contained a face.
async fn run(cli: Cli) -> Result<bool, Box<dyn std::error::Error>> {
    let settings = cli.apply(Settings::load());
    settings.validate()?;
    if cli.save_settings {
        settings.save();
    }

    let summary = Arc::new(SummaryPipelineLogger::new());
    let logger: Arc<dyn PipelineLogger> = if cli.summary {
        summary.clone()
    } else {
        Arc::new(LogPipelineLogger)
    };
    let controller = build_controller(&settings, logger)?;

    let jobs = cli
        .jobs
        .or_else(|| std::thread::available_parallelism().ok())
        .map_or(1, NonZeroUsize::get);
    let results = check_all(&controller, cli.inputs, settings.max_bytes, jobs).await;
    for (path, found) in &results {
        println!("{}\t{found}", path.display());
    }
    if cli.summary {
        if let Some(text) = summary.summary_string() {
            eprintln!("{text}");
        }
    }

    Ok(results.iter().all(|(_, found)| *found))
}

fn build_controller(
    settings: &Settings,
    logger: Arc<dyn PipelineLogger>,
) -> Result<PipelineController, Box<dyn std::error::Error>> {
    let store = Arc::new(TempFileLocatorStore::new()?);
    let detector = Arc::new(OnnxFaceDetector::new(OnnxDetectorConfig {
        bundled_dir: settings.model_dir.clone(),
        confidence: settings.confidence,
        download_progress: Some(download_progress),
        ..OnnxDetectorConfig::default()
    }));

    Ok(PipelineController::new(
        FileDecoder::new(),
        ImageResourceManager::new(store),
        DetectorGateway::from_backend(detector),
    )
    .with_logger(logger)
    .with_config(settings.pipeline_config()))
}

/// Checks inputs concurrently on one controller, at most `jobs` at a time.
/// Results keep input order.
async fn check_all(
    controller: &PipelineController,
    inputs: Vec<PathBuf>,
    max_bytes: Option<u64>,
    jobs: usize,
) -> Vec<(PathBuf, bool)> {
    let permits = Arc::new(Semaphore::new(jobs.max(1)));
    let mut tasks = JoinSet::new();
    for (index, path) in inputs.iter().cloned().enumerate() {
        let Ok(permit) = Arc::clone(&permits).acquire_owned().await else {
            break;
        };
        let controller = controller.clone();
        tasks.spawn(async move {
            let found = check_one(&controller, &path, max_bytes).await;
            drop(permit);
            (index, found)
        });
    }

    let mut found = vec![false; inputs.len()];
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((index, result)) => found[index] = result,
            Err(e) => log::error!("Face check task failed: {e}"),
        }
    }
    inputs.into_iter().zip(found).collect()
}

async fn check_one(controller: &PipelineController, path: &Path, max_bytes: Option<u64>) -> bool {
    if !has_image_extension(path) {
        log::warn!("{} does not look like an image, checking anyway", path.display());
    }

    let file = PathFile::new(path);
    if let (Some(limit), Some(len)) = (max_bytes, file.byte_len()) {
        if len > limit {
            log::warn!("Skipping {}: {len} bytes exceeds limit of {limit}", path.display());
            return false;
        }
    }
    controller.detect_face(&file).await
}

fn has_image_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .and_then(mime_for_extension)
        .is_some()
}

fn download_progress(downloaded: u64, total: u64) {
    if total > 0 {
        let pct = (downloaded as f64 / total as f64 * 100.0) as u32;
        eprint!("\rDownloading face detection model... {pct}%");
        if downloaded >= total {
            eprintln!();
        }
    } else {
        eprint!("\rDownloading face detection model... {downloaded} bytes");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use facecheck_core::pipeline::config::PipelineConfig;
    use facecheck_core::pipeline::pipeline_error::{FailureKind, PipelineError};
    use facecheck_core::pipeline::pipeline_state::{PipelineState, Resolution};
    use facecheck_core::shared::model_resolver::ModelSpec;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    fn offline_controller(model_dir: &Path, logger: Arc<SummaryPipelineLogger>) -> PipelineController {
        let detector = Arc::new(OnnxFaceDetector::new(OnnxDetectorConfig {
            cache_dir: Some(model_dir.to_path_buf()),
            bundled_dir: None,
            model: ModelSpec::new("missing.onnx", "file:///nonexistent/missing.onnx"),
            ..OnnxDetectorConfig::default()
        }));
        PipelineController::new(
            FileDecoder::new(),
            ImageResourceManager::new(Arc::new(TempFileLocatorStore::new().unwrap())),
            DetectorGateway::from_backend(detector),
        )
        .with_logger(logger)
        .with_config(PipelineConfig::default())
    }

    #[test]
    fn test_parses_flags() {
        let cli = Cli::try_parse_from([
            "facecheck",
            "a.jpg",
            "b.png",
            "--confidence",
            "0.4",
            "--max-bytes",
            "2048",
            "--summary",
        ])
        .unwrap();

        assert_eq!(cli.inputs, vec![PathBuf::from("a.jpg"), PathBuf::from("b.png")]);
        assert_eq!(cli.confidence, Some(0.4));
        assert_eq!(cli.max_bytes, Some(2048));
        assert!(cli.summary);
        assert!(!cli.save_settings);
        assert_eq!(cli.jobs, None);
    }

    #[test]
    fn test_rejects_zero_jobs() {
        assert!(Cli::try_parse_from(["facecheck", "a.jpg", "--jobs", "0"]).is_err());
        let cli = Cli::try_parse_from(["facecheck", "a.jpg", "--jobs", "3"]).unwrap();
        assert_eq!(cli.jobs.map(NonZeroUsize::get), Some(3));
    }

    #[test]
    fn test_requires_an_input() {
        assert!(Cli::try_parse_from(["facecheck"]).is_err());
    }

    #[test]
    fn test_flags_override_settings() {
        let cli = Cli::try_parse_from([
            "facecheck",
            "a.jpg",
            "--detection-timeout-ms",
            "250",
        ])
        .unwrap();
        let stored = Settings {
            confidence: 0.7,
            detection_timeout_ms: Some(9000),
            max_bytes: Some(10),
            ..Settings::default()
        };

        let effective = cli.apply(stored);

        assert_eq!(effective.confidence, 0.7);
        assert_eq!(effective.detection_timeout_ms, Some(250));
        assert_eq!(effective.max_bytes, Some(10));
    }

    #[test]
    fn test_has_image_extension() {
        assert!(has_image_extension(Path::new("photo.JPG")));
        assert!(has_image_extension(Path::new("dir/scan.png")));
        assert!(!has_image_extension(Path::new("notes.txt")));
        assert!(!has_image_extension(Path::new("README")));
    }

    #[tokio::test]
    async fn test_oversized_file_skips_pipeline() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("big.jpg");
        std::fs::write(&path, vec![0u8; 64]).unwrap();
        let logger = Arc::new(SummaryPipelineLogger::new());
        let controller = offline_controller(tmp.path(), logger.clone());

        assert!(!check_one(&controller, &path, Some(16)).await);
        assert_eq!(logger.total(), 0);
    }

    #[tokio::test]
    async fn test_check_all_keeps_input_order() {
        let tmp = TempDir::new().unwrap();
        let empty = tmp.path().join("empty.png");
        let text = tmp.path().join("notes.txt");
        std::fs::write(&empty, b"").unwrap();
        std::fs::write(&text, b"hello").unwrap();
        let missing = tmp.path().join("missing.jpg");
        let logger = Arc::new(SummaryPipelineLogger::new());
        let controller = offline_controller(tmp.path(), logger.clone());

        let results = check_all(
            &controller,
            vec![text.clone(), missing.clone(), empty.clone()],
            None,
            2,
        )
        .await;

        assert_eq!(results, vec![(text, false), (missing, false), (empty, false)]);
        assert_eq!(logger.failures(FailureKind::Decode), 2);
        assert_eq!(logger.failures(FailureKind::ImageLoad), 1);
    }

    /// Tracks how many invocations are between start and resolution.
    #[derive(Default)]
    struct InFlightLogger {
        current: AtomicUsize,
        peak: AtomicUsize,
        resolved: AtomicUsize,
    }

    impl PipelineLogger for InFlightLogger {
        fn transition(&self, from: PipelineState, _to: PipelineState) {
            if from == PipelineState::Idle {
                let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
                self.peak.fetch_max(now, Ordering::SeqCst);
            }
        }

        fn timing(&self, _stage: &str, _duration_ms: f64) {}

        fn failure(&self, _error: &PipelineError) {}

        fn resolved(&self, _resolution: Resolution) {
            self.current.fetch_sub(1, Ordering::SeqCst);
            self.resolved.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_check_all_bounds_in_flight_checks() {
        let tmp = TempDir::new().unwrap();
        let inputs: Vec<PathBuf> = (0..8)
            .map(|i| {
                let path = tmp.path().join(format!("noise-{i}.png"));
                std::fs::write(&path, vec![i as u8; 4096]).unwrap();
                path
            })
            .collect();
        let logger = Arc::new(InFlightLogger::default());
        let controller = offline_controller(tmp.path(), Arc::new(SummaryPipelineLogger::new()))
            .with_logger(logger.clone());

        let results = check_all(&controller, inputs.clone(), None, 2).await;

        assert_eq!(results.len(), inputs.len());
        assert!(results.iter().all(|(_, found)| !found));
        assert_eq!(logger.resolved.load(Ordering::SeqCst), 8);
        assert!(logger.peak.load(Ordering::SeqCst) <= 2);
    }
}
