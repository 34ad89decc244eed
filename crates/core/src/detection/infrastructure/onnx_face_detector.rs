//! YOLO face detector on ONNX Runtime via `ort`.
//!
//! Implements both halves of the detection capability: `ensure_ready`
//! resolves the model file and builds the session once, `detect_all_faces`
//! runs letterboxed inference followed by confidence filtering and NMS.
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use image::RgbImage;
use tokio::sync::OnceCell;

use crate::detection::domain::detection_capability::{
    BoxError, DetectionCapability, ReadinessProvider,
};
use crate::detection::domain::face::{DetectionResult, FaceDescriptor};
use crate::imaging::domain::image_resource::ImageResource;
use crate::shared::constants::{FACE_MODEL_NAME, FACE_MODEL_URL};
use crate::shared::model_resolver::{ModelResolver, ModelSpec, ProgressFn};

/// Used when the model's input shape is dynamic.
const DEFAULT_INPUT_SIZE: u32 = 640;

pub const DEFAULT_CONFIDENCE: f32 = 0.25;

pub const DEFAULT_NMS_IOU: f32 = 0.45;

/// Letterbox fill value (YOLO convention).
const PAD_VALUE: f32 = 114.0 / 255.0;

#[derive(Clone, Debug)]
pub struct OnnxDetectorConfig {
    pub model: ModelSpec,
    pub bundled_dir: Option<PathBuf>,
    /// Overrides the platform cache directory.
    pub cache_dir: Option<PathBuf>,
    pub confidence: f32,
    pub nms_iou: f32,
    /// Called with `(downloaded, total)` while the model is fetched.
    pub download_progress: Option<fn(u64, u64)>,
}

impl Default for OnnxDetectorConfig {
    fn default() -> Self {
        Self {
            model: ModelSpec::new(FACE_MODEL_NAME, FACE_MODEL_URL),
            bundled_dir: None,
            cache_dir: None,
            confidence: DEFAULT_CONFIDENCE,
            nms_iou: DEFAULT_NMS_IOU,
            download_progress: None,
        }
    }
}

pub struct OnnxFaceDetector {
    config: OnnxDetectorConfig,
    model: OnceCell<Arc<LoadedModel>>,
}

struct LoadedModel {
    session: Mutex<ort::session::Session>,
    input_size: u32,
}

impl OnnxFaceDetector {
    pub fn new(config: OnnxDetectorConfig) -> Self {
        Self {
            config,
            model: OnceCell::new(),
        }
    }

    pub fn is_ready(&self) -> bool {
        self.model.initialized()
    }
}

#[async_trait]
impl ReadinessProvider for OnnxFaceDetector {
    /// Concurrent callers share one initialisation. A failure leaves the
    /// detector unready so a later call can try again.
    async fn ensure_ready(&self) -> Result<(), BoxError> {
        let config = self.config.clone();
        self.model
            .get_or_try_init(|| async move {
                let loaded = tokio::task::spawn_blocking(move || load_model(&config)).await??;
                Ok::<_, BoxError>(Arc::new(loaded))
            })
            .await?;
        Ok(())
    }
}

#[async_trait]
impl DetectionCapability for OnnxFaceDetector {
    async fn detect_all_faces(&self, image: &ImageResource) -> Result<DetectionResult, BoxError> {
        let model = self
            .model
            .get()
            .cloned()
            .ok_or("face detector used before it was ready")?;
        let image = image.clone();
        let (confidence, nms_iou) = (self.config.confidence, self.config.nms_iou);

        tokio::task::spawn_blocking(move || model.infer(image.pixels(), confidence, nms_iou))
            .await?
    }
}

fn load_model(config: &OnnxDetectorConfig) -> Result<LoadedModel, BoxError> {
    let resolver = match &config.cache_dir {
        Some(dir) => ModelResolver::new(dir.clone(), config.bundled_dir.clone()),
        None => ModelResolver::with_default_cache(config.bundled_dir.clone())?,
    };
    let progress = config
        .download_progress
        .map(|report| Box::new(report) as ProgressFn);
    let path = resolver.resolve(&config.model, progress)?;

    let session = ort::session::Session::builder()?
        .with_execution_providers(platform_execution_providers())?
        .commit_from_file(&path)?;
    let input_size = declared_input_size(&session).unwrap_or(DEFAULT_INPUT_SIZE);
    log::info!(
        "Face model {} loaded ({input_size}x{input_size} input)",
        path.display()
    );

    Ok(LoadedModel {
        session: Mutex::new(session),
        input_size,
    })
}

/// CoreML on macOS, DirectML on Windows. ORT falls back to CPU when the
/// provider cannot be registered.
fn platform_execution_providers() -> Vec<ort::execution_providers::ExecutionProviderDispatch> {
    #[cfg(target_os = "macos")]
    {
        vec![ort::execution_providers::CoreMLExecutionProvider::default().build()]
    }
    #[cfg(target_os = "windows")]
    {
        vec![ort::execution_providers::DirectMLExecutionProvider::default().build()]
    }
    #[cfg(not(any(target_os = "macos", target_os = "windows")))]
    {
        Vec::new()
    }
}

/// Square input side from an NCHW input shape, if the model fixes it.
fn declared_input_size(session: &ort::session::Session) -> Option<u32> {
    let input = session.inputs().first()?;
    match input.dtype() {
        ort::value::ValueType::Tensor { ref shape, .. } if shape.len() >= 4 && shape[2] > 0 => {
            Some(shape[2] as u32)
        }
        _ => None,
    }
}

impl LoadedModel {
    fn infer(
        &self,
        pixels: &RgbImage,
        confidence: f32,
        nms_iou: f32,
    ) -> Result<DetectionResult, BoxError> {
        if pixels.width() == 0 || pixels.height() == 0 {
            return Err("image has no pixels".into());
        }

        let letterbox = Letterbox::fit(pixels.width(), pixels.height(), self.input_size);
        let input = ort::value::Tensor::from_array(letterbox.tensor(pixels))?;

        let mut session = self
            .session
            .lock()
            .map_err(|_| "face detector session poisoned")?;
        let outputs = session.run(ort::inputs![input])?;
        if outputs.len() == 0 {
            return Err("face model produced no outputs".into());
        }
        let output = outputs[0].try_extract_array::<f32>()?;
        let data = output
            .as_slice()
            .ok_or("face model output is not contiguous")?;

        let candidates = parse_candidates(output.shape(), data, confidence)?;
        let faces = non_max_suppression(candidates, nms_iou)
            .iter()
            .map(|c| letterbox.to_face(c))
            .collect::<Vec<_>>();
        log::debug!("Detected {} face(s)", faces.len());
        Ok(DetectionResult::new(faces))
    }
}

/// Aspect-preserving fit of an image into a padded square.
#[derive(Clone, Copy, Debug, PartialEq)]
struct Letterbox {
    size: u32,
    scale: f32,
    pad_x: u32,
    pad_y: u32,
    src_width: u32,
    src_height: u32,
}

impl Letterbox {
    fn fit(src_width: u32, src_height: u32, size: u32) -> Self {
        let scale = (size as f32 / src_width as f32).min(size as f32 / src_height as f32);
        let fitted_w = ((src_width as f32 * scale).round() as u32).min(size);
        let fitted_h = ((src_height as f32 * scale).round() as u32).min(size);
        Self {
            size,
            scale,
            pad_x: (size - fitted_w) / 2,
            pad_y: (size - fitted_h) / 2,
            src_width,
            src_height,
        }
    }

    /// NCHW float tensor in [0, 1], nearest-neighbour sampled.
    fn tensor(&self, pixels: &RgbImage) -> ndarray::Array4<f32> {
        let s = self.size as usize;
        let mut tensor = ndarray::Array4::<f32>::from_elem((1, 3, s, s), PAD_VALUE);

        let fitted_w = self.size - 2 * self.pad_x;
        let fitted_h = self.size - 2 * self.pad_y;
        for ty in 0..fitted_h {
            let sy = ((ty as f32 / self.scale) as u32).min(self.src_height - 1);
            for tx in 0..fitted_w {
                let sx = ((tx as f32 / self.scale) as u32).min(self.src_width - 1);
                let px = pixels.get_pixel(sx, sy);
                let (y, x) = ((ty + self.pad_y) as usize, (tx + self.pad_x) as usize);
                for c in 0..3 {
                    tensor[[0, c, y, x]] = px[c] as f32 / 255.0;
                }
            }
        }
        tensor
    }

    /// Maps a model-space box back onto the source image, clamped to its bounds.
    fn to_face(&self, c: &Candidate) -> FaceDescriptor {
        let unmap = |v: f32, pad: u32, limit: u32| {
            ((v - pad as f32) / self.scale).clamp(0.0, limit as f32)
        };
        let unmap_x = |v: f32| unmap(v, self.pad_x, self.src_width);
        let unmap_y = |v: f32| unmap(v, self.pad_y, self.src_height);
        let (x1, y1) = (unmap_x(c.x1), unmap_y(c.y1));
        let (x2, y2) = (unmap_x(c.x2), unmap_y(c.y2));
        FaceDescriptor {
            x: x1,
            y: y1,
            width: x2 - x1,
            height: y2 - y1,
            confidence: c.score,
        }
    }
}

/// A detection box in letterboxed model coordinates.
#[derive(Clone, Debug, PartialEq)]
struct Candidate {
    x1: f32,
    y1: f32,
    x2: f32,
    y2: f32,
    score: f32,
}

impl Candidate {
    fn iou(&self, other: &Candidate) -> f32 {
        let iw = (self.x2.min(other.x2) - self.x1.max(other.x1)).max(0.0);
        let ih = (self.y2.min(other.y2) - self.y1.max(other.y1)).max(0.0);
        let inter = iw * ih;
        if inter == 0.0 {
            return 0.0;
        }
        let area = |c: &Candidate| (c.x2 - c.x1) * (c.y2 - c.y1);
        inter / (area(self) + area(other) - inter)
    }
}

/// Reads `[cx, cy, w, h, conf, ...]` rows from a `[1, A, B]` output.
///
/// YOLO exports are usually features-first (`A < B`); both layouts are
/// accepted. Trailing keypoint features are ignored.
fn parse_candidates(
    shape: &[usize],
    data: &[f32],
    confidence: f32,
) -> Result<Vec<Candidate>, BoxError> {
    let (rows, features, features_first) = match *shape {
        [1, a, b] if a < b => (b, a, true),
        [1, a, b] => (a, b, false),
        _ => return Err(format!("unexpected face model output shape {shape:?}").into()),
    };
    if features < 5 {
        return Err(format!("face model output has {features} features, need at least 5").into());
    }
    if data.len() < rows * features {
        return Err("face model output shorter than its shape".into());
    }

    let at = |row: usize, feature: usize| {
        if features_first {
            data[feature * rows + row]
        } else {
            data[row * features + feature]
        }
    };

    Ok((0..rows)
        .filter(|&r| at(r, 4) >= confidence)
        .map(|r| {
            let (cx, cy, w, h) = (at(r, 0), at(r, 1), at(r, 2), at(r, 3));
            Candidate {
                x1: cx - w / 2.0,
                y1: cy - h / 2.0,
                x2: cx + w / 2.0,
                y2: cy + h / 2.0,
                score: at(r, 4),
            }
        })
        .collect())
}

/// Greedy NMS: highest score first, dropping anything overlapping a kept box.
fn non_max_suppression(mut candidates: Vec<Candidate>, iou_threshold: f32) -> Vec<Candidate> {
    candidates.sort_by(|a, b| b.score.total_cmp(&a.score));
    let mut kept: Vec<Candidate> = Vec::with_capacity(candidates.len());
    for candidate in candidates {
        if kept.iter().all(|k| k.iou(&candidate) <= iou_threshold) {
            kept.push(candidate);
        }
    }
    kept
}
