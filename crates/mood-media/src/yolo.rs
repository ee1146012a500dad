//! In-process object detection with a YOLOv8 ONNX model.
//!
//! Execution provider selection:
//! - CUDA on Linux with NVIDIA GPU (when `cuda` feature enabled)
//! - CoreML on macOS
//! - CPU fallback on all platforms

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use image::imageops::FilterType;
use image::RgbImage;
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::{Tensor, Value};
use tracing::{debug, info};

use crate::detection::{Detection, ObjectDetector, Region};
use crate::error::{MediaError, MediaResult};
use crate::frame::Frame;

/// COCO class names (80 classes), indexed by class id.
pub const COCO_CLASSES: &[&str] = &[
    "person", "bicycle", "car", "motorcycle", "airplane", "bus", "train", "truck",
    "boat", "traffic light", "fire hydrant", "stop sign", "parking meter", "bench",
    "bird", "cat", "dog", "horse", "sheep", "cow", "elephant", "bear", "zebra",
    "giraffe", "backpack", "umbrella", "handbag", "tie", "suitcase", "frisbee",
    "skis", "snowboard", "sports ball", "kite", "baseball bat", "baseball glove",
    "skateboard", "surfboard", "tennis racket", "bottle", "wine glass", "cup",
    "fork", "knife", "spoon", "bowl", "banana", "apple", "sandwich", "orange",
    "broccoli", "carrot", "hot dog", "pizza", "donut", "cake", "chair", "couch",
    "potted plant", "bed", "dining table", "toilet", "tv", "laptop", "mouse",
    "remote", "keyboard", "cell phone", "microwave", "oven", "toaster", "sink",
    "refrigerator", "book", "clock", "vase", "scissors", "teddy bear", "hair drier",
    "toothbrush",
];

const NUM_CANDIDATES: usize = 8400;
const NUM_FEATURES: usize = 84; // 4 bbox + 80 classes

/// Configuration for the YOLOv8 detector.
#[derive(Debug, Clone)]
pub struct YoloDetectorConfig {
    pub model_path: String,
    /// Raw candidate score floor; the pipeline applies its own threshold on top
    pub score_floor: f32,
    /// IoU threshold for NMS
    pub nms_threshold: f32,
    /// Square model input size
    pub input_size: u32,
}

impl Default for YoloDetectorConfig {
    fn default() -> Self {
        Self {
            model_path: "models/yolov8n.onnx".to_string(),
            score_floor: 0.25,
            nms_threshold: 0.45,
            input_size: 640,
        }
    }
}

impl YoloDetectorConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            model_path: std::env::var("YOLO_MODEL_PATH").unwrap_or(defaults.model_path),
            ..defaults
        }
    }
}

/// YOLOv8 object detector. Inference runs on the blocking thread pool.
#[derive(Clone)]
pub struct YoloDetector {
    inner: Arc<YoloInner>,
}

struct YoloInner {
    session: Mutex<Session>,
    config: YoloDetectorConfig,
}

#[derive(Debug, Clone, Copy)]
struct Candidate {
    region: Region,
    class_id: usize,
    score: f32,
}

impl YoloDetector {
    /// Load the model. Fails if the model file is missing or invalid.
    pub fn new(config: YoloDetectorConfig) -> MediaResult<Self> {
        let model_path = Path::new(&config.model_path);
        if !model_path.exists() {
            return Err(MediaError::model_not_found(&config.model_path));
        }

        let session = create_session(model_path)?;
        info!(
            model_path = %config.model_path,
            input_size = config.input_size,
            "YOLO object detector initialized"
        );

        Ok(Self {
            inner: Arc::new(YoloInner {
                session: Mutex::new(session),
                config,
            }),
        })
    }
}

impl YoloInner {
    fn detect(&self, image: &RgbImage) -> MediaResult<Vec<Detection>> {
        let input = self.preprocess(image)?;
        let outputs = self.run_inference(input)?;
        let candidates = self.decode_candidates(&outputs)?;
        let kept = non_maximum_suppression(candidates, self.config.nms_threshold);

        debug!(count = kept.len(), "YOLO inference completed");

        Ok(kept
            .into_iter()
            .map(|c| Detection {
                label: COCO_CLASSES[c.class_id].to_string(),
                confidence: c.score,
                region: c.region,
            })
            .collect())
    }

    /// Resize to the square input, scale to [0, 1], lay out as NCHW.
    fn preprocess(&self, image: &RgbImage) -> MediaResult<Value> {
        let size = self.config.input_size;
        let resized = image::imageops::resize(image, size, size, FilterType::Triangle);
        let plane = (size * size) as usize;

        let mut chw = vec![0f32; 3 * plane];
        for (i, pixel) in resized.pixels().enumerate() {
            chw[i] = pixel[0] as f32 / 255.0;
            chw[plane + i] = pixel[1] as f32 / 255.0;
            chw[2 * plane + i] = pixel[2] as f32 / 255.0;
        }

        let shape = vec![1usize, 3, size as usize, size as usize];
        Tensor::from_array((shape, chw.into_boxed_slice()))
            .map(Value::from)
            .map_err(|e| MediaError::internal(format!("Failed to create tensor: {}", e)))
    }

    fn run_inference(&self, input: Value) -> MediaResult<Vec<f32>> {
        let mut session = self
            .session
            .lock()
            .map_err(|_| MediaError::internal("Session lock poisoned"))?;

        let outputs = session
            .run(ort::inputs![input])
            .map_err(|e| MediaError::detection_failed(format!("ONNX inference failed: {}", e)))?;

        // [1, 84, 8400]
        let output = outputs
            .get("output0")
            .ok_or_else(|| MediaError::internal("Missing output0 tensor"))?;

        let tensor = output
            .try_extract_tensor::<f32>()
            .map_err(|e| MediaError::internal(format!("Failed to extract tensor: {}", e)))?;

        Ok(tensor.1.to_vec())
    }

    /// Read the feature-major `[84, 8400]` output into scored boxes.
    ///
    /// Box coordinates are in model input pixels; normalizing by the input
    /// size gives the same [0, 1] region for the original frame.
    fn decode_candidates(&self, outputs: &[f32]) -> MediaResult<Vec<Candidate>> {
        if outputs.len() != NUM_FEATURES * NUM_CANDIDATES {
            return Err(MediaError::internal(format!(
                "Unexpected output size: expected {}, got {}",
                NUM_FEATURES * NUM_CANDIDATES,
                outputs.len()
            )));
        }

        let at = |feature: usize, candidate: usize| outputs[feature * NUM_CANDIDATES + candidate];
        let input_size = self.config.input_size as f32;
        let mut candidates = Vec::new();

        for i in 0..NUM_CANDIDATES {
            let (class_id, score) = (0..COCO_CLASSES.len())
                .map(|c| (c, at(4 + c, i)))
                .fold((0, f32::MIN), |best, cur| if cur.1 > best.1 { cur } else { best });

            if score < self.config.score_floor {
                continue;
            }

            let (cx, cy, w, h) = (at(0, i), at(1, i), at(2, i), at(3, i));
            let x = ((cx - w / 2.0) / input_size).clamp(0.0, 1.0);
            let y = ((cy - h / 2.0) / input_size).clamp(0.0, 1.0);

            candidates.push(Candidate {
                region: Region {
                    x,
                    y,
                    width: (w / input_size).min(1.0 - x),
                    height: (h / input_size).min(1.0 - y),
                },
                class_id,
                score,
            });
        }

        Ok(candidates)
    }
}

/// Per-class greedy NMS, highest score first.
fn non_maximum_suppression(mut candidates: Vec<Candidate>, iou_threshold: f32) -> Vec<Candidate> {
    candidates.sort_by(|a, b| b.score.total_cmp(&a.score));

    let mut kept: Vec<Candidate> = Vec::new();
    for candidate in candidates {
        let overlaps = kept.iter().any(|k| {
            k.class_id == candidate.class_id && iou(&k.region, &candidate.region) > iou_threshold
        });
        if !overlaps {
            kept.push(candidate);
        }
    }
    kept
}

fn iou(a: &Region, b: &Region) -> f32 {
    let inter_w = ((a.x + a.width).min(b.x + b.width) - a.x.max(b.x)).max(0.0);
    let inter_h = ((a.y + a.height).min(b.y + b.height) - a.y.max(b.y)).max(0.0);
    let intersection = inter_w * inter_h;
    let union = a.width * a.height + b.width * b.height - intersection;
    if union > 0.0 {
        intersection / union
    } else {
        0.0
    }
}

#[async_trait]
impl ObjectDetector for YoloDetector {
    async fn detect_objects(&self, frame: &Frame) -> MediaResult<Vec<Detection>> {
        let inner = Arc::clone(&self.inner);
        let image = frame.image.clone();
        tokio::task::spawn_blocking(move || inner.detect(&image))
            .await
            .map_err(|e| MediaError::internal(format!("Inference task failed: {}", e)))?
    }

    fn name(&self) -> &'static str {
        "yolov8-onnx"
    }
}

/// Create an ONNX Runtime session with automatic execution provider selection.
fn create_session(model_path: &Path) -> MediaResult<Session> {
    let model_bytes = std::fs::read(model_path)?;

    let builder = Session::builder()
        .map_err(|e| MediaError::internal(format!("Failed to create session builder: {}", e)))?
        .with_optimization_level(GraphOptimizationLevel::Level3)
        .map_err(|e| MediaError::internal(format!("Failed to set optimization level: {}", e)))?;

    #[cfg(all(target_os = "linux", feature = "cuda"))]
    {
        use ort::execution_providers::CUDAExecutionProvider;
        if let Ok(cuda_builder) = builder
            .clone()
            .with_execution_providers([CUDAExecutionProvider::default().build()])
        {
            if let Ok(session) = cuda_builder.commit_from_memory(&model_bytes) {
                info!("Using CUDA execution provider for object detection");
                return Ok(session);
            }
        }
        debug!("CUDA execution provider not available, trying alternatives");
    }

    #[cfg(target_os = "macos")]
    {
        use ort::execution_providers::CoreMLExecutionProvider;
        if let Ok(coreml_builder) = builder
            .clone()
            .with_execution_providers([CoreMLExecutionProvider::default().build()])
        {
            if let Ok(session) = coreml_builder.commit_from_memory(&model_bytes) {
                info!("Using CoreML execution provider for object detection");
                return Ok(session);
            }
        }
        debug!("CoreML execution provider not available, using CPU");
    }

    info!("Using CPU execution provider for object detection");
    builder
        .commit_from_memory(&model_bytes)
        .map_err(|e| MediaError::internal(format!("Failed to load ONNX model: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(x: f32, class_id: usize, score: f32) -> Candidate {
        Candidate {
            region: Region {
                x,
                y: 0.1,
                width: 0.2,
                height: 0.2,
            },
            class_id,
            score,
        }
    }

    #[test]
    fn test_coco_classes() {
        assert_eq!(COCO_CLASSES.len(), 80);
        assert_eq!(COCO_CLASSES[41], "cup");
    }

    #[test]
    fn test_nms_suppresses_same_class_overlap() {
        let kept = non_maximum_suppression(
            vec![candidate(0.1, 41, 0.6), candidate(0.11, 41, 0.9), candidate(0.11, 0, 0.5)],
            0.45,
        );
        assert_eq!(kept.len(), 2);
        assert!((kept[0].score - 0.9).abs() < 1e-6);
        assert_eq!(kept[1].class_id, 0);
    }

    #[test]
    fn test_iou_identical_and_disjoint() {
        let a = candidate(0.1, 0, 1.0).region;
        let b = candidate(0.7, 0, 1.0).region;
        assert!((iou(&a, &a) - 1.0).abs() < 1e-6);
        assert_eq!(iou(&a, &b), 0.0);
    }

    #[test]
    fn test_missing_model() {
        let config = YoloDetectorConfig {
            model_path: "/no/such/model.onnx".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            YoloDetector::new(config),
            Err(MediaError::ModelNotFound(_))
        ));
    }
}
