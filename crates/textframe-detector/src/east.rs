use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use ndarray::{Array4, CowArray, IxDyn};
use once_cell::sync::OnceCell;
use ort::environment::Environment;
use ort::session::{Session, SessionBuilder};
use ort::value::Value;

use crate::{DetectionResult, TextDetectionConfig, TextDetectionError, TextDetector};
use textframe_types::RgbFrame;

const MODEL_INPUT_WIDTH: usize = 320;
const MODEL_INPUT_HEIGHT: usize = 320;
/// The model's feature maps are 1/4 resolution of its input.
const FEATURE_MAP_STRIDE: f32 = 4.0;
/// Training-time channel means, RGB order.
const CHANNEL_MEANS: [f32; 3] = [123.68, 116.78, 103.94];

/// One decoded text box in resized-frame coordinates. Ephemeral: regions
/// exist only long enough to be counted.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TextRegion {
    pub start_x: f32,
    pub start_y: f32,
    pub end_x: f32,
    pub end_y: f32,
    pub score: f32,
}

struct ModelHandle {
    _environment: Arc<Environment>,
    session: Arc<Session>,
}

struct ModelRegistry {
    environment: Arc<Environment>,
    handles: Mutex<HashMap<PathBuf, Arc<ModelHandle>>>,
}

impl ModelRegistry {
    fn new() -> Result<Self, TextDetectionError> {
        let environment = Environment::builder()
            .with_name("textframe-detector")
            .build()
            .map_err(|err| TextDetectionError::Environment(err.to_string()))?;
        Ok(Self {
            environment: Arc::new(environment),
            handles: Mutex::new(HashMap::new()),
        })
    }

    fn get(&self, path: &Path) -> Result<Arc<ModelHandle>, TextDetectionError> {
        let mut handles = self.handles.lock().expect("model registry poisoned");
        if let Some(handle) = handles.get(path) {
            return Ok(handle.clone());
        }

        let session = SessionBuilder::new(&self.environment)
            .map_err(|err| TextDetectionError::Session(err.to_string()))?
            .with_model_from_file(path)
            .map_err(|err| TextDetectionError::Session(err.to_string()))?;

        let handle = Arc::new(ModelHandle {
            _environment: Arc::clone(&self.environment),
            session: Arc::new(session),
        });
        handles.insert(path.to_path_buf(), handle.clone());
        Ok(handle)
    }
}

static MODEL_REGISTRY: OnceCell<ModelRegistry> = OnceCell::new();

fn registry() -> Result<&'static ModelRegistry, TextDetectionError> {
    MODEL_REGISTRY.get_or_try_init(ModelRegistry::new)
}

pub struct EastTextDetector {
    config: TextDetectionConfig,
    model: Arc<ModelHandle>,
}

impl EastTextDetector {
    /// Loads the model eagerly. A missing or unloadable model file fails
    /// here, before any frame is processed, never lazily on first use.
    pub fn new(config: TextDetectionConfig) -> Result<Self, TextDetectionError> {
        if !config.model_path.exists() {
            return Err(TextDetectionError::ModelNotFound {
                path: config.model_path.clone(),
            });
        }
        let model = registry()?.get(&config.model_path)?;
        Ok(Self { config, model })
    }
}

impl TextDetector for EastTextDetector {
    fn detect(&self, frame: &RgbFrame) -> Result<DetectionResult, TextDetectionError> {
        let input = prepare_input_tensor(frame);
        let (scores, geometry, rows, cols) = run_model(self.model.as_ref(), &input)?;
        let regions = decode_text_regions(
            &scores,
            &geometry,
            rows,
            cols,
            self.config.confidence_threshold,
        );
        Ok(DetectionResult {
            region_count: regions.len(),
        })
    }
}

/// Bilinear-resizes the frame to the model's square input and packs it as a
/// mean-subtracted NCHW float tensor.
fn prepare_input_tensor(frame: &RgbFrame) -> Array4<f32> {
    let src_width = frame.width() as usize;
    let src_height = frame.height() as usize;
    let stride = frame.stride();
    let data = frame.data();

    let scale_x = if MODEL_INPUT_WIDTH > 1 && src_width > 1 {
        (src_width - 1) as f32 / (MODEL_INPUT_WIDTH - 1) as f32
    } else {
        0.0
    };
    let scale_y = if MODEL_INPUT_HEIGHT > 1 && src_height > 1 {
        (src_height - 1) as f32 / (MODEL_INPUT_HEIGHT - 1) as f32
    } else {
        0.0
    };

    let area = MODEL_INPUT_WIDTH * MODEL_INPUT_HEIGHT;
    let mut tensor = vec![0f32; area * 3];
    for dy in 0..MODEL_INPUT_HEIGHT {
        let fy = scale_y * dy as f32;
        let y0 = fy.floor() as usize;
        let y1 = (y0 + 1).min(src_height.saturating_sub(1));
        let wy = fy - y0 as f32;
        for dx in 0..MODEL_INPUT_WIDTH {
            let fx = scale_x * dx as f32;
            let x0 = fx.floor() as usize;
            let x1 = (x0 + 1).min(src_width.saturating_sub(1));
            let wx = fx - x0 as f32;

            for channel in 0..3 {
                let top_left = data[y0 * stride + x0 * 3 + channel] as f32;
                let top_right = data[y0 * stride + x1 * 3 + channel] as f32;
                let bottom_left = data[y1 * stride + x0 * 3 + channel] as f32;
                let bottom_right = data[y1 * stride + x1 * 3 + channel] as f32;

                let top = top_left + (top_right - top_left) * wx;
                let bottom = bottom_left + (bottom_right - bottom_left) * wx;
                let value = top + (bottom - top) * wy;
                tensor[channel * area + dy * MODEL_INPUT_WIDTH + dx] =
                    value - CHANNEL_MEANS[channel];
            }
        }
    }
    Array4::from_shape_vec((1, 3, MODEL_INPUT_HEIGHT, MODEL_INPUT_WIDTH), tensor)
        .expect("tensor dimensions are constant")
}

fn run_model(
    model: &ModelHandle,
    input: &Array4<f32>,
) -> Result<(Vec<f32>, Vec<f32>, usize, usize), TextDetectionError> {
    let session = &model.session;
    let allocator = session.allocator();
    let input_dyn: CowArray<'_, f32, IxDyn> = CowArray::from(input.view().into_dyn());
    let value = Value::from_array(allocator, &input_dyn)
        .map_err(|err| TextDetectionError::Input(err.to_string()))?;
    let outputs = session
        .run(vec![value])
        .map_err(|err| TextDetectionError::Inference(err.to_string()))?;
    if outputs.len() < 2 {
        return Err(TextDetectionError::InvalidOutputShape);
    }

    let mut tensors = Vec::with_capacity(2);
    for output in outputs.into_iter().take(2) {
        let tensor = output
            .try_extract::<f32>()
            .map_err(|err| TextDetectionError::Inference(err.to_string()))?;
        let view = tensor.view();
        tensors.push((view.shape().to_vec(), view.iter().copied().collect::<Vec<f32>>()));
    }
    let (geometry_shape, geometry) = tensors.pop().expect("two outputs collected");
    let (score_shape, scores) = tensors.pop().expect("two outputs collected");

    let (rows, cols) = match score_shape.as_slice() {
        [1, 1, h, w] => (*h, *w),
        _ => return Err(TextDetectionError::InvalidOutputShape),
    };
    match geometry_shape.as_slice() {
        [1, 5, h, w] if *h == rows && *w == cols => {}
        _ => return Err(TextDetectionError::InvalidOutputShape),
    }
    Ok((scores, geometry, rows, cols))
}

/// Decodes the score and geometry maps into text boxes.
///
/// Per cell: `offset = (4x, 4y)`, `h = d0 + d2`, `w = d1 + d3`, the far
/// corner from the rotated distances, the near corner by subtracting the box
/// extent. Boxes stay in resized-frame coordinates and overlapping cells are
/// not suppressed; the count downstream was tuned against the raw decode.
pub fn decode_text_regions(
    scores: &[f32],
    geometry: &[f32],
    rows: usize,
    cols: usize,
    threshold: f32,
) -> Vec<TextRegion> {
    let plane = rows * cols;
    debug_assert!(scores.len() >= plane);
    debug_assert!(geometry.len() >= plane * 5);

    let mut regions = Vec::new();
    for y in 0..rows {
        for x in 0..cols {
            let idx = y * cols + x;
            let score = scores[idx];
            if score < threshold {
                continue;
            }

            let offset_x = x as f32 * FEATURE_MAP_STRIDE;
            let offset_y = y as f32 * FEATURE_MAP_STRIDE;
            let d0 = geometry[idx];
            let d1 = geometry[plane + idx];
            let d2 = geometry[2 * plane + idx];
            let d3 = geometry[3 * plane + idx];
            let angle = geometry[4 * plane + idx];
            let (sin, cos) = angle.sin_cos();

            let h = d0 + d2;
            let w = d1 + d3;
            let end_x = offset_x + cos * d1 + sin * d2;
            let end_y = offset_y - sin * d1 + cos * d2;

            regions.push(TextRegion {
                start_x: end_x - w,
                start_y: end_y - h,
                end_x,
                end_y,
                score,
            });
        }
    }
    regions
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TextDetectionConfig;

    fn geometry_map(rows: usize, cols: usize) -> Vec<f32> {
        vec![0.0; rows * cols * 5]
    }

    #[test]
    fn low_scores_decode_to_nothing() {
        let rows = 80;
        let cols = 80;
        let scores = vec![0.3f32; rows * cols];
        let geometry = geometry_map(rows, cols);
        let regions = decode_text_regions(&scores, &geometry, rows, cols, 0.6);
        assert!(regions.is_empty());
    }

    #[test]
    fn axis_aligned_cell_decodes_to_expected_box() {
        let rows = 4;
        let cols = 4;
        let plane = rows * cols;
        let mut scores = vec![0.0f32; plane];
        let mut geometry = geometry_map(rows, cols);

        // Cell (x=2, y=1), zero rotation, distances d0..d3 = 10, 20, 30, 40.
        let idx = cols + 2;
        scores[idx] = 0.9;
        geometry[idx] = 10.0;
        geometry[plane + idx] = 20.0;
        geometry[2 * plane + idx] = 30.0;
        geometry[3 * plane + idx] = 40.0;

        let regions = decode_text_regions(&scores, &geometry, rows, cols, 0.6);
        assert_eq!(regions.len(), 1);
        let region = regions[0];
        // offset = (8, 4); end = offset + (d1, d2); start = end - (w, h).
        assert_eq!(region.end_x, 28.0);
        assert_eq!(region.end_y, 34.0);
        assert_eq!(region.start_x, 28.0 - 60.0);
        assert_eq!(region.start_y, 34.0 - 40.0);
        assert_eq!(region.score, 0.9);
    }

    #[test]
    fn threshold_boundary_is_inclusive() {
        let rows = 2;
        let cols = 2;
        let mut scores = vec![0.0f32; 4];
        scores[0] = 0.6;
        scores[3] = 0.59;
        let geometry = geometry_map(rows, cols);
        let regions = decode_text_regions(&scores, &geometry, rows, cols, 0.6);
        assert_eq!(regions.len(), 1);
    }

    #[test]
    fn overlapping_cells_are_not_suppressed() {
        let rows = 2;
        let cols = 2;
        let plane = rows * cols;
        let scores = vec![0.9f32; plane];
        let mut geometry = geometry_map(rows, cols);
        for idx in 0..plane {
            geometry[idx] = 5.0;
            geometry[plane + idx] = 5.0;
            geometry[2 * plane + idx] = 5.0;
            geometry[3 * plane + idx] = 5.0;
        }
        let regions = decode_text_regions(&scores, &geometry, rows, cols, 0.6);
        assert_eq!(regions.len(), plane);
    }

    #[test]
    fn missing_model_fails_at_construction() {
        let config = TextDetectionConfig::new("/tmp/no-such-east-model.onnx");
        let result = EastTextDetector::new(config);
        assert!(matches!(
            result,
            Err(TextDetectionError::ModelNotFound { .. })
        ));
    }

    #[test]
    fn input_tensor_is_mean_subtracted() {
        let width = 8u32;
        let height = 8u32;
        let mut data = Vec::with_capacity((width * height * 3) as usize);
        for _ in 0..width * height {
            data.extend_from_slice(&[200, 150, 100]);
        }
        let frame = textframe_types::RgbFrame::from_owned(
            width,
            height,
            width as usize * 3,
            0,
            None,
            data,
        )
        .unwrap();

        let tensor = prepare_input_tensor(&frame);
        assert_eq!(tensor.shape(), &[1, 3, 320, 320]);
        let eps = 1e-3;
        assert!((tensor[[0, 0, 0, 0]] - (200.0 - 123.68)).abs() < eps);
        assert!((tensor[[0, 1, 160, 160]] - (150.0 - 116.78)).abs() < eps);
        assert!((tensor[[0, 2, 319, 319]] - (100.0 - 103.94)).abs() < eps);
    }
}
