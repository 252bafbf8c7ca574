use std::path::Path;
use std::time::Instant;

use ndarray::{Array2, Array4, ArrayView4, CowArray, Ix2};
use ort::session::Session;
use ort::session::builder::{GraphOptimizationLevel, SessionBuilder};

use crate::device::Device;
use crate::error::{InferenceError, ModelLoadError};
use crate::preprocess::PreprocessConfig;

/// A loaded, read-only image classifier.
///
/// `forward` takes a normalized `[N, 3, H, W]` batch and returns raw class
/// scores of shape `[N, num_classes]`. Implementations must not mutate any
/// state during a forward pass so that one instance can serve concurrent
/// requests.
pub trait Classifier: Send + Sync {
    fn num_classes(&self) -> usize;

    fn device(&self) -> Device;

    fn forward(&self, batch: ArrayView4<'_, f32>) -> Result<Array2<f32>, InferenceError>;
}

/// Loader for ONNX exports of the classification network.
pub struct OnnxModel {
    device: Device,
    intra_threads: Option<usize>,
}

impl OnnxModel {
    pub fn new(device: Device) -> Self {
        Self {
            device,
            intra_threads: None,
        }
    }

    pub fn with_intra_threads(mut self, threads: Option<usize>) -> Self {
        self.intra_threads = threads;
        self
    }

    /// Loads the model at `model_path` and checks that it is an image
    /// classifier with `num_classes` outputs accepting `input`-sized images.
    ///
    /// One warm-up forward pass is run before returning, so a model whose
    /// output width is only known at run time is still rejected here rather
    /// than on the first request.
    pub fn load_model(
        &self,
        model_path: &Path,
        num_classes: usize,
        input: &PreprocessConfig,
    ) -> Result<OnnxClassifier, ModelLoadError> {
        check_model_file(model_path)?;

        let runtime = |e: ort::Error| ModelLoadError::Runtime(e.to_string());
        let mut builder = SessionBuilder::new()
            .map_err(runtime)?
            .with_execution_providers([self.device.execution_provider()])
            .map_err(runtime)?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(runtime)?;
        if let Some(threads) = self.intra_threads {
            builder = builder.with_intra_threads(threads).map_err(runtime)?;
        }
        let session = builder
            .commit_from_file(model_path)
            .map_err(|e| ModelLoadError::Corrupt {
                path: model_path.to_path_buf(),
                reason: e.to_string(),
            })?;

        if session.inputs.len() != 1 {
            return Err(ModelLoadError::Architecture(format!(
                "expected a single image input, found {}",
                session.inputs.len()
            )));
        }
        let input_dims = session.inputs[0]
            .input_type
            .tensor_dimensions()
            .ok_or_else(|| ModelLoadError::Architecture("model input is not a tensor".into()))?;
        check_input_dims(input_dims, input)?;

        let output = session
            .outputs
            .first()
            .ok_or_else(|| ModelLoadError::Architecture("model has no outputs".into()))?;
        let output_dims = output
            .output_type
            .tensor_dimensions()
            .ok_or_else(|| ModelLoadError::Architecture("model output is not a tensor".into()))?;
        check_head_width(output_dims, num_classes)?;

        let input_name = session.inputs[0].name.clone();
        let output_name = output.name.clone();
        let classifier = OnnxClassifier {
            session,
            input_name,
            output_name,
            device: self.device,
            num_classes,
        };

        let t = Instant::now();
        let zeros = Array4::<f32>::zeros((1, input.channels, input.height, input.width));
        let logits = classifier
            .forward(zeros.view())
            .map_err(|e| ModelLoadError::Runtime(format!("warm-up forward pass failed: {e}")))?;
        if logits.ncols() != num_classes {
            return Err(ModelLoadError::ClassCountMismatch {
                expected: num_classes,
                actual: logits.ncols(),
            });
        }
        tracing::info!(
            device = %self.device,
            input = %classifier.input_name,
            output = %classifier.output_name,
            "model warm-up finished in {:?}",
            t.elapsed()
        );

        Ok(classifier)
    }
}

/// The runtime error for a missing file is opaque, so this runs first.
pub fn check_model_file(model_path: &Path) -> Result<(), ModelLoadError> {
    if model_path.is_file() {
        Ok(())
    } else {
        Err(ModelLoadError::Missing(model_path.to_path_buf()))
    }
}

/// Sets up the ONNX Runtime environment. With `load-dynamic` a missing or
/// incompatible runtime library panics inside `ort`, which is turned into a
/// load error here.
pub fn init_runtime() -> Result<(), ModelLoadError> {
    let committed = std::panic::catch_unwind(|| ort::init().with_name("lesion-classifier").commit())
        .map_err(|panic| {
            let reason = panic
                .downcast_ref::<String>()
                .map(String::as_str)
                .or_else(|| panic.downcast_ref::<&str>().copied())
                .unwrap_or("onnx runtime library could not be loaded");
            ModelLoadError::Runtime(reason.to_string())
        })?;
    committed.map_err(|e| ModelLoadError::Runtime(e.to_string()))?;
    Ok(())
}

/// Expects `[N, C, H, W]`, where any axis may be dynamic (negative).
pub(crate) fn check_input_dims(dims: &[i64], input: &PreprocessConfig) -> Result<(), ModelLoadError> {
    if dims.len() != 4 {
        return Err(ModelLoadError::Architecture(format!(
            "expected a 4-d image input, found shape {dims:?}"
        )));
    }
    let expected = [input.channels, input.height, input.width];
    for (axis, (&dim, want)) in dims[1..].iter().zip(expected).enumerate() {
        if dim >= 0 && dim as usize != want {
            return Err(ModelLoadError::Architecture(format!(
                "input axis {} is {dim}, expected {want} (shape {dims:?})",
                axis + 1
            )));
        }
    }
    Ok(())
}

/// Expects `[N, num_classes]`. A dynamic class axis is accepted here and
/// verified by the warm-up pass.
pub(crate) fn check_head_width(dims: &[i64], num_classes: usize) -> Result<(), ModelLoadError> {
    if dims.len() != 2 {
        return Err(ModelLoadError::Architecture(format!(
            "expected a 2-d score output, found shape {dims:?}"
        )));
    }
    let width = dims[1];
    if width >= 0 && width as usize != num_classes {
        return Err(ModelLoadError::ClassCountMismatch {
            expected: num_classes,
            actual: width as usize,
        });
    }
    Ok(())
}

/// ONNX Runtime backed classifier.
pub struct OnnxClassifier {
    session: Session,
    input_name: String,
    output_name: String,
    device: Device,
    num_classes: usize,
}

impl std::fmt::Debug for OnnxClassifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OnnxClassifier")
            .field("input", &self.input_name)
            .field("output", &self.output_name)
            .field("device", &self.device)
            .field("num_classes", &self.num_classes)
            .finish()
    }
}

impl Classifier for OnnxClassifier {
    fn num_classes(&self) -> usize {
        self.num_classes
    }

    fn device(&self) -> Device {
        self.device
    }

    // `Session::run(&self)` as of ort 2.0.0-rc.9, so no lock is needed.
    fn forward(&self, batch: ArrayView4<'_, f32>) -> Result<Array2<f32>, InferenceError> {
        let xs = CowArray::from(batch.into_dyn());
        let input_data = ort::inputs![xs.view()]?;
        let ys = self.session.run(input_data)?;
        let logits = ys[self.output_name.as_str()]
            .try_extract_tensor::<f32>()?
            .into_dimensionality::<Ix2>()?
            .to_owned();
        Ok(logits)
    }
}
