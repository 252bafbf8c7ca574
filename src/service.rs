use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use crate::device::Device;
use crate::error::{InferenceError, ModelLoadError, PredictError};
use crate::model::Classifier;
use crate::postprocess::{Prediction, classify};
use crate::preprocess::Processor;

/// Everything a prediction needs, built once at startup and shared
/// read-only between requests.
#[derive(Clone)]
pub struct InferenceService {
    model: Arc<dyn Classifier>,
    processor: Processor,
    class_names: Arc<[String]>,
}

impl fmt::Debug for InferenceService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InferenceService")
            .field("device", &self.model.device())
            .field("processor", &self.processor)
            .field("class_names", &self.class_names)
            .finish()
    }
}

impl InferenceService {
    /// Fails if the classifier's output width differs from the number of
    /// class names.
    pub fn new(
        model: Arc<dyn Classifier>,
        processor: Processor,
        class_names: Vec<String>,
    ) -> Result<Self, ModelLoadError> {
        if model.num_classes() != class_names.len() {
            return Err(ModelLoadError::ClassCountMismatch {
                expected: class_names.len(),
                actual: model.num_classes(),
            });
        }
        Ok(Self {
            model,
            processor,
            class_names: class_names.into(),
        })
    }

    pub fn class_names(&self) -> &[String] {
        &self.class_names
    }

    pub fn device(&self) -> Device {
        self.model.device()
    }

    /// Decode, preprocess, score and label one uploaded image.
    pub fn predict(&self, bytes: &[u8]) -> Result<Prediction, PredictError> {
        let t = Instant::now();
        let xs = self.processor.preprocess(bytes)?;
        let preprocess_time = t.elapsed();

        let t = Instant::now();
        let logits = self.model.forward(xs.view())?;
        let model_time = t.elapsed();

        if logits.nrows() != 1 || logits.ncols() != self.class_names.len() {
            return Err(InferenceError(format!(
                "model returned scores of shape {:?}, expected [1, {}]",
                logits.shape(),
                self.class_names.len()
            ))
            .into());
        }
        let scores = logits.row(0);
        if scores.iter().any(|s| !s.is_finite()) {
            return Err(InferenceError(format!("model returned non-finite scores {scores}")).into());
        }

        let prediction = classify(scores, &self.class_names);
        tracing::debug!(
            class = %prediction.class,
            confidence = prediction.confidence,
            ?preprocess_time,
            ?model_time,
            "prediction"
        );
        Ok(prediction)
    }
}
