pub mod cli;
pub mod device;
pub mod error;
pub mod http;
pub mod mapping;
pub mod model;
pub mod postprocess;
pub mod preprocess;
pub mod service;

pub use crate::cli::Args;
pub use crate::device::Device;
pub use crate::error::{DecodeError, InferenceError, LabelError, ModelLoadError, PredictError};
pub use crate::http::{AppState, cors};
pub use crate::mapping::{default_class_names, load_class_names};
pub use crate::model::{Classifier, OnnxClassifier, OnnxModel, check_model_file, init_runtime};
pub use crate::postprocess::{Prediction, argmax_and_max, softmax};
pub use crate::preprocess::{PreprocessConfig, Processor};
pub use crate::service::InferenceService;
