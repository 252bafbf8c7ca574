use ndarray::{Array1, ArrayView1};
use serde::{Deserialize, Serialize};

/// Predicted label and its softmax probability.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub class: String,
    pub confidence: f32,
}

/// Applies softmax to a 1D array (slice) and returns a new Array1<f32>.
pub fn softmax(slice: ArrayView1<'_, f32>) -> Array1<f32> {
    let max_val = slice.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
    let exp_vals: Array1<f32> = slice.mapv(|x| (x - max_val).exp());
    let sum_exp: f32 = exp_vals.sum();
    exp_vals.mapv(|v| v / sum_exp)
}

/// Index and value of the largest element. Ties go to the lowest index.
pub fn argmax_and_max(softmaxed: &Array1<f32>) -> (usize, f32) {
    softmaxed
        .iter()
        .enumerate()
        .fold((0, f32::NEG_INFINITY), |(max_idx, max_val), (i, &val)| {
            if val > max_val { (i, val) } else { (max_idx, max_val) }
        })
}

/// Turn one row of raw scores into a labelled prediction.
///
/// `class_names` must have one entry per score.
pub fn classify(scores: ArrayView1<'_, f32>, class_names: &[String]) -> Prediction {
    debug_assert_eq!(scores.len(), class_names.len());
    let probs = softmax(scores);
    let (idx, confidence) = argmax_and_max(&probs);
    Prediction {
        class: class_names[idx].clone(),
        confidence,
    }
}
