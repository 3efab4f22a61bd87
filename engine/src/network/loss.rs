use ndarray::{Array2, ArrayView2};

pub fn sigmoid(z: f32) -> f32 {
    1. / (1. + (-z).exp())
}

/// The mean binary cross-entropy of `sigmoid(logits)` against `labels`,
/// computed without forming the probabilities.
pub fn bce_with_logits(logits: ArrayView2<'_, f32>, labels: &[f32]) -> f32 {
    let n = labels.len().max(1) as f32;

    logits
        .iter()
        .zip(labels)
        .map(|(&z, &y)| z.max(0.) - z * y + (-z.abs()).exp().ln_1p())
        .sum::<f32>()
        / n
}

/// The gradient of `bce_with_logits` with respect to the logits, multiplied by `scale`.
pub(super) fn bce_delta(logits: ArrayView2<'_, f32>, labels: &[f32], scale: f32) -> Array2<f32> {
    let n = labels.len().max(1) as f32;
    Array2::from_shape_fn(logits.dim(), |(i, j)| {
        (sigmoid(logits[[i, j]]) - labels[i]) * scale / n
    })
}
