//! Weighted mean of embedding vectors.

use super::Embedding;

/// Combines `vectors` into `Σ(wᵢ·vᵢ) / Σ(wᵢ)`.
///
/// Returns `None` when the inputs are empty, their lengths differ, or the weights of the
/// contributing vectors sum to zero. A vector whose dimension differs from the first one's,
/// or whose weight is not finite, is skipped: it adds to neither the sum nor the weight total.
pub fn aggregate<V: AsRef<[f32]>>(vectors: &[V], weights: &[f32]) -> Option<Embedding> {
    if vectors.is_empty() || vectors.len() != weights.len() {
        return None;
    }

    let dimension = vectors[0].as_ref().len();
    if dimension == 0 {
        return None;
    }

    let mut sum = vec![0f64; dimension];
    let mut total_weight = 0f64;

    for (vector, &weight) in vectors.iter().zip(weights) {
        let vector = vector.as_ref();
        if vector.len() != dimension || !weight.is_finite() {
            continue;
        }
        let weight = f64::from(weight);
        total_weight += weight;
        for (acc, &x) in sum.iter_mut().zip(vector) {
            *acc += weight * f64::from(x);
        }
    }

    if total_weight == 0.0 {
        return None;
    }

    Some(Embedding::new(
        sum.into_iter().map(|x| (x / total_weight) as f32).collect(),
    ))
}
