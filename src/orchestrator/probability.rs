//! Answer probability scoring from per-token log probabilities.

use crate::provider::ProviderResponse;

/// Geometric mean of per-token probabilities: `exp(mean(logprob))`.
///
/// Returns `None` for an empty slice or a non-finite result.
pub fn geometric_mean_probability(logprobs: &[f64]) -> Option<f64> {
    if logprobs.is_empty() {
        return None;
    }
    let mean = logprobs.iter().sum::<f64>() / logprobs.len() as f64;
    let probability = mean.exp();
    if probability.is_finite() {
        Some(probability)
    } else {
        None
    }
}

/// Provider-computed probability when present, otherwise derived from the
/// logprobs, otherwise `None`.
pub(crate) fn resolve_probability(response: &ProviderResponse) -> Option<f64> {
    response
        .probability
        .or_else(|| response.logprobs.as_deref().and_then(geometric_mean_probability))
}
