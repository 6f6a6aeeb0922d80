//! Numeric helpers for anchoring: sorting, quantile estimation, sigmoid.

/// Scores closer than this are treated as equal.
pub const SCORE_EPS: f64 = 1e-9;

/// Copy the finite values of `scores` and sort them ascending.
pub fn sorted_finite(scores: &[f64]) -> Vec<f64> {
    let mut sorted: Vec<f64> = scores.iter().copied().filter(|s| s.is_finite()).collect();
    sorted.sort_by(|a, b| a.total_cmp(b));
    sorted
}

/// Linear-interpolation quantile (Hyndman–Fan type 7) over ascending `sorted`.
/// `q` is clamped to [0, 1]. Returns `None` for an empty slice.
pub fn quantile_linear(sorted: &[f64], q: f64) -> Option<f64> {
    let n = sorted.len();
    if n == 0 {
        return None;
    }
    if n == 1 {
        return Some(sorted[0]);
    }
    let h = (n - 1) as f64 * q.clamp(0.0, 1.0);
    let lo = h.floor() as usize;
    let hi = (lo + 1).min(n - 1);
    let frac = h - lo as f64;
    Some(sorted[lo] + frac * (sorted[hi] - sorted[lo]))
}

/// Snap a quantile to the nearest multiple of `step`, kept inside [0, 1].
pub fn snap_to_grid(q: f64, step: f64) -> f64 {
    if step <= 0.0 {
        return q.clamp(0.0, 1.0);
    }
    // Round away float noise so 0.35000000000000003 compares as 0.35.
    let snapped = (q / step).round() * step;
    ((snapped * 1e9).round() / 1e9).clamp(0.0, 1.0)
}

pub fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

/// Fraction of the span covered by `[value - band, value + band]`, clipped
/// to `[min, max]`.
pub fn band_overlap(value: f64, band: f64, min: f64, max: f64) -> f64 {
    ((value + band).min(max) - (value - band).max(min)).max(0.0)
}

/// Mean of the values, summed in ascending order so the result does not
/// depend on input order.
pub fn order_independent_mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let sorted = sorted_finite(values);
    if sorted.len() != values.len() {
        return None;
    }
    Some(sorted.iter().sum::<f64>() / sorted.len() as f64)
}
