//! Numeric helpers for the decode transform.

/// Largest magnitude passed to `exp` in the size transform.
///
/// `exp(MAX_EXP_ARG)` is far beyond any useful box size while staying well
/// inside the `f32` range.
pub(crate) const MAX_EXP_ARG: f32 = 30.0;

/// Magnitude that infinite logits are clamped to in lenient mode.
pub(crate) const LENIENT_LOGIT_LIMIT: f32 = 1.0e4;

/// Largest box side, in image widths, produced in lenient mode.
pub(crate) const LENIENT_BOX_LIMIT: f32 = 1.0e4;

/// Logistic sigmoid in a form that never overflows.
#[inline]
pub(crate) fn sigmoid(x: f32) -> f32 {
    if x >= 0.0 {
        1.0 / (1.0 + (-x).exp())
    } else {
        let e = x.exp();
        e / (1.0 + e)
    }
}

/// `exp` with its argument clamped to `[-MAX_EXP_ARG, MAX_EXP_ARG]`.
#[inline]
pub(crate) fn exp_clamped(x: f32) -> f32 {
    x.clamp(-MAX_EXP_ARG, MAX_EXP_ARG).exp()
}

/// Writes the softmax of `logits` into `out` using max subtraction.
pub(crate) fn softmax_into(logits: &[f32], out: &mut [f32]) {
    debug_assert_eq!(logits.len(), out.len());
    let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let mut sum = 0.0f32;
    for (dst, &logit) in out.iter_mut().zip(logits) {
        let e = (logit - max).exp();
        *dst = e;
        sum += e;
    }
    if sum > 0.0 {
        let inv = 1.0 / sum;
        for value in out.iter_mut() {
            *value *= inv;
        }
    }
}

/// Returns `(index, value)` of the maximum, keeping the lowest index on ties.
pub(crate) fn argmax_first(values: &[f32]) -> (usize, f32) {
    let mut best_idx = 0usize;
    let mut best = match values.first() {
        Some(&v) => v,
        None => return (0, 0.0),
    };
    for (idx, &value) in values.iter().enumerate().skip(1) {
        if value > best {
            best = value;
            best_idx = idx;
        }
    }
    (best_idx, best)
}

/// Maps a non-finite logit to a finite stand-in (lenient mode).
#[inline]
pub(crate) fn sanitize_logit(x: f32) -> f32 {
    if x.is_nan() {
        0.0
    } else {
        x.clamp(-LENIENT_LOGIT_LIMIT, LENIENT_LOGIT_LIMIT)
    }
}
