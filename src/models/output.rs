//! Positive-class probability from raw classifier outputs
//!
//! Exported estimators report probabilities in one of two layouts: a tensor
//! (`[1, n_classes]`, `[n_classes]` or a single score) or a ZipMap
//! `seq(map(int64, float))` keyed by class id.

/// Probability of class 1 from a probability tensor.
///
/// Returns `None` when the tensor is empty.
pub fn from_tensor(dims: &[i64], data: &[f32]) -> Option<f64> {
    let classes = match dims {
        [_, classes] | [classes] => Some(*classes),
        _ => None,
    };

    let value = match classes {
        Some(n) if n >= 2 => data.get(1),
        Some(1) => data.first(),
        // Unknown layout: the last score belongs to the highest class
        _ => data.last(),
    };
    value.map(|&p| f64::from(p))
}

/// Probability of class 1 from ZipMap class/probability pairs.
///
/// Falls back to the complement of class 0 when class 1 is absent.
pub fn from_class_map(pairs: &[(i64, f32)]) -> Option<f64> {
    if let Some((_, p)) = pairs.iter().find(|(class, _)| *class == 1) {
        return Some(f64::from(*p));
    }
    pairs
        .iter()
        .find(|(class, _)| *class == 0)
        .map(|(_, p)| 1.0 - f64::from(*p))
}
