//! Small numeric helpers shared by the genome, speciation and reproduction code.

use rand::distr::weighted::WeightedIndex;
use rand::distr::Distribution;
use rand::Rng;
use rand_distr::Normal;

use crate::config::InitType;

/// Round `value` down or up at random, rounding up with probability equal to its
/// fractional part. The expectation of the result equals `value`.
///
/// Negative and non-finite values round to zero.
pub fn probabilistic_round<R: Rng + ?Sized>(value: f32, rng: &mut R) -> usize {
    if !value.is_finite() || value <= 0.0 {
        return 0;
    }
    let floor = value.floor();
    let fraction = value - floor;
    let rounded = if rng.random::<f32>() < fraction {
        floor + 1.0
    } else {
        floor
    };
    rounded as usize
}

/// Linearly map `value` from `[min, max]` onto `[out_min, out_max]`.
///
/// A degenerate source range maps everything to `out_min`.
#[must_use]
pub fn normalize(min: f32, max: f32, value: f32, out_min: f32, out_max: f32) -> f32 {
    let span = max - min;
    if span == 0.0 {
        return out_min;
    }
    ((value - min) / span) * (out_max - out_min) + out_min
}

/// Arithmetic mean; zero for an empty slice.
#[must_use]
pub fn mean(values: &[f32]) -> f32 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f32>() / values.len() as f32
}

/// Population standard deviation; zero for fewer than two values.
#[must_use]
pub fn stdev(values: &[f32]) -> f32 {
    if values.len() < 2 {
        return 0.0;
    }
    let m = mean(values);
    let variance = values.iter().map(|v| (v - m).powi(2)).sum::<f32>() / values.len() as f32;
    variance.sqrt()
}

/// Median; zero for an empty slice.
#[must_use]
pub fn median(values: &[f32]) -> f32 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f32::total_cmp);
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

/// Draw an index with probability proportional to `weights`.
///
/// Returns `None` when the weights are empty, all zero, or contain a negative
/// or non-finite entry.
pub fn weighted_choice<R: Rng + ?Sized>(weights: &[f32], rng: &mut R) -> Option<usize> {
    let dist = WeightedIndex::new(weights).ok()?;
    Some(dist.sample(rng))
}

/// Draw a fresh attribute value from its configured initial distribution.
///
/// `Normal` is clamped into `[min, max]`; `Uniform` covers
/// `[max(min, mean - 2 stdev), min(max, mean + 2 stdev)]`.
pub fn sample_initial<R: Rng + ?Sized>(
    init_type: InitType,
    mean: f32,
    stdev: f32,
    min: f32,
    max: f32,
    rng: &mut R,
) -> f32 {
    match init_type {
        InitType::Normal => clamp(gaussian(mean, stdev, rng), min, max),
        InitType::Uniform => {
            let (min, max) = (min.min(max), min.max(max));
            let low = min.max(mean - 2.0 * stdev);
            let high = max.min(mean + 2.0 * stdev);
            if low < high {
                rng.random_range(low..=high)
            } else {
                clamp(low, min, max)
            }
        }
    }
}

/// Gaussian perturbation of `value`, clamped into `[min, max]`.
pub fn perturb<R: Rng + ?Sized>(value: f32, stdev: f32, min: f32, max: f32, rng: &mut R) -> f32 {
    clamp(value + gaussian(0.0, stdev, rng), min, max)
}

/// Clamp into the interval spanned by `a` and `b`, in either order. A NaN
/// bound is ignored.
#[must_use]
pub fn clamp(value: f32, a: f32, b: f32) -> f32 {
    let (low, high) = (a.min(b), a.max(b));
    if low <= high {
        value.clamp(low, high)
    } else {
        value
    }
}

fn gaussian<R: Rng + ?Sized>(mean: f32, stdev: f32, rng: &mut R) -> f32 {
    match Normal::new(mean, stdev) {
        Ok(dist) => dist.sample(rng),
        // Config validation rejects negative or non-finite stdev.
        Err(_) => mean,
    }
}
