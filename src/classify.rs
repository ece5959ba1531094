use log::{debug, info};

use crate::error::ClassifyError;

// ---------------------------------------------------------------------------
// Breaks – ordered class boundaries
// ---------------------------------------------------------------------------

/// How a set of [`Breaks`] was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakMethod {
    /// Exact Jenks natural breaks.
    NaturalBreaks,
    /// Evenly spaced fallback between min and max.
    Uniform,
}

/// `k + 1` non-decreasing boundaries describing `k` classes.
///
/// Class `i` covers `[bounds[i], bounds[i + 1])`; the last class also
/// takes everything at or above its lower bound.
#[derive(Debug, Clone, PartialEq)]
pub struct Breaks {
    bounds: Vec<f64>,
    method: BreakMethod,
}

impl Breaks {
    pub fn bounds(&self) -> &[f64] {
        &self.bounds
    }

    pub fn method(&self) -> BreakMethod {
        self.method
    }

    /// Number of classes (`bounds.len() - 1`).
    pub fn classes(&self) -> usize {
        self.bounds.len().saturating_sub(1)
    }

    pub fn min(&self) -> f64 {
        self.bounds[0]
    }

    pub fn max(&self) -> f64 {
        self.bounds[self.bounds.len() - 1]
    }

    /// Zero-based class of `value`: the first `i` with `value < bounds[i + 1]`,
    /// or the last class when no upper bound exceeds it.
    ///
    /// A value equal to an interior boundary belongs to the upper class.
    pub fn class_of(&self, value: f64) -> usize {
        self.bounds
            .iter()
            .skip(1)
            .position(|&upper| value < upper)
            .unwrap_or(self.classes().saturating_sub(1))
    }
}

// ---------------------------------------------------------------------------
// Jenks natural breaks
// ---------------------------------------------------------------------------

/// Row-major `(n + 1) × (k + 1)` table used by the dynamic program.
struct Grid<T> {
    cols: usize,
    cells: Vec<T>,
}

impl<T: Copy> Grid<T> {
    fn new(rows: usize, cols: usize, fill: T) -> Self {
        Self {
            cols,
            cells: vec![fill; rows * cols],
        }
    }

    fn get(&self, row: usize, col: usize) -> T {
        self.cells[row * self.cols + col]
    }

    fn set(&mut self, row: usize, col: usize, value: T) {
        self.cells[row * self.cols + col] = value;
    }
}

/// Compute `classes + 1` natural-break boundaries for `values`.
///
/// The values are sorted first, so input order does not matter. The
/// partition minimizes the total within-class sum of squared deviations.
/// Runs in `O(n² · k)` time and `O(n · k)` space.
pub fn jenks_breaks(values: &[f64], classes: usize) -> Result<Vec<f64>, ClassifyError> {
    if classes == 0 {
        return Err(ClassifyError::ZeroClasses);
    }
    if values.iter().any(|v| !v.is_finite()) {
        return Err(ClassifyError::NonFinite);
    }

    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);

    let distinct = distinct_count(&sorted);
    if distinct < classes {
        return Err(ClassifyError::InsufficientData { distinct, classes });
    }

    let n = sorted.len();
    let lower_class_limits = class_limits(&sorted, classes)?;

    let mut bounds = vec![0.0; classes + 1];
    bounds[0] = sorted[0];
    bounds[classes] = sorted[n - 1];

    // Walk back from the full sequence; each class starts at a 1-based index.
    let mut end = n;
    for class in (2..=classes).rev() {
        let start = lower_class_limits.get(end, class);
        bounds[class - 1] = sorted[start - 1];
        end = start - 1;
    }

    Ok(bounds)
}

/// Fill the lower-class-limit table for `sorted` (ascending) and `classes`.
fn class_limits(sorted: &[f64], classes: usize) -> Result<Grid<usize>, ClassifyError> {
    let n = sorted.len();
    let mut lower_class_limits = Grid::new(n + 1, classes + 1, 0usize);
    let mut variance_combinations = Grid::new(n + 1, classes + 1, 0.0f64);

    for j in 1..=classes {
        lower_class_limits.set(1, j, 1);
        variance_combinations.set(1, j, 0.0);
        for i in 2..=n {
            variance_combinations.set(i, j, f64::INFINITY);
        }
    }

    for l in 2..=n {
        let mut sum = 0.0;
        let mut sum_squares = 0.0;
        let mut variance = 0.0;

        // Grow the tail segment [lower_class_limit, l] one value at a time.
        for m in 1..=l {
            let lower_class_limit = l - m + 1;
            let val = sorted[lower_class_limit - 1];
            let w = m as f64;

            sum += val;
            sum_squares += val * val;
            variance = sum_squares - (sum * sum) / w;

            let prefix = lower_class_limit - 1;
            if prefix == 0 {
                continue;
            }
            // The prefix must be able to hold one value per remaining class.
            for j in 2..=classes.min(prefix + 1) {
                let candidate = variance + variance_combinations.get(prefix, j - 1);
                if variance_combinations.get(l, j) >= candidate {
                    lower_class_limits.set(l, j, lower_class_limit);
                    variance_combinations.set(l, j, candidate);
                }
            }
        }

        lower_class_limits.set(l, 1, 1);
        variance_combinations.set(l, 1, variance);
    }

    let total = variance_combinations.get(n, classes);
    if !total.is_finite() {
        return Err(ClassifyError::NonFinite);
    }
    debug!("natural breaks: n={n} k={classes} within-class variance={total}");

    Ok(lower_class_limits)
}

fn distinct_count(sorted: &[f64]) -> usize {
    let mut count = 0;
    let mut previous: Option<f64> = None;
    for &v in sorted {
        if previous != Some(v) {
            count += 1;
            previous = Some(v);
        }
    }
    count
}

// ---------------------------------------------------------------------------
// Uniform fallback
// ---------------------------------------------------------------------------

/// `classes + 1` evenly spaced boundaries from `min` to `max` inclusive.
pub fn uniform_breaks(min: f64, max: f64, classes: usize) -> Vec<f64> {
    let classes = classes.max(1);
    let interval = (max - min) / classes as f64;
    let mut bounds: Vec<f64> = (0..=classes).map(|i| min + i as f64 * interval).collect();
    bounds[classes] = max;
    bounds
}

/// Natural breaks for `values`, falling back to uniform breaks whenever the
/// classifier declines.
///
/// Non-finite values are ignored. Returns `None` only when no finite value
/// is left to classify.
pub fn classify_or_uniform(values: &[f64], classes: usize) -> Option<Breaks> {
    let finite: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    let (min, max) = finite
        .iter()
        .fold(None, |acc: Option<(f64, f64)>, &v| match acc {
            None => Some((v, v)),
            Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
        })?;

    match jenks_breaks(&finite, classes) {
        Ok(bounds) => Some(Breaks {
            bounds,
            method: BreakMethod::NaturalBreaks,
        }),
        Err(err) => {
            info!("natural breaks unavailable ({err}); using uniform breaks");
            Some(Breaks {
                bounds: uniform_breaks(min, max, classes),
                method: BreakMethod::Uniform,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_well_formed(values: &[f64], classes: usize, bounds: &[f64]) {
        let min = values.iter().copied().fold(f64::INFINITY, f64::min);
        let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        assert_eq!(bounds.len(), classes + 1);
        assert_eq!(bounds[0], min);
        assert_eq!(bounds[classes], max);
        assert!(bounds.windows(2).all(|w| w[0] <= w[1]), "{bounds:?}");
    }

    #[test]
    fn separates_obvious_clusters() {
        let values = [12.0, 1.0, 11.0, 2.0, 10.0, 3.0];
        let bounds = jenks_breaks(&values, 2).unwrap();
        assert_eq!(bounds, vec![1.0, 10.0, 12.0]);
    }

    #[test]
    fn three_clusters() {
        let values = [1.0, 2.0, 3.0, 20.0, 21.0, 22.0, 50.0, 51.0];
        let bounds = jenks_breaks(&values, 3).unwrap();
        assert_eq!(bounds, vec![1.0, 20.0, 50.0, 51.0]);
    }

    #[test]
    fn single_class_spans_min_to_max() {
        assert_eq!(jenks_breaks(&[100.0], 1).unwrap(), vec![100.0, 100.0]);
        assert_eq!(jenks_breaks(&[5.0, -2.0, 9.0], 1).unwrap(), vec![-2.0, 9.0]);
    }

    #[test]
    fn one_class_per_value_when_k_equals_n() {
        let values = [4.0, 1.0, 3.0, 2.0];
        assert_eq!(jenks_breaks(&values, 4).unwrap(), vec![1.0, 2.0, 3.0, 4.0, 4.0]);
    }

    #[test]
    fn well_formed_across_many_inputs() {
        let mut seed = 7u64;
        for n in 1..40 {
            let values: Vec<f64> = (0..n)
                .map(|_| {
                    seed = seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
                    ((seed >> 33) % 1000) as f64 / 10.0
                })
                .collect();
            for k in 1..=n.min(8) {
                match jenks_breaks(&values, k) {
                    Ok(bounds) => assert_well_formed(&values, k, &bounds),
                    Err(ClassifyError::InsufficientData { .. }) => {}
                    Err(other) => panic!("unexpected error {other}"),
                }
            }
        }
    }

    #[test]
    fn deterministic_regardless_of_input_order() {
        let a = [9.0, 3.0, 7.0, 1.0, 8.0, 2.0, 15.0];
        let mut b = a;
        b.reverse();
        assert_eq!(jenks_breaks(&a, 3).unwrap(), jenks_breaks(&b, 3).unwrap());
    }

    #[test]
    fn too_few_distinct_values_is_insufficient() {
        let values = [1.0, 1.0, 2.0, 3.0, 3.0];
        assert_eq!(
            jenks_breaks(&values, 6),
            Err(ClassifyError::InsufficientData {
                distinct: 3,
                classes: 6
            })
        );
    }

    #[test]
    fn rejects_zero_classes_and_non_finite() {
        assert_eq!(jenks_breaks(&[1.0, 2.0], 0), Err(ClassifyError::ZeroClasses));
        assert_eq!(
            jenks_breaks(&[1.0, f64::NAN], 1),
            Err(ClassifyError::NonFinite)
        );
    }

    #[test]
    fn fallback_is_evenly_spaced() {
        let values = [0.0, 6.0, 12.0, 12.0];
        let breaks = classify_or_uniform(&values, 6).unwrap();
        assert_eq!(breaks.method(), BreakMethod::Uniform);
        assert_eq!(breaks.bounds(), &[0.0, 2.0, 4.0, 6.0, 8.0, 10.0, 12.0]);
    }

    #[test]
    fn fallback_skips_non_finite_and_handles_empty() {
        assert!(classify_or_uniform(&[], 3).is_none());
        assert!(classify_or_uniform(&[f64::NAN], 3).is_none());
        let breaks = classify_or_uniform(&[f64::INFINITY, 1.0, 2.0], 2).unwrap();
        assert_eq!(breaks.method(), BreakMethod::NaturalBreaks);
        assert_eq!(breaks.bounds(), &[1.0, 2.0, 2.0]);
    }

    #[test]
    fn class_of_uses_half_open_intervals() {
        let breaks = classify_or_uniform(&[1.0, 2.0, 3.0, 10.0, 11.0, 12.0], 2).unwrap();
        assert_eq!(breaks.bounds(), &[1.0, 10.0, 12.0]);
        assert_eq!(breaks.class_of(1.0), 0);
        assert_eq!(breaks.class_of(9.99), 0);
        assert_eq!(breaks.class_of(10.0), 1);
        assert_eq!(breaks.class_of(12.0), 1);
        assert_eq!(breaks.class_of(500.0), 1);
        assert_eq!(breaks.class_of(-5.0), 0);
    }
}
