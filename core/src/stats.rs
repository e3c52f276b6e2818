//! Descriptive statistics over metric observations

use serde::{Deserialize, Serialize};

/// One observation of a metric field
///
/// Most fields hold one number per record; some hold a sequence (one value
/// per token, for instance).
#[derive(Debug, Clone, PartialEq)]
pub enum Observation {
    /// Single value
    Scalar(f64),
    /// Sequence of values
    Series(Vec<f64>),
}

impl From<f64> for Observation {
    fn from(value: f64) -> Self {
        Observation::Scalar(value)
    }
}

impl From<usize> for Observation {
    fn from(value: usize) -> Self {
        Observation::Scalar(value as f64)
    }
}

impl From<Vec<f64>> for Observation {
    fn from(values: Vec<f64>) -> Self {
        Observation::Series(values)
    }
}

/// Flatten observations into one numeric sequence
///
/// Missing observations and non-finite values are dropped.
pub fn flatten<I>(observations: I) -> Vec<f64>
where
    I: IntoIterator<Item = Option<Observation>>,
{
    let mut values = Vec::new();
    for observation in observations.into_iter().flatten() {
        match observation {
            Observation::Scalar(v) => values.push(v),
            Observation::Series(vs) => values.extend(vs),
        }
    }
    values.retain(|v| v.is_finite());
    values
}

/// Calculate percentile from sorted values using linear interpolation
///
/// `q` is a fraction in `[0, 1]`.
pub fn percentile(sorted: &[f64], q: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    if sorted.len() == 1 {
        return sorted[0];
    }

    let idx = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lower = idx.floor() as usize;
    let upper = idx.ceil() as usize;
    let frac = idx - lower as f64;

    if upper >= sorted.len() {
        sorted[sorted.len() - 1]
    } else {
        sorted[lower] + (sorted[upper] - sorted[lower]) * frac
    }
}

/// Quantiles reported for every metric field
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quantiles {
    /// 25th percentile
    pub p25: f64,
    /// 50th percentile (median)
    pub p50: f64,
    /// 75th percentile
    pub p75: f64,
    /// 90th percentile
    pub p90: f64,
    /// 95th percentile
    pub p95: f64,
    /// 99th percentile
    pub p99: f64,
}

impl Quantiles {
    /// Compute quantiles from sorted values
    pub fn from_sorted(sorted: &[f64]) -> Option<Self> {
        if sorted.is_empty() {
            return None;
        }
        Some(Self {
            p25: percentile(sorted, 0.25),
            p50: percentile(sorted, 0.50),
            p75: percentile(sorted, 0.75),
            p90: percentile(sorted, 0.90),
            p95: percentile(sorted, 0.95),
            p99: percentile(sorted, 0.99),
        })
    }

    /// Values in ascending quantile order
    pub fn as_array(&self) -> [f64; 6] {
        [self.p25, self.p50, self.p75, self.p90, self.p95, self.p99]
    }
}

/// Summary statistics of one metric field
///
/// Every statistic is `None` when there were no observations. `stddev` also
/// stays `None` for a single observation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct FieldSummary {
    /// Quantiles p25..p99
    pub quantiles: Option<Quantiles>,
    /// Arithmetic mean
    pub mean: Option<f64>,
    /// Minimum value
    pub min: Option<f64>,
    /// Maximum value
    pub max: Option<f64>,
    /// Sample standard deviation (N-1 denominator)
    pub stddev: Option<f64>,
}

impl FieldSummary {
    /// Summarize a flat set of values
    pub fn from_values(values: &[f64]) -> Self {
        if values.is_empty() {
            return Self::default();
        }

        let mut sorted: Vec<f64> = values.to_vec();
        sorted.sort_by(|a, b| a.total_cmp(b));

        let len = sorted.len();
        let mean = sorted.iter().sum::<f64>() / len as f64;
        let stddev = (len > 1).then(|| {
            let variance =
                sorted.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (len - 1) as f64;
            variance.sqrt()
        });

        Self {
            quantiles: Quantiles::from_sorted(&sorted),
            mean: Some(mean),
            min: Some(sorted[0]),
            max: Some(sorted[len - 1]),
            stddev,
        }
    }

    /// Whether any observation was summarized
    pub fn is_empty(&self) -> bool {
        self.mean.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percentile_calculation() {
        let values = vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0, 10.0];

        assert!((percentile(&values, 0.50) - 5.5).abs() < 1e-12);
        assert!((percentile(&values, 0.25) - 3.25).abs() < 1e-12);
        assert!((percentile(&values, 0.99) - 9.91).abs() < 1e-12);
        assert_eq!(percentile(&values, 1.0), 10.0);
        assert_eq!(percentile(&values, 0.0), 1.0);
    }

    #[test]
    fn test_percentile_single_value() {
        assert_eq!(percentile(&[42.0], 0.9), 42.0);
        assert_eq!(percentile(&[], 0.9), 0.0);
    }

    #[test]
    fn test_field_summary() {
        let summary = FieldSummary::from_values(&[4.0, 1.0, 3.0, 2.0]);

        assert_eq!(summary.min, Some(1.0));
        assert_eq!(summary.max, Some(4.0));
        assert_eq!(summary.mean, Some(2.5));
        // sample variance = 5/3
        assert!((summary.stddev.unwrap() - (5.0f64 / 3.0).sqrt()).abs() < 1e-12);
        assert!((summary.quantiles.unwrap().p50 - 2.5).abs() < 1e-12);
    }

    #[test]
    fn test_field_summary_single_value() {
        let summary = FieldSummary::from_values(&[7.0]);

        assert_eq!(summary.mean, Some(7.0));
        assert_eq!(summary.stddev, None);
        assert_eq!(summary.quantiles.unwrap().as_array(), [7.0; 6]);
    }

    #[test]
    fn test_field_summary_empty() {
        let summary = FieldSummary::from_values(&[]);
        assert!(summary.is_empty());
        assert!(summary.quantiles.is_none());
        assert!(summary.stddev.is_none());
    }

    #[test]
    fn test_flatten_mixed_observations() {
        let values = flatten(vec![
            Some(Observation::Scalar(1.0)),
            None,
            Some(Observation::Series(vec![2.0, f64::NAN, 3.0])),
            Some(Observation::Scalar(f64::INFINITY)),
            Some(4.0.into()),
        ]);
        assert_eq!(values, vec![1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn test_quantiles_non_decreasing() {
        let values: Vec<f64> = (0..97).map(|i| ((i * 37) % 101) as f64 / 7.0).collect();
        let summary = FieldSummary::from_values(&values);
        let q = summary.quantiles.unwrap().as_array();
        assert!(q.windows(2).all(|w| w[0] <= w[1]));
    }
}
