//! Latency statistics.

/// Statistical summary of per-iteration latencies, in milliseconds.
#[derive(Debug, Clone, PartialEq)]
pub struct TimingStats {
    pub mean_ms: f64,
    pub std_ms: f64,
    pub min_ms: f64,
    pub max_ms: f64,
    pub p50_ms: f64,
    pub p95_ms: f64,
    pub p99_ms: f64,
}

impl TimingStats {
    /// Compute statistics from a list of latency values (ms).
    pub fn from_values(values: &[f64]) -> Self {
        if values.is_empty() {
            return Self {
                mean_ms: 0.0,
                std_ms: 0.0,
                min_ms: 0.0,
                max_ms: 0.0,
                p50_ms: 0.0,
                p95_ms: 0.0,
                p99_ms: 0.0,
            };
        }

        let mut sorted = values.to_vec();
        sorted.sort_by(f64::total_cmp);

        let n = sorted.len() as f64;
        let mean = sorted.iter().sum::<f64>() / n;
        let variance = sorted.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;

        Self {
            mean_ms: mean,
            std_ms: variance.sqrt(),
            min_ms: sorted[0],
            max_ms: sorted[sorted.len() - 1],
            p50_ms: percentile(&sorted, 50.0),
            p95_ms: percentile(&sorted, 95.0),
            p99_ms: percentile(&sorted, 99.0),
        }
    }
}

/// Percentile with linear interpolation between order statistics.
/// Input must be sorted.
fn percentile(sorted: &[f64], p: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let idx = (p / 100.0) * (sorted.len() - 1) as f64;
    let i = idx as usize;
    let frac = idx - i as f64;
    if i + 1 < sorted.len() {
        sorted[i] * (1.0 - frac) + sorted[i + 1] * frac
    } else {
        sorted[sorted.len() - 1]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_is_all_zero() {
        let stats = TimingStats::from_values(&[]);
        assert_eq!(stats.mean_ms, 0.0);
        assert_eq!(stats.p99_ms, 0.0);
    }

    #[test]
    fn test_single_value() {
        let stats = TimingStats::from_values(&[5.0]);
        assert_eq!(stats.mean_ms, 5.0);
        assert_eq!(stats.min_ms, 5.0);
        assert_eq!(stats.max_ms, 5.0);
        assert_eq!(stats.p50_ms, 5.0);
        assert_eq!(stats.p99_ms, 5.0);
    }

    #[test]
    fn test_percentile_interpolates() {
        let stats = TimingStats::from_values(&[1.0, 2.0, 3.0, 4.0]);
        assert_eq!(stats.p50_ms, 2.5);
        assert_eq!(stats.min_ms, 1.0);
        assert_eq!(stats.max_ms, 4.0);
        assert!((stats.mean_ms - 2.5).abs() < 1e-9);
    }

    #[test]
    fn test_order_independent() {
        let a = TimingStats::from_values(&[3.0, 1.0, 2.0]);
        let b = TimingStats::from_values(&[1.0, 2.0, 3.0]);
        assert_eq!(a, b);
    }
}
