//! Rolling-window helpers over gappy series.
//!
//! Every helper takes `Option<f64>` values and yields `None` wherever the
//! result is undefined: during warmup, when any input in the window is
//! missing, or when the arithmetic would not be finite.

/// Simple moving average over `period` values. First `period - 1` outputs are `None`.
pub fn sma(values: &[Option<f64>], period: usize) -> Vec<Option<f64>> {
    rolling(values, period, |window| {
        Some(window.iter().sum::<f64>() / window.len() as f64)
    })
}

/// Sample standard deviation (n - 1 denominator) over `period` values.
pub fn rolling_std(values: &[Option<f64>], period: usize) -> Vec<Option<f64>> {
    rolling(values, period, |window| {
        if window.len() < 2 {
            return None;
        }
        let n = window.len() as f64;
        let mean = window.iter().sum::<f64>() / n;
        let variance = window.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0);
        Some(variance.sqrt())
    })
}

/// Fractional change from the previous value: `(x[i] - x[i-1]) / x[i-1]`.
pub fn pct_change(values: &[Option<f64>]) -> Vec<Option<f64>> {
    let mut out = Vec::with_capacity(values.len());
    for i in 0..values.len() {
        let change = match (i.checked_sub(1).and_then(|p| values[p]), values[i]) {
            (Some(prev), Some(curr)) if prev != 0.0 => finite((curr - prev) / prev),
            _ => None,
        };
        out.push(change);
    }
    out
}

/// Difference of natural logs between consecutive values.
pub fn log_diff(values: &[Option<f64>]) -> Vec<Option<f64>> {
    let mut out = Vec::with_capacity(values.len());
    for i in 0..values.len() {
        let change = match (i.checked_sub(1).and_then(|p| values[p]), values[i]) {
            (Some(prev), Some(curr)) if prev > 0.0 && curr > 0.0 => finite(curr.ln() - prev.ln()),
            _ => None,
        };
        out.push(change);
    }
    out
}

/// `(mean - x) / std` over up to `period` trailing values, counting only the
/// values that are present. Needs the current value and at least two present
/// values in the window; a flat window is `None`.
pub fn rolling_zscore(values: &[Option<f64>], period: usize) -> Vec<Option<f64>> {
    if period == 0 {
        return vec![None; values.len()];
    }

    let mut out = Vec::with_capacity(values.len());
    for i in 0..values.len() {
        let Some(current) = values[i] else {
            out.push(None);
            continue;
        };
        let window: Vec<f64> = values[(i + 1).saturating_sub(period)..=i]
            .iter()
            .flatten()
            .copied()
            .collect();
        if window.len() < 2 {
            out.push(None);
            continue;
        }
        let n = window.len() as f64;
        let mean = window.iter().sum::<f64>() / n;
        let std = (window.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0)).sqrt();
        out.push(if std > 0.0 { finite((mean - current) / std) } else { None });
    }
    out
}

fn rolling<F>(values: &[Option<f64>], period: usize, reduce: F) -> Vec<Option<f64>>
where
    F: Fn(&[f64]) -> Option<f64>,
{
    if period == 0 {
        return vec![None; values.len()];
    }

    let mut out = Vec::with_capacity(values.len());
    let mut window: Vec<f64> = Vec::with_capacity(period);
    for i in 0..values.len() {
        if i + 1 < period {
            out.push(None);
            continue;
        }
        window.clear();
        window.extend(values[i + 1 - period..=i].iter().flatten());
        let value = if window.len() == period {
            reduce(&window).and_then(finite)
        } else {
            None
        };
        out.push(value);
    }
    out
}

fn finite(v: f64) -> Option<f64> {
    v.is_finite().then_some(v)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn some(values: &[f64]) -> Vec<Option<f64>> {
        values.iter().copied().map(Some).collect()
    }

    #[test]
    fn sma_warmup_and_values() {
        let out = sma(&some(&[1.0, 2.0, 3.0, 4.0]), 3);
        assert_eq!(out[0], None);
        assert_eq!(out[1], None);
        assert!((out[2].unwrap() - 2.0).abs() < 1e-12);
        assert!((out[3].unwrap() - 3.0).abs() < 1e-12);
    }

    #[test]
    fn sma_gap_in_window_is_none() {
        let out = sma(&[Some(1.0), None, Some(3.0), Some(4.0), Some(5.0)], 2);
        assert_eq!(out[1], None);
        assert_eq!(out[2], None);
        assert!((out[3].unwrap() - 3.5).abs() < 1e-12);
    }

    #[test]
    fn sma_period_zero() {
        assert_eq!(sma(&some(&[1.0, 2.0]), 0), vec![None, None]);
    }

    #[test]
    fn rolling_std_sample() {
        // values 2,4,4,4,5,5,7,9: sample std = sqrt(32/7)
        let out = rolling_std(&some(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]), 8);
        let expected = (32.0_f64 / 7.0).sqrt();
        assert!((out[7].unwrap() - expected).abs() < 1e-12);
    }

    #[test]
    fn rolling_std_single_value_window_is_none() {
        assert_eq!(rolling_std(&some(&[3.0, 4.0]), 1), vec![None, None]);
    }

    #[test]
    fn pct_change_basic() {
        let out = pct_change(&some(&[100.0, 110.0, 99.0]));
        assert_eq!(out[0], None);
        assert!((out[1].unwrap() - 0.1).abs() < 1e-12);
        assert!((out[2].unwrap() + 0.1).abs() < 1e-12);
    }

    #[test]
    fn pct_change_from_zero_is_none() {
        let out = pct_change(&some(&[0.0, 5.0]));
        assert_eq!(out[1], None);
    }

    #[test]
    fn zscore_partial_window() {
        let out = rolling_zscore(&some(&[1.0, 3.0, 5.0]), 14);
        assert_eq!(out[0], None);
        // window [1, 3]: mean 2, std sqrt(2)
        assert!((out[1].unwrap() + 1.0 / 2.0_f64.sqrt()).abs() < 1e-12);
        // window [1, 3, 5]: mean 3, std 2
        assert!((out[2].unwrap() + 1.0).abs() < 1e-12);
    }

    #[test]
    fn zscore_trailing_window_and_gaps() {
        let out = rolling_zscore(&[Some(100.0), Some(2.0), None, Some(4.0), Some(4.0)], 2);
        assert_eq!(out[2], None);
        // window [None, 4] has one value
        assert_eq!(out[3], None);
        // flat window
        assert_eq!(out[4], None);
        assert!(out[1].unwrap() > 0.0);
    }

    #[test]
    fn log_diff_basic() {
        let e = std::f64::consts::E;
        let out = log_diff(&some(&[1.0, e]));
        assert_eq!(out[0], None);
        assert!((out[1].unwrap() - 1.0).abs() < 1e-12);
    }
}
