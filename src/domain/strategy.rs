//! Pluggable signal and sizing policies.

use super::feature::{FeatureRow, FeatureTable};
use super::feature_builder::columns;
use super::rolling::{rolling_zscore, sma};

/// A trading policy: one signal per row plus a sizing rule for entries.
///
/// Signals are read by sign only: positive means enter, negative means exit,
/// zero means hold. `None` marks a row where the policy's inputs are missing.
pub trait Strategy {
    fn name(&self) -> &str;

    /// One entry per row of `features`, in the same order.
    fn generate_signals(&self, features: &FeatureTable) -> Vec<Option<f64>>;

    /// Units to buy when entering at `row`'s price with `capital` available.
    fn size_position(&self, row: &FeatureRow, capital: f64) -> f64;
}

/// Units worth `capital * fraction` at the row's price; 0 when unpriced.
fn fraction_of_capital(row: &FeatureRow, capital: f64, fraction: f64) -> f64 {
    match row.price {
        Some(price) if price.is_finite() && price > 0.0 => (capital * fraction / price).max(0.0),
        _ => 0.0,
    }
}

/// Long while the fast SMA is above the slow SMA, exit otherwise.
#[derive(Debug, Clone, PartialEq)]
pub struct MovingAverageCross {
    pub fast_window: usize,
    pub slow_window: usize,
    pub position_size: f64,
}

impl Default for MovingAverageCross {
    fn default() -> Self {
        MovingAverageCross {
            fast_window: 50,
            slow_window: 200,
            position_size: 1.0,
        }
    }
}

impl Strategy for MovingAverageCross {
    fn name(&self) -> &str {
        "ma_cross"
    }

    fn generate_signals(&self, features: &FeatureTable) -> Vec<Option<f64>> {
        let prices = features.prices();
        let fast = sma(&prices, self.fast_window);
        let slow = sma(&prices, self.slow_window);

        fast.iter()
            .zip(&slow)
            .map(|(f, s)| match (f, s) {
                (Some(f), Some(s)) if f > s => Some(1.0),
                (Some(_), Some(_)) => Some(-1.0),
                _ => None,
            })
            .collect()
    }

    fn size_position(&self, row: &FeatureRow, capital: f64) -> f64 {
        fraction_of_capital(row, capital, self.position_size)
    }
}

/// Enter when address growth, network velocity and hash-rate growth all clear
/// their thresholds; exit when any of them falls below the negated threshold.
#[derive(Debug, Clone, PartialEq)]
pub struct NetworkMetricsThreshold {
    pub address_threshold: f64,
    pub velocity_threshold: f64,
    pub hash_rate_threshold: f64,
    pub position_size: f64,
}

impl Default for NetworkMetricsThreshold {
    fn default() -> Self {
        NetworkMetricsThreshold {
            address_threshold: 0.05,
            velocity_threshold: 0.1,
            hash_rate_threshold: 0.1,
            position_size: 0.1,
        }
    }
}

impl NetworkMetricsThreshold {
    fn signal(&self, row: &FeatureRow) -> Option<f64> {
        let address = row.indicator(columns::ADDRESS_GROWTH)?;
        let velocity = row.indicator(columns::NETWORK_VELOCITY)?;
        let hash_rate = row.indicator(columns::HASH_RATE_GROWTH)?;

        // Exit conditions take precedence over entry.
        if address < -self.address_threshold
            || velocity < -self.velocity_threshold
            || hash_rate < -self.hash_rate_threshold
        {
            return Some(-1.0);
        }
        if address > self.address_threshold
            && velocity > self.velocity_threshold
            && hash_rate > self.hash_rate_threshold
        {
            return Some(1.0);
        }
        Some(0.0)
    }
}

impl Strategy for NetworkMetricsThreshold {
    fn name(&self) -> &str {
        "network_metrics"
    }

    fn generate_signals(&self, features: &FeatureTable) -> Vec<Option<f64>> {
        features.rows().iter().map(|row| self.signal(row)).collect()
    }

    fn size_position(&self, row: &FeatureRow, capital: f64) -> f64 {
        fraction_of_capital(row, capital, self.position_size)
    }
}

/// Mean-reversion filter on one column's trailing z-score, `(mean - x) / std`.
///
/// A score above `threshold` (the value has fallen far below its recent mean)
/// exits; any other score enters. `column` is `price` or an indicator name.
#[derive(Debug, Clone, PartialEq)]
pub struct ZScoreThreshold {
    pub column: String,
    pub window: usize,
    pub threshold: f64,
    pub position_size: f64,
}

impl Default for ZScoreThreshold {
    fn default() -> Self {
        ZScoreThreshold {
            column: "price".to_string(),
            window: 14,
            threshold: 1.0,
            position_size: 1.0,
        }
    }
}

impl Strategy for ZScoreThreshold {
    fn name(&self) -> &str {
        "zscore"
    }

    fn generate_signals(&self, features: &FeatureTable) -> Vec<Option<f64>> {
        let values = if self.column == "price" {
            features.prices()
        } else {
            features.column(&self.column)
        };
        rolling_zscore(&values, self.window)
            .into_iter()
            .map(|z| z.map(|z| if z > self.threshold { -1.0 } else { 1.0 }))
            .collect()
    }

    fn size_position(&self, row: &FeatureRow, capital: f64) -> f64 {
        fraction_of_capital(row, capital, self.position_size)
    }
}

/// Replays the `signal` column of a precomputed feature table.
#[derive(Debug, Clone, PartialEq)]
pub struct SignalColumn {
    pub position_size: f64,
}

impl Default for SignalColumn {
    fn default() -> Self {
        SignalColumn { position_size: 1.0 }
    }
}

impl Strategy for SignalColumn {
    fn name(&self) -> &str {
        "signal_column"
    }

    fn generate_signals(&self, features: &FeatureTable) -> Vec<Option<f64>> {
        features
            .rows()
            .iter()
            .map(|row| row.signal.filter(|s| s.is_finite()))
            .collect()
    }

    fn size_position(&self, row: &FeatureRow, capital: f64) -> f64 {
        fraction_of_capital(row, capital, self.position_size)
    }
}
