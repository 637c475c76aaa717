//! Backtest orchestration: range filter, execution, metrics.

use chrono::NaiveDateTime;
use tracing::info;

use super::error::ChaintraderError;
use super::execution::{ExecutionConfig, ExecutionEngine};
use super::feature::FeatureTable;
use super::ledger::Ledger;
use super::metrics::Metrics;
use super::order::OrderRecord;
use super::strategy::Strategy;

#[derive(Debug, Clone, PartialEq)]
pub struct BacktestConfig {
    pub symbol: String,
    pub initial_capital: f64,
    pub commission_rate: f64,
    pub max_position_pct: f64,
    pub risk_free_rate: f64,
    pub start: Option<NaiveDateTime>,
    pub end: Option<NaiveDateTime>,
}

impl Default for BacktestConfig {
    fn default() -> Self {
        BacktestConfig {
            symbol: "BTC".to_string(),
            initial_capital: 100_000.0,
            commission_rate: 0.002,
            max_position_pct: 1.0,
            risk_free_rate: 0.02,
            start: None,
            end: None,
        }
    }
}

impl BacktestConfig {
    pub fn execution(&self) -> ExecutionConfig {
        ExecutionConfig {
            symbol: self.symbol.clone(),
            commission_rate: self.commission_rate,
            max_position_pct: self.max_position_pct,
        }
    }
}

/// Result of one run.
#[derive(Debug, Clone, PartialEq)]
pub struct BacktestReport {
    pub strategy: String,
    pub symbol: String,
    pub initial_capital: f64,
    pub first_timestamp: NaiveDateTime,
    pub last_timestamp: NaiveDateTime,
    pub rows: usize,
    pub metrics: Metrics,
    pub ledger: Ledger,
    pub orders: Vec<OrderRecord>,
    pub skipped_steps: usize,
    pub final_cash: f64,
    pub final_quantity: f64,
}

impl BacktestReport {
    pub fn cancelled_orders(&self) -> impl Iterator<Item = &OrderRecord> {
        self.orders.iter().filter(|o| !o.is_filled())
    }

    /// Metrics text block followed by the final account state.
    pub fn render_text(&self) -> String {
        let mut out = self.metrics.render(self.initial_capital);
        out.push_str(&format!(
            "\nStrategy: {}\nSymbol: {}\nPeriod: {} to {} ({} rows, {} skipped)\n",
            self.strategy,
            self.symbol,
            self.first_timestamp,
            self.last_timestamp,
            self.rows,
            self.skipped_steps,
        ));
        out.push_str(&format!(
            "Final Cash: ${}\nFinal Position: {}\n",
            super::metrics::format_money(self.final_cash),
            self.final_quantity,
        ));
        out
    }
}

/// Runs `strategy` over the rows of `features` that fall within the
/// configured range, then liquidates and computes metrics.
///
/// Signals are generated over the whole table so indicator warmup can use
/// history that precedes `config.start`. Metrics are valued over the
/// table's full price calendar, not just the traded window.
pub fn run_backtest(
    features: &FeatureTable,
    strategy: &dyn Strategy,
    config: &BacktestConfig,
) -> Result<BacktestReport, ChaintraderError> {
    let window = features.filter_range(config.start, config.end);
    let (Some(first_timestamp), Some(last_timestamp)) =
        (window.first_timestamp(), window.last_timestamp())
    else {
        return Err(ChaintraderError::EmptyInputRange {
            start: config.start,
            end: config.end,
        });
    };

    let all_signals = strategy.generate_signals(features);
    let offset = features
        .rows()
        .partition_point(|r| config.start.is_some_and(|s| r.timestamp < s));
    let signals: Vec<Option<f64>> = (0..window.len())
        .map(|i| all_signals.get(offset + i).copied().flatten())
        .collect();

    info!(
        strategy = strategy.name(),
        symbol = %config.symbol,
        rows = window.len(),
        start = %first_timestamp,
        end = %last_timestamp,
        "running backtest"
    );

    let engine = ExecutionEngine::new(config.execution(), strategy);
    let state = engine.run(&window, &signals, config.initial_capital)?;

    let metrics = Metrics::compute(
        &state.ledger,
        &features.price_series(),
        config.initial_capital,
        config.risk_free_rate,
    );

    info!(
        fills = state.ledger.len(),
        skipped = state.skipped_steps,
        cancelled = state.cancelled_orders(),
        total_return = metrics.total_return,
        final_cash = state.account.cash(),
        "backtest complete"
    );

    Ok(BacktestReport {
        strategy: strategy.name().to_string(),
        symbol: config.symbol.clone(),
        initial_capital: config.initial_capital,
        first_timestamp,
        last_timestamp,
        rows: window.len(),
        metrics,
        final_cash: state.account.cash(),
        final_quantity: state.account.held_quantity(),
        ledger: state.ledger,
        orders: state.orders,
        skipped_steps: state.skipped_steps,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::feature::FeatureRow;
    use crate::domain::order::Side;
    use crate::domain::strategy::SignalColumn;
    use approx::assert_relative_eq;
    use chrono::NaiveDate;

    fn ts(day: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, day)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
    }

    fn table(rows: &[(u32, f64, f64)]) -> FeatureTable {
        FeatureTable::from_rows(
            rows.iter()
                .map(|&(d, p, s)| FeatureRow::new(ts(d), Some(p)).with_signal(s))
                .collect(),
        )
    }

    fn config() -> BacktestConfig {
        BacktestConfig {
            commission_rate: 0.0,
            ..BacktestConfig::default()
        }
    }

    #[test]
    fn empty_range_is_fatal() {
        let features = table(&[(1, 10.0, 1.0), (2, 11.0, 0.0)]);
        let cfg = BacktestConfig {
            start: Some(ts(10)),
            ..config()
        };
        let err = run_backtest(&features, &SignalColumn::default(), &cfg).unwrap_err();
        assert!(matches!(err, ChaintraderError::EmptyInputRange { start: Some(_), .. }));
    }

    #[test]
    fn empty_table_is_fatal() {
        let err = run_backtest(&FeatureTable::default(), &SignalColumn::default(), &config())
            .unwrap_err();
        assert!(matches!(err, ChaintraderError::EmptyInputRange { .. }));
    }

    #[test]
    fn range_filter_limits_rows() {
        let features = table(&[(1, 10.0, 1.0), (2, 10.0, 0.0), (3, 12.0, -1.0), (4, 9.0, 1.0)]);
        let cfg = BacktestConfig {
            start: Some(ts(2)),
            end: Some(ts(3)),
            ..config()
        };
        let report = run_backtest(&features, &SignalColumn::default(), &cfg).unwrap();

        assert_eq!(report.rows, 2);
        assert_eq!(report.first_timestamp, ts(2));
        // day 1's entry is outside the window, so nothing is ever bought
        assert!(report.ledger.is_empty());
        assert_relative_eq!(report.final_cash, 100_000.0);
    }

    #[test]
    fn metrics_ignore_range_when_ledger_matches() {
        let features = table(&[
            (1, 100.0, 0.0),
            (2, 104.0, 0.0),
            (3, 97.0, 0.0),
            (4, 101.0, 0.0),
            (5, 100.0, 1.0),
            (6, 108.0, 0.0),
            (7, 103.0, -1.0),
            (8, 110.0, 0.0),
        ]);
        let full = run_backtest(&features, &SignalColumn::default(), &config()).unwrap();
        let windowed = run_backtest(
            &features,
            &SignalColumn::default(),
            &BacktestConfig {
                start: Some(ts(4)),
                ..config()
            },
        )
        .unwrap();

        assert_eq!(full.ledger, windowed.ledger);
        assert_eq!(windowed.rows, 5);
        assert_eq!(full.metrics, windowed.metrics);
        assert!(full.metrics.sharpe_ratio != 0.0);
    }

    #[test]
    fn round_trip_updates_metrics() {
        let features = table(&[(1, 100.0, 0.0), (2, 100.0, 1.0), (3, 110.0, -1.0)]);
        let report = run_backtest(&features, &SignalColumn::default(), &config()).unwrap();

        assert_eq!(report.metrics.total_trades, 2);
        assert_eq!(report.ledger.all()[1].side, Side::Sell);
        assert_relative_eq!(report.metrics.total_return, 0.1, epsilon = 1e-9);
        assert_relative_eq!(report.metrics.win_rate, 0.5);
        assert_relative_eq!(report.final_quantity, 0.0);
    }

    #[test]
    fn render_text_includes_account_state() {
        let features = table(&[(1, 100.0, 0.0), (2, 100.0, 0.0)]);
        let report = run_backtest(&features, &SignalColumn::default(), &config()).unwrap();
        let text = report.render_text();

        assert!(text.starts_with("Performance Report"));
        assert!(text.contains("Total Trades: 0"));
        assert!(text.contains("Final Cash: $100,000.00"));
        assert!(text.contains("Strategy: signal_column"));
    }
}
