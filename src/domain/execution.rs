//! Signal-driven order execution.
//!
//! The engine is a two-state machine over the account:
//!
//! - FLAT, signal > 0: size an entry via the strategy, bound it by
//!   `cash * max_position_pct / price`, and buy.
//! - LONG, signal < 0: sell the entire holding.
//! - Every other combination holds.
//!
//! Rows are folded strictly in order; each step sees the account produced by
//! the previous one. When the rows run out, any open position is liquidated at
//! the last available price.

use chrono::NaiveDateTime;
use tracing::{debug, warn};

use super::account::PositionAccount;
use super::error::{ChaintraderError, ExecutionError};
use super::feature::{FeatureRow, FeatureTable};
use super::ledger::Ledger;
use super::order::{Fill, Order, OrderRecord, OrderStatus, Side};
use super::strategy::Strategy;

#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionConfig {
    pub symbol: String,
    pub commission_rate: f64,
    pub max_position_pct: f64,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        ExecutionConfig {
            symbol: "BTC".to_string(),
            commission_rate: 0.0,
            max_position_pct: 1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PositionState {
    Flat,
    Long,
}

impl PositionState {
    pub fn of(account: &PositionAccount) -> Self {
        if account.is_flat() {
            PositionState::Flat
        } else {
            PositionState::Long
        }
    }
}

/// What a single step did.
#[derive(Debug, Clone, PartialEq)]
pub enum StepOutcome {
    Hold,
    Entered(Fill),
    Exited(Fill),
}

/// Everything a run mutates, threaded explicitly through [`ExecutionEngine::step`].
#[derive(Debug, Clone, PartialEq)]
pub struct RunState {
    pub account: PositionAccount,
    pub ledger: Ledger,
    pub orders: Vec<OrderRecord>,
    pub skipped_steps: usize,
    /// Timestamp and price of the most recent row with a usable price.
    pub last_price: Option<(NaiveDateTime, f64)>,
}

impl RunState {
    pub fn new(initial_capital: f64) -> Self {
        RunState {
            account: PositionAccount::new(initial_capital),
            ledger: Ledger::new(),
            orders: Vec::new(),
            skipped_steps: 0,
            last_price: None,
        }
    }

    pub fn position_state(&self) -> PositionState {
        PositionState::of(&self.account)
    }

    pub fn cancelled_orders(&self) -> usize {
        self.orders.iter().filter(|o| !o.is_filled()).count()
    }
}

pub struct ExecutionEngine<'a> {
    config: ExecutionConfig,
    strategy: &'a dyn Strategy,
}

impl<'a> ExecutionEngine<'a> {
    pub fn new(config: ExecutionConfig, strategy: &'a dyn Strategy) -> Self {
        ExecutionEngine { config, strategy }
    }

    pub fn config(&self) -> &ExecutionConfig {
        &self.config
    }

    /// Run every row in order, then liquidate.
    ///
    /// `signals` is aligned with `features.rows()`; a missing entry counts as
    /// a data gap for that row. Per-row failures are logged and skipped.
    pub fn run(
        &self,
        features: &FeatureTable,
        signals: &[Option<f64>],
        initial_capital: f64,
    ) -> Result<RunState, ChaintraderError> {
        if features.is_empty() {
            return Err(ChaintraderError::EmptyInputRange {
                start: None,
                end: None,
            });
        }

        let mut state = RunState::new(initial_capital);

        for (i, row) in features.rows().iter().enumerate() {
            let signal = signals.get(i).copied().flatten();
            if let Err(err) = self.step(&mut state, row, signal) {
                state.skipped_steps += 1;
                match err {
                    ExecutionError::DataGap { .. } => debug!(%err, "skipping step"),
                    _ => warn!(%err, timestamp = %row.timestamp, "skipping step"),
                }
            }
        }

        self.finish(&mut state)?;
        Ok(state)
    }

    /// Apply one row's signal to `state`.
    pub fn step(
        &self,
        state: &mut RunState,
        row: &FeatureRow,
        signal: Option<f64>,
    ) -> Result<StepOutcome, ExecutionError> {
        if let Ok(price) = row.require_price() {
            state.last_price = Some((row.timestamp, price));
        }

        let signal = signal.ok_or_else(|| ExecutionError::DataGap {
            timestamp: row.timestamp,
            field: "signal".to_string(),
        })?;

        match (state.position_state(), signal) {
            (PositionState::Flat, s) if s > 0.0 => self.enter(state, row).map(StepOutcome::Entered),
            (PositionState::Long, s) if s < 0.0 => self.exit(state, row).map(StepOutcome::Exited),
            _ => Ok(StepOutcome::Hold),
        }
    }

    /// Liquidate any open position at the last available price.
    pub fn finish(&self, state: &mut RunState) -> Result<Option<Fill>, ChaintraderError> {
        if state.account.is_flat() {
            return Ok(None);
        }
        let Some((timestamp, price)) = state.last_price else {
            return Err(ChaintraderError::Data {
                reason: "open position but no price to liquidate at".to_string(),
            });
        };

        let order = Order {
            symbol: self.config.symbol.clone(),
            side: Side::Sell,
            requested_quantity: state.account.held_quantity(),
            reference_price: price,
            timestamp,
        };
        let fill = self.submit(state, order)?;
        debug!(quantity = fill.quantity, price, "liquidated open position");
        Ok(Some(fill))
    }

    fn enter(&self, state: &mut RunState, row: &FeatureRow) -> Result<Fill, ExecutionError> {
        let price = row.require_price()?;
        let cash = state.account.cash();

        let requested = self.strategy.size_position(row, cash);
        let bound = cash * self.config.max_position_pct / price;
        let quantity = if requested.is_finite() {
            requested.min(bound)
        } else {
            bound
        };

        let order = Order {
            symbol: self.config.symbol.clone(),
            side: Side::Buy,
            requested_quantity: quantity,
            reference_price: price,
            timestamp: row.timestamp,
        };

        if quantity <= 0.0 || !quantity.is_finite() {
            let err = ExecutionError::InsufficientCapital { cash, price };
            cancel(state, order, &err);
            return Err(err);
        }

        self.submit(state, order)
    }

    fn exit(&self, state: &mut RunState, row: &FeatureRow) -> Result<Fill, ExecutionError> {
        let price = row.require_price()?;
        let order = Order {
            symbol: self.config.symbol.clone(),
            side: Side::Sell,
            requested_quantity: state.account.held_quantity(),
            reference_price: price,
            timestamp: row.timestamp,
        };
        self.submit(state, order)
    }

    /// Execute `order` against the account and record the fill.
    ///
    /// The ledger's ordering is checked before the account is touched, so a
    /// failure leaves both unchanged.
    fn submit(&self, state: &mut RunState, order: Order) -> Result<Fill, ExecutionError> {
        if let Err(err) = state.ledger.ensure_chronological(order.timestamp) {
            cancel(state, order, &err);
            return Err(err);
        }

        let rate = self.config.commission_rate;
        let result = match order.side {
            Side::Buy => state.account.apply_buy(
                order.timestamp,
                &order.symbol,
                order.requested_quantity,
                order.reference_price,
                rate,
            ),
            Side::Sell => state.account.apply_sell(
                order.timestamp,
                &order.symbol,
                order.requested_quantity,
                order.reference_price,
                rate,
            ),
        };

        match result {
            Ok(fill) => {
                state.ledger.record(fill.clone())?;
                debug!(
                    side = %fill.side,
                    quantity = fill.quantity,
                    price = fill.price,
                    commission = fill.commission,
                    cash = state.account.cash(),
                    equity = state.account.equity(fill.price),
                    "filled"
                );
                state.orders.push(OrderRecord {
                    order,
                    status: OrderStatus::Filled,
                });
                Ok(fill)
            }
            Err(err) => {
                cancel(state, order, &err);
                Err(err)
            }
        }
    }
}

fn cancel(state: &mut RunState, order: Order, err: &ExecutionError) {
    state.orders.push(OrderRecord {
        order,
        status: OrderStatus::Cancelled {
            reason: err.to_string(),
        },
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::strategy::SignalColumn;
    use approx::assert_relative_eq;
    use chrono::NaiveDate;

    /// Buys a fixed number of units on every entry.
    struct FixedQuantity(f64);

    impl Strategy for FixedQuantity {
        fn name(&self) -> &str {
            "fixed"
        }

        fn generate_signals(&self, features: &FeatureTable) -> Vec<Option<f64>> {
            features.rows().iter().map(|r| r.signal).collect()
        }

        fn size_position(&self, _row: &FeatureRow, _capital: f64) -> f64 {
            self.0
        }
    }

    fn ts(day: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, day)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
    }

    fn row(day: u32, price: Option<f64>, signal: f64) -> FeatureRow {
        FeatureRow::new(ts(day), price).with_signal(signal)
    }

    fn config(commission_rate: f64, max_position_pct: f64) -> ExecutionConfig {
        ExecutionConfig {
            symbol: "BTC".into(),
            commission_rate,
            max_position_pct,
        }
    }

    fn run(strategy: &dyn Strategy, cfg: ExecutionConfig, rows: Vec<FeatureRow>, capital: f64) -> RunState {
        let table = FeatureTable::from_rows(rows);
        let signals = strategy.generate_signals(&table);
        ExecutionEngine::new(cfg, strategy)
            .run(&table, &signals, capital)
            .unwrap()
    }

    #[test]
    fn empty_table_is_fatal() {
        let strategy = SignalColumn::default();
        let engine = ExecutionEngine::new(ExecutionConfig::default(), &strategy);
        let err = engine.run(&FeatureTable::default(), &[], 1_000.0).unwrap_err();
        assert!(matches!(err, ChaintraderError::EmptyInputRange { .. }));
    }

    #[test]
    fn buy_then_liquidate_scenario() {
        let strategy = FixedQuantity(1.0);
        let state = run(
            &strategy,
            config(0.002, 1.0),
            vec![row(1, Some(50_000.0), 1.0), row(2, Some(55_000.0), 0.0)],
            100_000.0,
        );

        let fills = state.ledger.all();
        assert_eq!(fills.len(), 2);
        assert_eq!(fills[0].side, Side::Buy);
        assert_relative_eq!(fills[0].commission, 100.0, epsilon = 1e-9);
        assert_eq!(fills[1].side, Side::Sell);
        assert_eq!(fills[1].timestamp, ts(2));
        assert_relative_eq!(fills[1].commission, 110.0, epsilon = 1e-9);
        assert_relative_eq!(state.account.cash(), 104_790.0, epsilon = 1e-6);
        assert_eq!(state.account.held_quantity(), 0.0);
    }

    #[test]
    fn sell_signal_while_flat_is_noop() {
        let strategy = FixedQuantity(1.0);
        let state = run(
            &strategy,
            config(0.0, 1.0),
            vec![row(1, Some(100.0), -1.0), row(2, Some(100.0), -1.0)],
            1_000.0,
        );
        assert!(state.ledger.is_empty());
        assert!(state.orders.is_empty());
        assert_relative_eq!(state.account.cash(), 1_000.0);
    }

    #[test]
    fn entry_clamped_to_max_position_pct() {
        let strategy = FixedQuantity(100.0);
        let engine = ExecutionEngine::new(config(0.0, 0.5), &strategy);
        let mut state = RunState::new(1_000.0);

        let outcome = engine.step(&mut state, &row(1, Some(10.0), 1.0), Some(1.0)).unwrap();
        match outcome {
            StepOutcome::Entered(fill) => assert_relative_eq!(fill.quantity, 50.0, epsilon = 1e-12),
            other => panic!("expected entry, got {other:?}"),
        }
        assert_relative_eq!(state.account.cash(), 500.0, epsilon = 1e-9);
    }

    #[test]
    fn no_averaging_up_while_long() {
        let strategy = FixedQuantity(1.0);
        let engine = ExecutionEngine::new(config(0.0, 1.0), &strategy);
        let mut state = RunState::new(1_000.0);

        engine.step(&mut state, &row(1, Some(10.0), 1.0), Some(1.0)).unwrap();
        let outcome = engine.step(&mut state, &row(2, Some(10.0), 1.0), Some(1.0)).unwrap();

        assert_eq!(outcome, StepOutcome::Hold);
        assert_relative_eq!(state.account.held_quantity(), 1.0);
    }

    #[test]
    fn exit_sells_entire_position() {
        let strategy = FixedQuantity(3.0);
        let engine = ExecutionEngine::new(config(0.0, 1.0), &strategy);
        let mut state = RunState::new(1_000.0);

        engine.step(&mut state, &row(1, Some(10.0), 1.0), Some(1.0)).unwrap();
        let outcome = engine.step(&mut state, &row(2, Some(20.0), -1.0), Some(-1.0)).unwrap();

        match outcome {
            StepOutcome::Exited(fill) => assert_relative_eq!(fill.quantity, 3.0),
            other => panic!("expected exit, got {other:?}"),
        }
        assert_eq!(state.position_state(), PositionState::Flat);
        assert_relative_eq!(state.account.cash(), 1_030.0, epsilon = 1e-9);
    }

    #[test]
    fn missing_price_skips_step_and_run_continues() {
        let strategy = FixedQuantity(1.0);
        let state = run(
            &strategy,
            config(0.0, 1.0),
            vec![
                row(1, None, 1.0),
                row(2, Some(10.0), 1.0),
                row(3, Some(12.0), 0.0),
            ],
            1_000.0,
        );

        assert_eq!(state.skipped_steps, 1);
        assert_eq!(state.ledger.all()[0].timestamp, ts(2));
        assert_eq!(state.ledger.len(), 2);
        assert!(state.account.is_flat());
    }

    #[test]
    fn missing_signal_is_a_data_gap() {
        let strategy = FixedQuantity(1.0);
        let engine = ExecutionEngine::new(config(0.0, 1.0), &strategy);
        let mut state = RunState::new(1_000.0);

        let err = engine
            .step(&mut state, &FeatureRow::new(ts(1), Some(10.0)), None)
            .unwrap_err();
        assert!(matches!(err, ExecutionError::DataGap { ref field, .. } if field == "signal"));
        assert_eq!(state.last_price, Some((ts(1), 10.0)));
    }

    #[test]
    fn zero_sized_entry_is_cancelled() {
        let strategy = FixedQuantity(0.0);
        let engine = ExecutionEngine::new(config(0.0, 1.0), &strategy);
        let mut state = RunState::new(1_000.0);

        let err = engine.step(&mut state, &row(1, Some(10.0), 1.0), Some(1.0)).unwrap_err();
        assert!(matches!(err, ExecutionError::InsufficientCapital { .. }));
        assert!(state.ledger.is_empty());
        assert_eq!(state.cancelled_orders(), 1);
    }

    #[test]
    fn liquidation_uses_last_available_price() {
        let strategy = FixedQuantity(1.0);
        let state = run(
            &strategy,
            config(0.0, 1.0),
            vec![
                row(1, Some(10.0), 1.0),
                row(2, Some(15.0), 0.0),
                row(3, None, 0.0),
            ],
            1_000.0,
        );

        let last = state.ledger.last().unwrap();
        assert_eq!(last.side, Side::Sell);
        assert_eq!(last.timestamp, ts(2));
        assert_relative_eq!(last.price, 15.0);
        assert!(state.account.is_flat());
    }

    #[test]
    fn order_log_tracks_fills() {
        let strategy = FixedQuantity(1.0);
        let state = run(
            &strategy,
            config(0.0, 1.0),
            vec![row(1, Some(10.0), 1.0), row(2, Some(11.0), -1.0)],
            1_000.0,
        );
        assert_eq!(state.orders.len(), 2);
        assert!(state.orders.iter().all(|o| o.is_filled()));
        assert_eq!(state.cancelled_orders(), 0);
    }
}
