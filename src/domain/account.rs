//! Cash and position state for a single-asset backtest.

use chrono::NaiveDateTime;

use super::error::ExecutionError;
use super::order::{Fill, Side};

/// Cash and held quantity for one run.
///
/// Both fields stay non-negative. They are only changed through
/// [`apply_buy`](Self::apply_buy), [`apply_sell`](Self::apply_sell) and
/// [`liquidate`](Self::liquidate), each of which validates its inputs before
/// touching either field.
#[derive(Debug, Clone, PartialEq)]
pub struct PositionAccount {
    cash: f64,
    held_quantity: f64,
}

impl PositionAccount {
    pub fn new(initial_capital: f64) -> Self {
        PositionAccount {
            cash: initial_capital.max(0.0),
            held_quantity: 0.0,
        }
    }

    pub fn cash(&self) -> f64 {
        self.cash
    }

    pub fn held_quantity(&self) -> f64 {
        self.held_quantity
    }

    pub fn is_flat(&self) -> bool {
        self.held_quantity <= 0.0
    }

    /// Cash plus holdings marked at `price`.
    pub fn equity(&self, price: f64) -> f64 {
        self.cash + self.held_quantity * price
    }

    /// Buy `quantity` at `price`.
    ///
    /// When `quantity * price * (1 + commission_rate)` exceeds cash, the
    /// quantity is clamped once to `cash / (price * (1 + commission_rate))`.
    /// A clamped quantity of zero is reported as
    /// [`ExecutionError::InsufficientCapital`].
    pub fn apply_buy(
        &mut self,
        timestamp: NaiveDateTime,
        symbol: &str,
        quantity: f64,
        price: f64,
        commission_rate: f64,
    ) -> Result<Fill, ExecutionError> {
        validate_order(quantity, price, commission_rate)?;

        let unit_cost = price * (1.0 + commission_rate);
        let mut quantity = quantity;
        if quantity * unit_cost > self.cash {
            quantity = self.cash / unit_cost;
        }
        if quantity <= 0.0 {
            return Err(ExecutionError::InsufficientCapital {
                cash: self.cash,
                price,
            });
        }

        let notional = quantity * price;
        let commission = notional * commission_rate;

        self.cash = (self.cash - (notional + commission)).max(0.0);
        self.held_quantity += quantity;

        Ok(Fill {
            timestamp,
            symbol: symbol.to_string(),
            side: Side::Buy,
            quantity,
            price,
            commission,
        })
    }

    /// Sell `quantity` at `price`; proceeds net of commission go to cash.
    pub fn apply_sell(
        &mut self,
        timestamp: NaiveDateTime,
        symbol: &str,
        quantity: f64,
        price: f64,
        commission_rate: f64,
    ) -> Result<Fill, ExecutionError> {
        validate_order(quantity, price, commission_rate)?;

        if quantity > self.held_quantity {
            return Err(ExecutionError::InsufficientPosition {
                requested: quantity,
                held: self.held_quantity,
            });
        }

        let notional = quantity * price;
        let commission = notional * commission_rate;

        self.cash += notional - commission;
        self.held_quantity = (self.held_quantity - quantity).max(0.0);

        Ok(Fill {
            timestamp,
            symbol: symbol.to_string(),
            side: Side::Sell,
            quantity,
            price,
            commission,
        })
    }

    /// Sell everything still held. Returns `Ok(None)` when already flat.
    pub fn liquidate(
        &mut self,
        timestamp: NaiveDateTime,
        symbol: &str,
        price: f64,
        commission_rate: f64,
    ) -> Result<Option<Fill>, ExecutionError> {
        if self.is_flat() {
            return Ok(None);
        }
        let quantity = self.held_quantity;
        self.apply_sell(timestamp, symbol, quantity, price, commission_rate)
            .map(Some)
    }
}

fn validate_order(quantity: f64, price: f64, commission_rate: f64) -> Result<(), ExecutionError> {
    if !quantity.is_finite() || quantity <= 0.0 {
        return Err(ExecutionError::InvalidOrder {
            reason: format!("quantity must be positive and finite, got {quantity}"),
        });
    }
    if !price.is_finite() || price <= 0.0 {
        return Err(ExecutionError::InvalidOrder {
            reason: format!("price must be positive and finite, got {price}"),
        });
    }
    if !(0.0..1.0).contains(&commission_rate) {
        return Err(ExecutionError::InvalidOrder {
            reason: format!("commission rate must be in [0, 1), got {commission_rate}"),
        });
    }
    Ok(())
}
