//! Orders and fills.

use chrono::NaiveDateTime;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    /// +1 for sells (cash in), -1 for buys (cash out).
    pub fn cash_sign(self) -> f64 {
        match self {
            Side::Buy => -1.0,
            Side::Sell => 1.0,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Buy => write!(f, "buy"),
            Side::Sell => write!(f, "sell"),
        }
    }
}

/// An order request created by the execution engine.
///
/// Orders are never modified after creation; their outcome is captured
/// separately as an [`OrderStatus`].
#[derive(Debug, Clone, PartialEq)]
pub struct Order {
    pub symbol: String,
    pub side: Side,
    pub requested_quantity: f64,
    pub reference_price: f64,
    pub timestamp: NaiveDateTime,
}

#[derive(Debug, Clone, PartialEq)]
pub enum OrderStatus {
    Filled,
    Cancelled { reason: String },
}

/// An order paired with how its lifecycle ended.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderRecord {
    pub order: Order,
    pub status: OrderStatus,
}

impl OrderRecord {
    pub fn is_filled(&self) -> bool {
        matches!(self.status, OrderStatus::Filled)
    }
}

/// A completed execution. `commission = quantity * price * commission_rate`.
#[derive(Debug, Clone, PartialEq)]
pub struct Fill {
    pub timestamp: NaiveDateTime,
    pub symbol: String,
    pub side: Side,
    pub quantity: f64,
    pub price: f64,
    pub commission: f64,
}

impl Fill {
    pub fn notional(&self) -> f64 {
        self.quantity * self.price
    }

    /// Per-leg signed PnL: sell notional is positive, buy notional negative.
    pub fn signed_pnl(&self) -> f64 {
        self.notional() * self.side.cash_sign()
    }

    /// Net cash movement including commission.
    pub fn cash_delta(&self) -> f64 {
        match self.side {
            Side::Buy => -(self.notional() + self.commission),
            Side::Sell => self.notional() - self.commission,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn fill(side: Side, quantity: f64, price: f64, commission: f64) -> Fill {
        Fill {
            timestamp: NaiveDate::from_ymd_opt(2024, 1, 15)
                .unwrap()
                .and_hms_opt(0, 0, 0)
                .unwrap(),
            symbol: "BTC".into(),
            side,
            quantity,
            price,
            commission,
        }
    }

    #[test]
    fn signed_pnl_follows_side() {
        assert!((fill(Side::Sell, 2.0, 100.0, 0.0).signed_pnl() - 200.0).abs() < f64::EPSILON);
        assert!((fill(Side::Buy, 2.0, 100.0, 0.0).signed_pnl() + 200.0).abs() < f64::EPSILON);
    }

    #[test]
    fn cash_delta_includes_commission() {
        let buy = fill(Side::Buy, 1.0, 50_000.0, 100.0);
        assert!((buy.cash_delta() + 50_100.0).abs() < f64::EPSILON);

        let sell = fill(Side::Sell, 1.0, 55_000.0, 110.0);
        assert!((sell.cash_delta() - 54_890.0).abs() < f64::EPSILON);
    }

    #[test]
    fn side_display() {
        assert_eq!(Side::Buy.to_string(), "buy");
        assert_eq!(Side::Sell.to_string(), "sell");
    }
}
