//! Performance metrics derived from the fill ledger and market prices.
//!
//! The ledger is replayed against a daily calendar spanning the price series,
//! independent of the live account, so metrics can be recomputed after the
//! fact from the same inputs with identical results.

use chrono::NaiveDate;
use std::collections::BTreeMap;
use tracing::warn;

use super::feature::PricePoint;
use super::ledger::Ledger;
use super::order::{Fill, Side};

const TRADING_DAYS_PER_YEAR: f64 = 252.0;

/// Relative slack when replaying fills, so a buy sized to exactly the
/// available cash is not rejected over rounding.
const REPLAY_TOLERANCE: f64 = 1e-9;

#[derive(Debug, Clone, PartialEq)]
pub struct Metrics {
    pub total_return: f64,
    pub sharpe_ratio: f64,
    pub max_drawdown: f64,
    pub win_rate: f64,
    pub total_trades: usize,
    pub avg_trade_return: f64,
}

impl Metrics {
    /// Human-readable summary; fields always appear in the same order.
    pub fn render(&self, initial_capital: f64) -> String {
        let mut out = String::new();
        out.push_str("Performance Report\n");
        out.push_str("------------------\n");
        out.push_str(&format!("Initial Capital: ${}\n", format_money(initial_capital)));
        out.push_str(&format!("Total Return: {:.2}%\n", self.total_return * 100.0));
        out.push_str(&format!("Sharpe Ratio: {:.2}\n", self.sharpe_ratio));
        out.push_str(&format!("Max Drawdown: {:.2}%\n", self.max_drawdown * 100.0));
        out.push_str(&format!("Win Rate: {:.2}%\n", self.win_rate * 100.0));
        out.push_str(&format!("Total Trades: {}\n", self.total_trades));
        out.push_str(&format!(
            "Average Trade Return: ${}\n",
            format_money(self.avg_trade_return)
        ));
        out
    }
}

/// `1234567.891` -> `1,234,567.89`.
pub fn format_money(value: f64) -> String {
    let formatted = format!("{:.2}", value.abs());
    let (int_part, frac_part) = formatted.split_once('.').unwrap_or((&formatted, "00"));

    let mut grouped = String::with_capacity(int_part.len() + int_part.len() / 3);
    for (i, ch) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }

    let sign = if value < 0.0 && formatted != "0.00" { "-" } else { "" };
    format!("{sign}{grouped}.{frac_part}")
}

/// End-of-day portfolio value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ValuationPoint {
    pub date: NaiveDate,
    pub value: f64,
}

impl Metrics {
    pub fn compute(
        ledger: &Ledger,
        prices: &[PricePoint],
        initial_capital: f64,
        risk_free_rate: f64,
    ) -> Self {
        let valuations = valuation_series(ledger, prices, initial_capital);
        let returns = daily_returns(&valuations);

        Metrics {
            total_return: finite_or_zero(total_return(&returns)),
            sharpe_ratio: finite_or_zero(sharpe_ratio(&returns, risk_free_rate)),
            max_drawdown: finite_or_zero(max_drawdown(&returns)),
            win_rate: finite_or_zero(win_rate(ledger.all())),
            total_trades: ledger.len(),
            avg_trade_return: finite_or_zero(avg_trade_return(ledger)),
        }
    }
}

/// Replays the ledger day by day over the price calendar and marks each day
/// to the nearest available price.
///
/// The series opens with `initial_capital` on the day before the first price,
/// so fills on the first calendar day show up in the returns.
pub fn valuation_series(
    ledger: &Ledger,
    prices: &[PricePoint],
    initial_capital: f64,
) -> Vec<ValuationPoint> {
    let mut prices: Vec<PricePoint> = prices
        .iter()
        .copied()
        .filter(|p| p.price.is_finite())
        .collect();
    prices.sort_by_key(|p| p.date);

    let (Some(first), Some(last)) = (prices.first(), prices.last()) else {
        return Vec::new();
    };

    let mut fills_by_day: BTreeMap<NaiveDate, Vec<&Fill>> = BTreeMap::new();
    for fill in ledger.all() {
        fills_by_day
            .entry(fill.timestamp.date())
            .or_default()
            .push(fill);
    }

    let mut cash = initial_capital;
    let mut holdings = 0.0_f64;
    let mut series = vec![ValuationPoint {
        date: first.date.pred_opt().unwrap_or(first.date),
        value: initial_capital,
    }];

    for day in first.date.iter_days().take_while(|d| *d <= last.date) {
        for fill in fills_by_day.get(&day).into_iter().flatten() {
            replay(fill, &mut cash, &mut holdings);
        }

        if let Some(price) = nearest_price(&prices, day) {
            series.push(ValuationPoint {
                date: day,
                value: cash + holdings * price,
            });
        }
    }

    series
}

fn replay(fill: &Fill, cash: &mut f64, holdings: &mut f64) {
    let notional = fill.notional();
    match fill.side {
        Side::Buy => {
            let cost = notional + fill.commission;
            if cost > *cash + REPLAY_TOLERANCE * cash.abs().max(1.0) {
                warn!(timestamp = %fill.timestamp, cost, cash = *cash, "replayed buy exceeds cash, skipping");
                return;
            }
            *cash = (*cash - cost).max(0.0);
            *holdings += fill.quantity;
        }
        Side::Sell => {
            if fill.quantity > *holdings + REPLAY_TOLERANCE * holdings.abs().max(1.0) {
                warn!(timestamp = %fill.timestamp, quantity = fill.quantity, holdings = *holdings, "replayed sell exceeds holdings, skipping");
                return;
            }
            *cash += notional - fill.commission;
            *holdings = (*holdings - fill.quantity).max(0.0);
        }
    }
}

/// Price on the closest date to `day`; equidistant dates resolve to the later one.
fn nearest_price(sorted: &[PricePoint], day: NaiveDate) -> Option<f64> {
    let idx = sorted.partition_point(|p| p.date < day);
    let after = sorted.get(idx);
    let before = idx.checked_sub(1).and_then(|i| sorted.get(i));

    match (before, after) {
        (None, None) => None,
        (Some(b), None) => Some(b.price),
        (None, Some(a)) => Some(a.price),
        (Some(b), Some(a)) => {
            let to_before = (day - b.date).num_days();
            let to_after = (a.date - day).num_days();
            if to_before < to_after {
                Some(b.price)
            } else {
                Some(a.price)
            }
        }
    }
}

/// Day-over-day fractional change; the first return is 0.
pub fn daily_returns(valuations: &[ValuationPoint]) -> Vec<f64> {
    if valuations.is_empty() {
        return Vec::new();
    }
    let mut returns = Vec::with_capacity(valuations.len());
    returns.push(0.0);
    for w in valuations.windows(2) {
        let r = (w[1].value - w[0].value) / w[0].value;
        returns.push(if r.is_nan() { 0.0 } else { r });
    }
    returns
}

pub fn total_return(returns: &[f64]) -> f64 {
    if returns.is_empty() {
        return 0.0;
    }
    returns.iter().map(|r| 1.0 + r).product::<f64>() - 1.0
}

/// Annualised Sharpe ratio using the sample standard deviation of returns.
pub fn sharpe_ratio(returns: &[f64], risk_free_rate: f64) -> f64 {
    if returns.len() < 2 {
        return 0.0;
    }
    let n = returns.len() as f64;
    let mean = returns.iter().sum::<f64>() / n;
    let variance = returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / (n - 1.0);
    let stddev = variance.sqrt();
    if stddev == 0.0 || !stddev.is_finite() {
        return 0.0;
    }

    let excess = mean - risk_free_rate / TRADING_DAYS_PER_YEAR;
    TRADING_DAYS_PER_YEAR.sqrt() * excess / stddev
}

/// Most negative `(cumulative - running_peak) / running_peak`; 0 or below.
pub fn max_drawdown(returns: &[f64]) -> f64 {
    let mut cumulative = 1.0_f64;
    let mut peak = f64::NEG_INFINITY;
    let mut worst = 0.0_f64;

    for r in returns {
        cumulative *= 1.0 + r;
        peak = peak.max(cumulative);
        let dd = (cumulative - peak) / peak;
        if dd < worst || dd.is_nan() {
            worst = dd;
        }
    }

    if worst.is_finite() { worst } else { 0.0 }
}

/// Share of fills whose per-leg signed PnL is positive (i.e. the sell legs).
pub fn win_rate(fills: &[Fill]) -> f64 {
    if fills.is_empty() {
        return 0.0;
    }
    let winners = fills.iter().filter(|f| f.signed_pnl() > 0.0).count();
    winners as f64 / fills.len() as f64
}

/// Realised profit (sell notional minus buy notional) per completed sell.
pub fn avg_trade_return(ledger: &Ledger) -> f64 {
    let tally = |(count, total): (usize, f64), fill: &Fill| (count + 1, total + fill.notional());
    let (buys, buy_cost) = ledger.buys().fold((0, 0.0), tally);
    let (sells, sell_proceeds) = ledger.sells().fold((0, 0.0), tally);
    if buys == 0 || sells == 0 {
        return 0.0;
    }
    (sell_proceeds - buy_cost) / sells as f64
}

fn finite_or_zero(v: f64) -> f64 {
    if v.is_finite() { v } else { 0.0 }
}
