//! Derives the feature table from raw market, network and miner series.
//!
//! All series are aligned on the price series' dates. Derived values that are
//! undefined for a row (warmup, missing input, division by zero) are simply
//! absent from that row's indicators.

use chrono::NaiveDate;
use std::collections::{BTreeMap, HashMap};

use super::feature::{FeatureRow, FeatureTable, MetricPoint};
use super::rolling::{log_diff, pct_change, rolling_std};

/// Indicator column names produced by [`build_features`].
pub mod columns {
    pub const RETURNS: &str = "returns";
    pub const LOG_RETURNS: &str = "log_returns";
    pub const VOLATILITY: &str = "volatility";
    pub const VOLUME: &str = "volume";
    pub const ACTIVE_ADDRESSES: &str = "active_addresses";
    pub const ADDRESS_GROWTH: &str = "address_growth";
    pub const NETWORK_VELOCITY: &str = "network_velocity";
    pub const HASH_RATE: &str = "hash_rate";
    pub const HASH_RATE_GROWTH: &str = "hash_rate_growth";
    pub const MINER_FEES: &str = "miner_fees";
    pub const FEE_RATIO: &str = "fee_ratio";
}

/// Raw metric names as published by the data source.
pub mod sources {
    pub const ADDRESSES_COUNT: &str = "AddressesCount";
    pub const VELOCITY: &str = "Velocity";
    pub const HASH_RATE: &str = "HashRate";
    pub const FEES: &str = "Fees";
}

pub const VOLATILITY_WINDOW: usize = 20;

/// Everything a market data provider returns for one symbol.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawMarketData {
    pub prices: Vec<MetricPoint>,
    pub volume: Vec<MetricPoint>,
    pub network: BTreeMap<String, Vec<MetricPoint>>,
    pub miner: BTreeMap<String, Vec<MetricPoint>>,
}

impl RawMarketData {
    pub fn date_range(&self) -> Option<(NaiveDate, NaiveDate)> {
        let min = self.prices.iter().map(|p| p.date).min()?;
        let max = self.prices.iter().map(|p| p.date).max()?;
        Some((min, max))
    }
}

pub fn build_features(data: &RawMarketData) -> FeatureTable {
    let mut prices = data.prices.clone();
    prices.sort_by_key(|p| p.date);
    prices.dedup_by(|later, earlier| {
        if later.date == earlier.date {
            earlier.value = later.value;
            true
        } else {
            false
        }
    });

    let dates: Vec<NaiveDate> = prices.iter().map(|p| p.date).collect();
    let price_col: Vec<Option<f64>> = prices
        .iter()
        .map(|p| Some(p.value).filter(|v| v.is_finite()))
        .collect();

    let mut derived: Vec<(&str, Vec<Option<f64>>)> = Vec::new();

    let returns = pct_change(&price_col);
    derived.push((columns::VOLATILITY, rolling_std(&returns, VOLATILITY_WINDOW)));
    derived.push((columns::LOG_RETURNS, log_diff(&price_col)));
    derived.push((columns::RETURNS, returns));

    let volume = align(&dates, &data.volume);
    if !data.volume.is_empty() {
        derived.push((columns::VOLUME, volume.clone()));
    }

    if let Some(series) = data.network.get(sources::ADDRESSES_COUNT) {
        let addresses = align(&dates, series);
        derived.push((columns::ADDRESS_GROWTH, pct_change(&addresses)));
        derived.push((columns::ACTIVE_ADDRESSES, addresses));
    }

    if let Some(series) = data.network.get(sources::VELOCITY) {
        derived.push((columns::NETWORK_VELOCITY, align(&dates, series)));
    }

    if let Some(series) = data.miner.get(sources::HASH_RATE) {
        let hash_rate = align(&dates, series);
        derived.push((columns::HASH_RATE_GROWTH, pct_change(&hash_rate)));
        derived.push((columns::HASH_RATE, hash_rate));
    }

    if let Some(series) = data.miner.get(sources::FEES) {
        let fees = align(&dates, series);
        let ratio = fees
            .iter()
            .zip(&volume)
            .map(|(f, v)| match (f, v) {
                (Some(f), Some(v)) if *v != 0.0 => Some(f / v).filter(|r| r.is_finite()),
                _ => None,
            })
            .collect();
        derived.push((columns::FEE_RATIO, ratio));
        derived.push((columns::MINER_FEES, fees));
    }

    let rows = dates
        .iter()
        .enumerate()
        .map(|(i, date)| {
            let mut row = FeatureRow::new(date.and_time(chrono::NaiveTime::MIN), price_col[i]);
            for (name, values) in &derived {
                if let Some(v) = values[i] {
                    row.indicators.insert((*name).to_string(), v);
                }
            }
            row
        })
        .collect();

    FeatureTable::from_rows(rows)
}

fn align(dates: &[NaiveDate], series: &[MetricPoint]) -> Vec<Option<f64>> {
    let by_date: HashMap<NaiveDate, f64> = series
        .iter()
        .filter(|p| p.value.is_finite())
        .map(|p| (p.date, p.value))
        .collect();
    dates.iter().map(|d| by_date.get(d).copied()).collect()
}
