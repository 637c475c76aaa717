#![allow(dead_code)]

use chaintrader::domain::backtest::BacktestConfig;
use chaintrader::domain::error::ChaintraderError;
use chaintrader::domain::feature::{FeatureRow, FeatureTable, MetricPoint};
use chaintrader::domain::feature_builder::RawMarketData;
use chaintrader::ports::data_port::MarketDataProvider;
use chrono::{NaiveDate, NaiveDateTime};
use std::collections::HashMap;
use std::io::Write;
use std::path::Path;

pub struct MockDataProvider {
    pub data: HashMap<String, RawMarketData>,
    pub errors: HashMap<String, String>,
}

impl MockDataProvider {
    pub fn new() -> Self {
        Self {
            data: HashMap::new(),
            errors: HashMap::new(),
        }
    }

    pub fn with_data(mut self, symbol: &str, data: RawMarketData) -> Self {
        self.data.insert(symbol.to_string(), data);
        self
    }

    pub fn with_error(mut self, symbol: &str, reason: &str) -> Self {
        self.errors.insert(symbol.to_string(), reason.to_string());
        self
    }
}

impl MarketDataProvider for MockDataProvider {
    fn load_market_data(&self, symbol: &str) -> Result<RawMarketData, ChaintraderError> {
        if let Some(reason) = self.errors.get(symbol) {
            return Err(ChaintraderError::Data {
                reason: reason.clone(),
            });
        }
        Ok(self.data.get(symbol).cloned().unwrap_or_default())
    }
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub fn ts(y: i32, m: u32, d: u32) -> NaiveDateTime {
    date(y, m, d).and_hms_opt(0, 0, 0).unwrap()
}

/// Day `n` (0-based) counted from 2024-01-01.
pub fn day(n: usize) -> NaiveDateTime {
    ts(2024, 1, 1) + chrono::Duration::days(n as i64)
}

/// One row per `(price, signal)` pair on consecutive days from 2024-01-01.
pub fn signal_table(rows: &[(f64, f64)]) -> FeatureTable {
    FeatureTable::from_rows(
        rows.iter()
            .enumerate()
            .map(|(i, &(price, signal))| FeatureRow::new(day(i), Some(price)).with_signal(signal))
            .collect(),
    )
}

/// Daily series on consecutive days from 2024-01-01.
pub fn series(values: &[f64]) -> Vec<MetricPoint> {
    values
        .iter()
        .enumerate()
        .map(|(i, &value)| MetricPoint {
            date: day(i).date(),
            value,
        })
        .collect()
}

pub fn sample_config() -> BacktestConfig {
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

pub fn write_file(dir: &Path, name: &str, content: &str) {
    let mut file = std::fs::File::create(dir.join(name)).unwrap();
    file.write_all(content.as_bytes()).unwrap();
}
