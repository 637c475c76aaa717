//! CSV file data adapter.
//!
//! Raw series live in one directory, one file per metric:
//!
//! - `{symbol}-FundData-MarketPriceUSD.csv` (required)
//! - `{symbol}-FundData-MarketVolume.csv`
//! - `{symbol}-NetworkData-{Metric}.csv`
//! - `{symbol}-Miner-{Metric}.csv`
//!
//! Each file has a `date` column and one value column. A precomputed feature
//! table is a single CSV with `timestamp`, `price`, an optional `signal`, and
//! any number of indicator columns.

use crate::domain::error::ChaintraderError;
use crate::domain::feature::{parse_timestamp, FeatureRow, FeatureTable, MetricPoint};
use crate::domain::feature_builder::RawMarketData;
use crate::domain::ledger::Ledger;
use crate::ports::data_port::MarketDataProvider;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

pub struct CsvAdapter {
    base_path: PathBuf,
}

impl CsvAdapter {
    pub fn new(base_path: PathBuf) -> Self {
        Self { base_path }
    }

    fn csv_path(&self, symbol: &str, group: &str, metric: &str) -> PathBuf {
        self.base_path
            .join(format!("{}-{}-{}.csv", symbol, group, metric))
    }

    /// Metric name to path for every `{symbol}-{group}-*.csv` in the directory.
    fn metric_files(
        &self,
        symbol: &str,
        group: &str,
    ) -> Result<BTreeMap<String, PathBuf>, ChaintraderError> {
        let entries = fs::read_dir(&self.base_path).map_err(|e| ChaintraderError::Data {
            reason: format!(
                "failed to read directory {}: {}",
                self.base_path.display(),
                e
            ),
        })?;

        let prefix = format!("{}-{}-", symbol, group);
        let mut files = BTreeMap::new();

        for entry in entries {
            let entry = entry.map_err(|e| ChaintraderError::Data {
                reason: format!("directory entry error: {}", e),
            })?;

            let name = entry.file_name();
            let name_str = name.to_string_lossy();

            if let Some(metric) = name_str
                .strip_prefix(&prefix)
                .and_then(|rest| rest.strip_suffix(".csv"))
                .filter(|m| !m.is_empty())
            {
                files.insert(metric.to_string(), entry.path());
            }
        }

        Ok(files)
    }

    fn load_group(
        &self,
        symbol: &str,
        group: &str,
    ) -> Result<BTreeMap<String, Vec<MetricPoint>>, ChaintraderError> {
        let mut series = BTreeMap::new();
        for (metric, path) in self.metric_files(symbol, group)? {
            let points = read_series(&path)?;
            debug!(group, metric = %metric, points = points.len(), "loaded series");
            series.insert(metric, points);
        }
        Ok(series)
    }
}

impl MarketDataProvider for CsvAdapter {
    fn load_market_data(&self, symbol: &str) -> Result<RawMarketData, ChaintraderError> {
        let prices = read_series(&self.csv_path(symbol, "FundData", "MarketPriceUSD"))?;

        let volume_path = self.csv_path(symbol, "FundData", "MarketVolume");
        let volume = if volume_path.exists() {
            read_series(&volume_path)?
        } else {
            debug!(path = %volume_path.display(), "no volume series");
            Vec::new()
        };

        Ok(RawMarketData {
            prices,
            volume,
            network: self.load_group(symbol, "NetworkData")?,
            miner: self.load_group(symbol, "Miner")?,
        })
    }
}

fn data_error(path: &Path, e: impl std::fmt::Display) -> ChaintraderError {
    ChaintraderError::Data {
        reason: format!("{}: {}", path.display(), e),
    }
}

/// Reads a `date,value` file. Rows with an empty or non-numeric value are
/// dropped; a malformed date is an error.
pub fn read_series(path: &Path) -> Result<Vec<MetricPoint>, ChaintraderError> {
    let mut rdr = csv::Reader::from_path(path).map_err(|e| data_error(path, e))?;
    let headers = rdr.headers().map_err(|e| data_error(path, e))?.clone();

    let date_idx = headers
        .iter()
        .position(|h| h.trim().eq_ignore_ascii_case("date"))
        .ok_or_else(|| data_error(path, "missing date column"))?;
    let value_idx = (0..headers.len())
        .find(|&i| i != date_idx)
        .ok_or_else(|| data_error(path, "missing value column"))?;

    let mut points = Vec::new();
    let mut dropped = 0usize;

    for (line, result) in rdr.records().enumerate() {
        let record = result.map_err(|e| data_error(path, e))?;

        let date_str = record.get(date_idx).unwrap_or_default();
        let date = parse_timestamp(date_str)
            .map(|ts| ts.date())
            .ok_or_else(|| {
                data_error(path, format!("row {}: invalid date '{}'", line + 2, date_str))
            })?;

        match record.get(value_idx).map(str::trim).and_then(|v| v.parse::<f64>().ok()) {
            Some(value) => points.push(MetricPoint { date, value }),
            None => dropped += 1,
        }
    }

    if dropped > 0 {
        warn!(path = %path.display(), dropped, "dropped rows without a numeric value");
    }

    points.sort_by_key(|p| p.date);
    Ok(points)
}

/// Reads a precomputed feature table. Empty cells are treated as missing.
pub fn read_feature_table(path: &Path) -> Result<FeatureTable, ChaintraderError> {
    let mut rdr = csv::Reader::from_path(path).map_err(|e| data_error(path, e))?;
    let headers: Vec<String> = rdr
        .headers()
        .map_err(|e| data_error(path, e))?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();

    let find = |names: &[&str]| {
        headers
            .iter()
            .position(|h| names.iter().any(|n| h.eq_ignore_ascii_case(n)))
    };
    let ts_idx = find(&["timestamp", "date"])
        .ok_or_else(|| data_error(path, "missing timestamp column"))?;
    let price_idx = find(&["price"]).ok_or_else(|| data_error(path, "missing price column"))?;
    let signal_idx = find(&["signal"]);

    let mut rows = Vec::new();
    for (line, result) in rdr.records().enumerate() {
        let record = result.map_err(|e| data_error(path, e))?;
        let row_no = line + 2;

        let cell = |idx: usize| -> Result<Option<f64>, ChaintraderError> {
            match record.get(idx).map(str::trim) {
                None | Some("") => Ok(None),
                Some(raw) => raw.parse::<f64>().map(Some).map_err(|_| {
                    data_error(
                        path,
                        format!("row {}: invalid number '{}' in {}", row_no, raw, headers[idx]),
                    )
                }),
            }
        };

        let ts_str = record.get(ts_idx).unwrap_or_default();
        let timestamp = parse_timestamp(ts_str).ok_or_else(|| {
            data_error(path, format!("row {}: invalid timestamp '{}'", row_no, ts_str))
        })?;

        let mut row = FeatureRow::new(timestamp, cell(price_idx)?);
        if let Some(idx) = signal_idx {
            row.signal = cell(idx)?;
        }
        for idx in 0..headers.len() {
            if idx == ts_idx || idx == price_idx || Some(idx) == signal_idx {
                continue;
            }
            if let Some(value) = cell(idx)? {
                row.indicators.insert(headers[idx].clone(), value);
            }
        }
        rows.push(row);
    }

    Ok(FeatureTable::from_rows(rows))
}

/// Writes every fill as one CSV row.
pub fn write_ledger_csv(ledger: &Ledger, path: &Path) -> Result<(), ChaintraderError> {
    let mut wtr = csv::Writer::from_path(path).map_err(|e| data_error(path, e))?;
    wtr.write_record([
        "timestamp",
        "symbol",
        "side",
        "quantity",
        "price",
        "commission",
        "notional",
    ])
    .map_err(|e| data_error(path, e))?;

    for fill in ledger.all() {
        wtr.write_record([
            fill.timestamp.format("%Y-%m-%d %H:%M:%S").to_string(),
            fill.symbol.clone(),
            fill.side.to_string(),
            fill.quantity.to_string(),
            fill.price.to_string(),
            fill.commission.to_string(),
            fill.notional().to_string(),
        ])
        .map_err(|e| data_error(path, e))?;
    }

    wtr.flush()?;
    Ok(())
}
