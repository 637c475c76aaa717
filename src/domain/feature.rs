//! Feature rows, the feature table, and raw market series.

use chrono::{NaiveDate, NaiveDateTime};
use std::collections::BTreeMap;

use super::error::ExecutionError;

/// One observation of a raw daily series (price, volume, on-chain metric).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MetricPoint {
    pub date: NaiveDate,
    pub value: f64,
}

/// A market close used to value the portfolio.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PricePoint {
    pub date: NaiveDate,
    pub price: f64,
}

/// One timestamp's price, derived indicators and optional precomputed signal.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureRow {
    pub timestamp: NaiveDateTime,
    pub price: Option<f64>,
    pub indicators: BTreeMap<String, f64>,
    pub signal: Option<f64>,
}

impl FeatureRow {
    pub fn new(timestamp: NaiveDateTime, price: Option<f64>) -> Self {
        FeatureRow {
            timestamp,
            price,
            indicators: BTreeMap::new(),
            signal: None,
        }
    }

    pub fn with_indicator(mut self, name: &str, value: f64) -> Self {
        self.indicators.insert(name.to_string(), value);
        self
    }

    pub fn with_signal(mut self, signal: f64) -> Self {
        self.signal = Some(signal);
        self
    }

    /// The indicator value if present and finite.
    pub fn indicator(&self, name: &str) -> Option<f64> {
        self.indicators.get(name).copied().filter(|v| v.is_finite())
    }

    /// The row's price, or a data gap if it is missing, non-finite or non-positive.
    pub fn require_price(&self) -> Result<f64, ExecutionError> {
        self.price
            .filter(|p| p.is_finite() && *p > 0.0)
            .ok_or_else(|| ExecutionError::DataGap {
                timestamp: self.timestamp,
                field: "price".to_string(),
            })
    }

    pub fn require_indicator(&self, name: &str) -> Result<f64, ExecutionError> {
        self.indicator(name).ok_or_else(|| ExecutionError::DataGap {
            timestamp: self.timestamp,
            field: name.to_string(),
        })
    }
}

/// Chronologically ordered rows with unique timestamps.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeatureTable {
    rows: Vec<FeatureRow>,
}

impl FeatureTable {
    /// Sorts rows by timestamp and drops duplicate timestamps, keeping the
    /// last occurrence in input order.
    pub fn from_rows(mut rows: Vec<FeatureRow>) -> Self {
        rows.sort_by_key(|r| r.timestamp);

        let mut deduped: Vec<FeatureRow> = Vec::with_capacity(rows.len());
        for row in rows {
            match deduped.last_mut() {
                Some(last) if last.timestamp == row.timestamp => *last = row,
                _ => deduped.push(row),
            }
        }
        FeatureTable { rows: deduped }
    }

    pub fn rows(&self) -> &[FeatureRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn first_timestamp(&self) -> Option<NaiveDateTime> {
        self.rows.first().map(|r| r.timestamp)
    }

    pub fn last_timestamp(&self) -> Option<NaiveDateTime> {
        self.rows.last().map(|r| r.timestamp)
    }

    /// Rows with `start <= timestamp <= end`; either bound may be open.
    pub fn filter_range(
        &self,
        start: Option<NaiveDateTime>,
        end: Option<NaiveDateTime>,
    ) -> FeatureTable {
        let rows = self
            .rows
            .iter()
            .filter(|r| start.is_none_or(|s| r.timestamp >= s))
            .filter(|r| end.is_none_or(|e| r.timestamp <= e))
            .cloned()
            .collect();
        FeatureTable { rows }
    }

    pub fn prices(&self) -> Vec<Option<f64>> {
        self.rows.iter().map(|r| r.price).collect()
    }

    pub fn column(&self, name: &str) -> Vec<Option<f64>> {
        self.rows.iter().map(|r| r.indicator(name)).collect()
    }

    /// One price per calendar day (the last valid price seen that day).
    pub fn price_series(&self) -> Vec<PricePoint> {
        let mut points: Vec<PricePoint> = Vec::new();
        for row in &self.rows {
            let Some(price) = row.price.filter(|p| p.is_finite() && *p > 0.0) else {
                continue;
            };
            let date = row.timestamp.date();
            match points.last_mut() {
                Some(last) if last.date == date => last.price = price,
                _ => points.push(PricePoint { date, price }),
            }
        }
        points
    }
}

/// Parses `YYYY-MM-DD`, `YYYY-MM-DD HH:MM:SS` (or with a `T` separator), or
/// unix epoch milliseconds. Dates map to midnight.
pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return date.and_hms_opt(0, 0, 0);
    }
    for format in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"] {
        if let Ok(ts) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(ts);
        }
    }
    raw.parse::<i64>()
        .ok()
        .and_then(chrono::DateTime::from_timestamp_millis)
        .map(|dt| dt.naive_utc())
}
