//! Append-only fill ledger.

use chrono::NaiveDateTime;

use super::error::ExecutionError;
use super::order::{Fill, Side};

/// Chronological record of every fill in a run.
///
/// `record` is the only mutator. Fills must arrive in non-decreasing
/// timestamp order so the ledger can be replayed day by day.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Ledger {
    fills: Vec<Fill>,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, fill: Fill) -> Result<(), ExecutionError> {
        self.ensure_chronological(fill.timestamp)?;
        self.fills.push(fill);
        Ok(())
    }

    /// Whether a fill stamped `timestamp` could be recorded next.
    pub fn ensure_chronological(&self, timestamp: NaiveDateTime) -> Result<(), ExecutionError> {
        match self.fills.last() {
            Some(last) if timestamp < last.timestamp => Err(ExecutionError::OutOfOrderFill {
                timestamp,
                last: last.timestamp,
            }),
            _ => Ok(()),
        }
    }

    pub fn all(&self) -> &[Fill] {
        &self.fills
    }

    pub fn len(&self) -> usize {
        self.fills.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fills.is_empty()
    }

    pub fn last(&self) -> Option<&Fill> {
        self.fills.last()
    }

    pub fn buys(&self) -> impl Iterator<Item = &Fill> {
        self.fills.iter().filter(|f| f.side == Side::Buy)
    }

    pub fn sells(&self) -> impl Iterator<Item = &Fill> {
        self.fills.iter().filter(|f| f.side == Side::Sell)
    }
}

impl FromIterator<Fill> for Ledger {
    /// Builds a ledger from fills in any order; they are sorted stably by timestamp.
    fn from_iter<I: IntoIterator<Item = Fill>>(iter: I) -> Self {
        let mut fills: Vec<Fill> = iter.into_iter().collect();
        fills.sort_by_key(|f| f.timestamp);
        Ledger { fills }
    }
}
