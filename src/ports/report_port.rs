//! Report generation port.

use crate::domain::backtest::BacktestReport;
use crate::domain::error::ChaintraderError;
use std::path::Path;

/// Port for writing backtest reports.
pub trait ReportPort {
    fn write(&self, report: &BacktestReport, output_path: &Path) -> Result<(), ChaintraderError>;
}
