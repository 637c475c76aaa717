//! Plain-text report adapter implementing ReportPort.

use std::fs;
use std::path::Path;

use crate::domain::backtest::BacktestReport;
use crate::domain::error::ChaintraderError;
use crate::domain::order::OrderStatus;
use crate::ports::report_port::ReportPort;

pub struct TextReportAdapter;

impl TextReportAdapter {
    pub fn new() -> Self {
        Self
    }

    /// Summary, trade log and dropped orders.
    pub fn render(report: &BacktestReport) -> String {
        let mut out = report.render_text();

        out.push_str("\nTrade Log\n---------\n");
        if report.ledger.is_empty() {
            out.push_str("(no trades)\n");
        } else {
            out.push_str(&format!(
                "{:<19} {:<4} {:>16} {:>14} {:>12}\n",
                "timestamp", "side", "quantity", "price", "commission"
            ));
            for fill in report.ledger.all() {
                out.push_str(&format!(
                    "{} {:<4} {:>16.8} {:>14.2} {:>12.2}\n",
                    fill.timestamp.format("%Y-%m-%d %H:%M:%S"),
                    fill.side,
                    fill.quantity,
                    fill.price,
                    fill.commission,
                ));
            }
        }

        let cancelled: Vec<_> = report.cancelled_orders().collect();
        if !cancelled.is_empty() {
            out.push_str("\nDropped Orders\n--------------\n");
            for record in cancelled {
                if let OrderStatus::Cancelled { reason } = &record.status {
                    out.push_str(&format!(
                        "{} {} {:.8}: {}\n",
                        record.order.timestamp.format("%Y-%m-%d %H:%M:%S"),
                        record.order.side,
                        record.order.requested_quantity,
                        reason,
                    ));
                }
            }
        }

        out
    }
}

impl Default for TextReportAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl ReportPort for TextReportAdapter {
    fn write(&self, report: &BacktestReport, output_path: &Path) -> Result<(), ChaintraderError> {
        if let Some(parent) = output_path.parent() {
            fs::create_dir_all(parent).map_err(ChaintraderError::Io)?;
        }
        fs::write(output_path, Self::render(report)).map_err(ChaintraderError::Io)?;
        Ok(())
    }
}
