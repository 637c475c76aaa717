//! Market data access port.

use crate::domain::error::ChaintraderError;
use crate::domain::feature_builder::RawMarketData;
use chrono::NaiveDate;

pub trait MarketDataProvider {
    /// Price, volume, network and miner series for `symbol`.
    fn load_market_data(&self, symbol: &str) -> Result<RawMarketData, ChaintraderError>;

    /// First and last price date plus the number of price observations.
    fn get_data_range(
        &self,
        symbol: &str,
    ) -> Result<Option<(NaiveDate, NaiveDate, usize)>, ChaintraderError> {
        let data = self.load_market_data(symbol)?;
        Ok(data
            .date_range()
            .map(|(first, last)| (first, last, data.prices.len())))
    }
}
