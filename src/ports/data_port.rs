//! Data access port trait.

use crate::domain::error::RulebenchError;
use crate::domain::ohlcv::Bar;

/// Source of bar data. Implementations return bars as stored; ordering and
/// integrity are checked by the simulator.
pub trait DataPort {
    fn fetch_bars(&self, symbol: &str, timeframe: &str) -> Result<Vec<Bar>, RulebenchError>;
}
