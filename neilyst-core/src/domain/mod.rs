//! Domain types for Neilyst

pub mod bar;
pub mod position;
pub mod signal;
pub mod timeframe;
pub mod trade;

pub use bar::{normalize_series, Bar};
pub use position::{Direction, Position, PositionError, Side};
pub use signal::{Signal, SignalAction};
pub use timeframe::{normalize_symbol, Timeframe, TimeframeError};
pub use trade::TradeRecord;

/// Symbol type alias
pub type Symbol = String;
