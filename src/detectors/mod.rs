//! Pattern detectors
//!
//! Every detector is a plain config struct implementing
//! [`ChartDetector`](crate::engine::ChartDetector). Detectors read the bars and
//! the precomputed [`DetectionContext`](crate::engine::DetectionContext); none of
//! them finds extrema on its own.
//!
//! # Detectors
//!
//! - **Levels**: support/resistance clustering of extrema
//! - **Triangle**: symmetrical, ascending and descending
//! - **Flag**: pole plus tight counter-trend consolidation
//! - **Double top / bottom**
//! - **Head and shoulders**, regular and inverse
//! - **Divergence**: price vs any oscillator line
//! - **Volume anomaly**: spikes and dips against a rolling mean
//! - **Candlestick**: doji, hammer, shooting star

pub mod helpers;

/// Generate `with_defaults()` -> `Self::default()` for multiple detector types.
macro_rules! impl_with_defaults {
    ($($detector:ty),* $(,)?) => {
        $(impl $detector {
            pub fn with_defaults() -> Self { Self::default() }
        })*
    };
}

pub mod candlestick;
pub mod divergence;
pub mod double;
pub mod flag;
pub mod head_shoulders;
pub mod levels;
pub mod triangle;
pub mod volume;

pub use candlestick::*;
pub use divergence::*;
pub use double::*;
pub use flag::*;
pub use head_shoulders::*;
pub use levels::*;
pub use triangle::*;
pub use volume::*;
