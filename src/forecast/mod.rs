//! Feature-series forecasting
//!
//! - [`arima`]: ARIMA(p, d, q) fit by conditional sum of squares, forecasts
//!   with ψ-weight prediction intervals
//! - [`order_search`]: exhaustive parallel AIC grid search over orders
//! - [`forecaster`]: resample → order search → training-prefix fit →
//!   timestamped horizon

pub mod arima;
pub mod forecaster;
mod linalg;
mod optimizer;
pub mod order_search;

pub use arima::{ArimaOrder, FitError, FittedArima, IntervalForecast};
pub use forecaster::{horizon_timestamps, ForecastAnchor, ForecastError, ForecastSettings, Forecaster};
pub use optimizer::{Minimum, NelderMead};
pub use order_search::{select_order, CandidateScore, OrderGrid, OrderSearch, OrderSearchError, OrderSelector};
