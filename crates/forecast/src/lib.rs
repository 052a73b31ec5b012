//! Renewable-energy forecasts for carbon-aware scheduling.
//!
//! - `series`: grid time series and the renewable-percentage forecast
//! - `source`: raw data sources (`ForecastSource`) and the static fixture source
//! - `squeezed`: season medians compressed into a short timeframe
//! - `service`: `ForecastProvider` implementations used by the scheduler
//! - `window`: quarter-hour windowing helpers

pub mod error;
pub mod series;
pub mod service;
pub mod source;
pub mod squeezed;
pub mod window;

use std::sync::Arc;

use tracing::info;

use greenbatch_core::config::{ForecastConfig, SchedulingConfig};
use greenbatch_core::TimeSource;

pub use error::ForecastError;
pub use series::*;
pub use service::{FixedForecastProvider, ForecastProvider, ForecastService};
pub use source::{ForecastFixture, ForecastSource, StaticForecastSource};
pub use squeezed::{SeasonAverages, SqueezedForecastSource};

/// Build the configured forecast provider.
///
/// `squeezed` compresses the season table into one default file deadline.
/// `static` replays the fixture at `FORECAST_FIXTURE_PATH`.
pub fn provider_from_config(
    forecast: &ForecastConfig,
    scheduling: &SchedulingConfig,
    clock: Arc<dyn TimeSource>,
) -> Result<Arc<dyn ForecastProvider>, ForecastError> {
    let source: Arc<dyn ForecastSource> = match forecast.source.as_str() {
        "squeezed" => {
            let averages = match &forecast.season_averages_path {
                Some(path) => SeasonAverages::from_path(path)?,
                None => SeasonAverages::bundled()?,
            };
            let timeframe = scheduling.default_file_deadline();
            Arc::new(SqueezedForecastSource::new(averages, timeframe))
        }
        "static" => {
            let path = forecast
                .fixture_path
                .as_deref()
                .ok_or_else(|| ForecastError::NotConfigured("FORECAST_FIXTURE_PATH not set".into()))?;
            Arc::new(StaticForecastSource::from_path(path)?)
        }
        other => return Err(ForecastError::UnknownSource(other.to_string())),
    };
    info!(source = %forecast.source, "forecast provider ready");
    Ok(Arc::new(ForecastService::new(source, clock)))
}
