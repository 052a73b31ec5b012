use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use greenbatch_core::TimeSource;

use crate::error::ForecastError;
use crate::series::{
    RenewablePercentageForecast, RenewablePercentagePoint, TotalLoadForecast, WindSolarForecast,
};
use crate::source::ForecastSource;
use crate::window::forecast_window;

/// Supplies renewable-percentage forecasts to the scheduler.
pub trait ForecastProvider: Send + Sync {
    fn renewable_percentage_forecast(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<RenewablePercentageForecast, ForecastError>;

    fn total_load_forecast(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<TotalLoadForecast, ForecastError>;

    fn wind_solar_forecast(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<WindSolarForecast, ForecastError>;

    /// Forecast from the next quarter hour after `start` until the last
    /// published data point.
    fn renewable_percentage_until_last_available(
        &self,
        start: DateTime<Utc>,
    ) -> Result<RenewablePercentageForecast, ForecastError> {
        let (from, to) = forecast_window(start, start);
        self.renewable_percentage_forecast(from, to)
    }
}

/// Derives renewable percentages from a [`ForecastSource`].
pub struct ForecastService {
    source: Arc<dyn ForecastSource>,
    clock: Arc<dyn TimeSource>,
}

impl ForecastService {
    pub fn new(source: Arc<dyn ForecastSource>, clock: Arc<dyn TimeSource>) -> Self {
        Self { source, clock }
    }
}

impl ForecastProvider for ForecastService {
    fn renewable_percentage_forecast(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<RenewablePercentageForecast, ForecastError> {
        let start = if self.source.compresses_timeframe() {
            let now = self.clock.now();
            warn!(start = %now, "squeezed source, forecasting from now");
            now
        } else {
            start
        };

        let load = self.source.total_load(start, end)?.total_load;
        let renewables = self.source.wind_solar(start, end)?.sum_renewables();

        let mut points = Vec::with_capacity(renewables.len());
        for (timestamp, generated) in renewables {
            match load.value_at(timestamp) {
                Some(total) if total > 0.0 => points.push(RenewablePercentagePoint {
                    timestamp,
                    percentage: generated / total * 100.0,
                }),
                _ => debug!(at = %timestamp, "no load forecast for timestamp, skipping"),
            }
        }
        Ok(RenewablePercentageForecast::new(points))
    }

    fn total_load_forecast(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<TotalLoadForecast, ForecastError> {
        let forecast = self.source.total_load(start, end)?;
        if self.source.compresses_timeframe() {
            return Ok(forecast);
        }
        Ok(TotalLoadForecast {
            total_load: forecast.total_load.filter_points(start, end),
        })
    }

    fn wind_solar_forecast(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<WindSolarForecast, ForecastError> {
        let forecast = self.source.wind_solar(start, end)?;
        if self.source.compresses_timeframe() {
            return Ok(forecast);
        }
        Ok(forecast.filter_points(start, end))
    }

    fn renewable_percentage_until_last_available(
        &self,
        start: DateTime<Utc>,
    ) -> Result<RenewablePercentageForecast, ForecastError> {
        let (from, to) = forecast_window(start, self.clock.now());
        info!(from = %from, to = %to, "renewable percentage forecast until last available");

        let forecast = self.renewable_percentage_forecast(from, to)?;
        if self.source.compresses_timeframe() {
            return Ok(forecast);
        }
        Ok(forecast.filter_points(from, to))
    }
}

/// Returns a preset forecast regardless of the requested range.
#[derive(Default)]
pub struct FixedForecastProvider {
    forecast: RwLock<RenewablePercentageForecast>,
}

impl FixedForecastProvider {
    pub fn new(forecast: RenewablePercentageForecast) -> Self {
        Self { forecast: RwLock::new(forecast) }
    }

    pub fn set(&self, forecast: RenewablePercentageForecast) -> Result<(), ForecastError> {
        *self
            .forecast
            .write()
            .map_err(|e| ForecastError::LockPoisoned(format!("fixed forecast write lock: {}", e)))? = forecast;
        Ok(())
    }
}

impl ForecastProvider for FixedForecastProvider {
    fn renewable_percentage_forecast(
        &self,
        _start: DateTime<Utc>,
        _end: DateTime<Utc>,
    ) -> Result<RenewablePercentageForecast, ForecastError> {
        self.forecast
            .read()
            .map(|f| f.clone())
            .map_err(|e| ForecastError::LockPoisoned(format!("fixed forecast read lock: {}", e)))
    }

    fn total_load_forecast(&self, _start: DateTime<Utc>, _end: DateTime<Utc>) -> Result<TotalLoadForecast, ForecastError> {
        Ok(TotalLoadForecast::default())
    }

    fn wind_solar_forecast(&self, _start: DateTime<Utc>, _end: DateTime<Utc>) -> Result<WindSolarForecast, ForecastError> {
        Ok(WindSolarForecast::default())
    }
}
