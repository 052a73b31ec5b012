use std::collections::BTreeMap;
use std::path::Path;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use greenbatch_core::time::{duration_as_secs_f64, duration_from_secs_f64};

use crate::error::ForecastError;
use crate::series::{EnergyDataPoint, ProductionType, TimeSeries, TotalLoadForecast, WindSolarForecast};
use crate::source::ForecastSource;

const BUNDLED_SEASON_AVERAGES: &str = include_str!("../data/season_averages.json");

/// Median grid values over one day of a season, in time-of-day order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeasonAverages {
    pub solar: Vec<f64>,
    pub wind_offshore: Vec<f64>,
    pub wind_onshore: Vec<f64>,
    pub total_load: Vec<f64>,
}

impl SeasonAverages {
    pub fn from_path(path: &Path) -> Result<Self, ForecastError> {
        let json = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&json)?)
    }

    /// Table shipped with the crate.
    pub fn bundled() -> Result<Self, ForecastError> {
        Ok(serde_json::from_str(BUNDLED_SEASON_AVERAGES)?)
    }

    fn generation(&self, kind: ProductionType) -> &[f64] {
        match kind {
            ProductionType::Solar => &self.solar,
            ProductionType::WindOffshore => &self.wind_offshore,
            ProductionType::WindOnshore => &self.wind_onshore,
        }
    }
}

/// Replays a season's daily medians compressed into `timeframe`, so a whole
/// day of renewable variation fits into one file deadline. Used for
/// experiments and local runs.
#[derive(Debug, Clone)]
pub struct SqueezedForecastSource {
    averages: SeasonAverages,
    timeframe: Duration,
}

impl SqueezedForecastSource {
    pub fn new(averages: SeasonAverages, timeframe: Duration) -> Self {
        info!(timeframe_secs = timeframe.num_seconds(), "squeezed forecast source");
        Self { averages, timeframe }
    }

    /// Spread `medians` evenly over `[start, start + timeframe)`.
    fn squeeze(&self, name: &str, medians: &[f64], start: DateTime<Utc>) -> Result<TimeSeries, ForecastError> {
        if medians.is_empty() {
            return Err(ForecastError::EmptySeasonTable(name.to_string()));
        }
        let step = duration_from_secs_f64(duration_as_secs_f64(self.timeframe) / medians.len() as f64);
        warn!(
            table = name,
            from = %start,
            to = %(start + self.timeframe),
            "returning squeezed season data"
        );
        Ok(TimeSeries::new(
            medians
                .iter()
                .enumerate()
                .map(|(i, v)| EnergyDataPoint::new(start + step * i as i32, *v))
                .collect(),
        ))
    }
}

impl ForecastSource for SqueezedForecastSource {
    fn total_load(&self, start: DateTime<Utc>, _end: DateTime<Utc>) -> Result<TotalLoadForecast, ForecastError> {
        Ok(TotalLoadForecast {
            total_load: self.squeeze("total_load", &self.averages.total_load, start)?,
        })
    }

    fn wind_solar(&self, start: DateTime<Utc>, _end: DateTime<Utc>) -> Result<WindSolarForecast, ForecastError> {
        let mut generation = BTreeMap::new();
        for kind in ProductionType::ALL {
            generation.insert(kind, self.squeeze(kind.as_str(), self.averages.generation(kind), start)?);
        }
        Ok(WindSolarForecast { generation })
    }

    fn compresses_timeframe(&self) -> bool {
        true
    }
}
