use std::collections::BTreeMap;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::ForecastError;
use crate::series::{EnergyDataPoint, ProductionType, TimeSeries, TotalLoadForecast, WindSolarForecast};

/// Raw grid data behind the renewable-percentage forecast.
pub trait ForecastSource: Send + Sync {
    /// Forecast total load over `[start, end]`.
    fn total_load(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<TotalLoadForecast, ForecastError>;

    /// Forecast wind and solar generation over `[start, end]`.
    fn wind_solar(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<WindSolarForecast, ForecastError>;

    /// Whether the source compresses its data into a short window starting
    /// at the requested start, in which case windowing must not be applied.
    fn compresses_timeframe(&self) -> bool {
        false
    }
}

/// On-disk layout of a recorded forecast.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ForecastFixture {
    pub total_load: Vec<EnergyDataPoint>,
    #[serde(default)]
    pub generation: BTreeMap<ProductionType, Vec<EnergyDataPoint>>,
}

/// Serves a recorded forecast verbatim, regardless of the requested range.
#[derive(Debug, Clone)]
pub struct StaticForecastSource {
    fixture: ForecastFixture,
}

impl StaticForecastSource {
    pub fn new(fixture: ForecastFixture) -> Self {
        Self { fixture }
    }

    pub fn from_path(path: &Path) -> Result<Self, ForecastError> {
        let json = std::fs::read_to_string(path)?;
        let fixture: ForecastFixture = serde_json::from_str(&json)?;
        info!(
            path = %path.display(),
            load_points = fixture.total_load.len(),
            "loaded static forecast fixture"
        );
        Ok(Self::new(fixture))
    }
}

impl ForecastSource for StaticForecastSource {
    fn total_load(&self, _start: DateTime<Utc>, _end: DateTime<Utc>) -> Result<TotalLoadForecast, ForecastError> {
        Ok(TotalLoadForecast {
            total_load: TimeSeries::new(self.fixture.total_load.clone()),
        })
    }

    fn wind_solar(&self, _start: DateTime<Utc>, _end: DateTime<Utc>) -> Result<WindSolarForecast, ForecastError> {
        Ok(WindSolarForecast {
            generation: self
                .fixture
                .generation
                .iter()
                .map(|(kind, points)| (*kind, TimeSeries::new(points.clone())))
                .collect(),
        })
    }
}
