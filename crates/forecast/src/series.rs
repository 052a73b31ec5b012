use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One value of a grid series (MW) at a point in time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EnergyDataPoint {
    pub timestamp: DateTime<Utc>,
    pub value: f64,
}

impl EnergyDataPoint {
    pub fn new(timestamp: DateTime<Utc>, value: f64) -> Self {
        Self { timestamp, value }
    }
}

/// Renewable production types that contribute to the forecast.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProductionType {
    Solar,
    WindOffshore,
    WindOnshore,
}

impl ProductionType {
    pub const ALL: [ProductionType; 3] = [
        ProductionType::Solar,
        ProductionType::WindOffshore,
        ProductionType::WindOnshore,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ProductionType::Solar => "solar",
            ProductionType::WindOffshore => "wind_offshore",
            ProductionType::WindOnshore => "wind_onshore",
        }
    }

    /// ENTSO-E PSR type code.
    pub fn psr_code(self) -> &'static str {
        match self {
            ProductionType::Solar => "B16",
            ProductionType::WindOffshore => "B18",
            ProductionType::WindOnshore => "B19",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TimeSeries {
    pub points: Vec<EnergyDataPoint>,
}

impl TimeSeries {
    pub fn new(points: Vec<EnergyDataPoint>) -> Self {
        Self { points }
    }

    /// Points with `start <= t <= end`.
    pub fn filter_points(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self {
            points: self
                .points
                .iter()
                .filter(|p| start <= p.timestamp && p.timestamp <= end)
                .copied()
                .collect(),
        }
    }

    /// Value at exactly `t`, if the series has a point there.
    pub fn value_at(&self, t: DateTime<Utc>) -> Option<f64> {
        self.points.iter().find(|p| p.timestamp == t).map(|p| p.value)
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TotalLoadForecast {
    pub total_load: TimeSeries,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WindSolarForecast {
    pub generation: BTreeMap<ProductionType, TimeSeries>,
}

impl WindSolarForecast {
    /// Total renewable generation per timestamp across all production types.
    pub fn sum_renewables(&self) -> BTreeMap<DateTime<Utc>, f64> {
        let mut sums = BTreeMap::new();
        for series in self.generation.values() {
            for p in &series.points {
                *sums.entry(p.timestamp).or_insert(0.0) += p.value;
            }
        }
        sums
    }

    pub fn filter_points(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self {
            generation: self
                .generation
                .iter()
                .map(|(kind, series)| (*kind, series.filter_points(start, end)))
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RenewablePercentagePoint {
    pub timestamp: DateTime<Utc>,
    /// Share of the forecast load covered by renewables, in percent.
    pub percentage: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RenewablePercentageForecast {
    pub points: Vec<RenewablePercentagePoint>,
}

impl RenewablePercentageForecast {
    pub fn new(points: Vec<RenewablePercentagePoint>) -> Self {
        Self { points }
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn filter_points(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self {
            points: self
                .points
                .iter()
                .filter(|p| start <= p.timestamp && p.timestamp <= end)
                .copied()
                .collect(),
        }
    }

    /// The point with the highest percentage, optionally ignoring points
    /// after `clamp_end`. Equal percentages resolve to the earliest point.
    pub fn highest(&self, clamp_end: Option<DateTime<Utc>>) -> Option<RenewablePercentagePoint> {
        let mut best: Option<RenewablePercentagePoint> = None;
        for p in self.points.iter().filter(|p| clamp_end.map_or(true, |end| p.timestamp <= end)) {
            best = match best {
                Some(b) if b.percentage > p.percentage => Some(b),
                Some(b) if b.percentage == p.percentage && b.timestamp <= p.timestamp => Some(b),
                _ => Some(*p),
            };
        }
        best
    }
}
