use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::errors::DataError;

/// A single dated value: a closing price, a return, or a series point.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub date: DateTime<Utc>,
    pub value: f64,
}

impl Observation {
    pub fn new(date: DateTime<Utc>, value: f64) -> Self {
        Self { date, value }
    }
}

/// One row of tabular price input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceRow {
    pub asset: String,
    pub date: DateTime<Utc>,
    pub close: f64,
}

/// Closing prices keyed by asset, each series strictly increasing in date.
///
/// Built once from input and never mutated afterwards; transformations such
/// as [`PricePanel::map_prices`] produce a new panel.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PricePanel {
    series: BTreeMap<String, Vec<Observation>>,
}

impl PricePanel {
    /// Build a panel from unordered rows. Rows are grouped by asset and sorted
    /// by date; duplicate (asset, date) pairs are rejected.
    pub fn from_rows<I>(rows: I) -> Result<Self, DataError>
    where
        I: IntoIterator<Item = PriceRow>,
    {
        let mut grouped: BTreeMap<String, Vec<Observation>> = BTreeMap::new();
        for row in rows {
            grouped
                .entry(row.asset)
                .or_default()
                .push(Observation::new(row.date, row.close));
        }
        Self::from_series(grouped)
    }

    /// Build a panel from per-asset series. Each series is sorted by date.
    pub fn from_series<I, S>(series: I) -> Result<Self, DataError>
    where
        I: IntoIterator<Item = (S, Vec<Observation>)>,
        S: Into<String>,
    {
        let mut panel = BTreeMap::new();
        for (asset, mut points) in series {
            let asset = asset.into();
            points.sort_by_key(|p| p.date);
            validate_series(&asset, &points)?;
            for point in &points {
                validate_price(&asset, point)?;
            }
            if panel.insert(asset.clone(), points).is_some() {
                return Err(DataError::DuplicateObservation {
                    asset,
                    date: "<entire series>".to_string(),
                });
            }
        }
        Ok(Self { series: panel })
    }

    /// Produce a new panel with every price replaced by `f(asset, observation)`.
    pub fn map_prices<F>(&self, mut f: F) -> Result<Self, DataError>
    where
        F: FnMut(&str, &Observation) -> f64,
    {
        let mut series = BTreeMap::new();
        for (asset, points) in &self.series {
            let mapped = points
                .iter()
                .map(|p| {
                    let shifted = Observation::new(p.date, f(asset, p));
                    validate_price(asset, &shifted).map(|_| shifted)
                })
                .collect::<Result<Vec<_>, _>>()?;
            series.insert(asset.clone(), mapped);
        }
        Ok(Self { series })
    }

    /// Asset symbols in sorted order.
    pub fn assets(&self) -> impl Iterator<Item = &str> {
        self.series.keys().map(String::as_str)
    }

    pub fn series(&self, asset: &str) -> Option<&[Observation]> {
        self.series.get(asset).map(Vec::as_slice)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[Observation])> {
        self.series.iter().map(|(a, s)| (a.as_str(), s.as_slice()))
    }

    /// Number of assets.
    pub fn len(&self) -> usize {
        self.series.len()
    }

    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }

    /// Total number of (asset, date) observations.
    pub fn observation_count(&self) -> usize {
        self.series.values().map(Vec::len).sum()
    }

    /// Every distinct date across all assets, ascending.
    pub fn dates(&self) -> Vec<DateTime<Utc>> {
        let all: BTreeSet<DateTime<Utc>> = self
            .series
            .values()
            .flat_map(|s| s.iter().map(|p| p.date))
            .collect();
        all.into_iter().collect()
    }
}

/// Simple returns keyed by asset. One row shorter than the prices they were
/// derived from.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ReturnsPanel {
    series: BTreeMap<String, Vec<Observation>>,
}

impl ReturnsPanel {
    pub fn from_series<I, S>(series: I) -> Result<Self, DataError>
    where
        I: IntoIterator<Item = (S, Vec<Observation>)>,
        S: Into<String>,
    {
        let mut panel = BTreeMap::new();
        for (asset, mut points) in series {
            let asset = asset.into();
            points.sort_by_key(|p| p.date);
            validate_series(&asset, &points)?;
            if panel.insert(asset.clone(), points).is_some() {
                return Err(DataError::DuplicateObservation {
                    asset,
                    date: "<entire series>".to_string(),
                });
            }
        }
        Ok(Self { series: panel })
    }

    pub fn assets(&self) -> impl Iterator<Item = &str> {
        self.series.keys().map(String::as_str)
    }

    pub fn series(&self, asset: &str) -> Option<&[Observation]> {
        self.series.get(asset).map(Vec::as_slice)
    }

    /// Bare return values for one asset, in date order.
    pub fn values(&self, asset: &str) -> Option<Vec<f64>> {
        self.series(asset)
            .map(|points| points.iter().map(|p| p.value).collect())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[Observation])> {
        self.series.iter().map(|(a, s)| (a.as_str(), s.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.series.len()
    }

    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }

    /// Dates present for every one of `assets`. Assets absent from the panel
    /// make the intersection empty.
    pub fn common_dates<'a, I>(&self, assets: I) -> Vec<DateTime<Utc>>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut common: Option<BTreeSet<DateTime<Utc>>> = None;
        for asset in assets {
            let dates: BTreeSet<DateTime<Utc>> = match self.series.get(asset) {
                Some(points) => points.iter().map(|p| p.date).collect(),
                None => return Vec::new(),
            };
            common = Some(match common {
                Some(acc) => acc.intersection(&dates).copied().collect(),
                None => dates,
            });
        }
        common.map(|c| c.into_iter().collect()).unwrap_or_default()
    }
}

fn validate_series(asset: &str, points: &[Observation]) -> Result<(), DataError> {
    for pair in points.windows(2) {
        if pair[0].date == pair[1].date {
            return Err(DataError::DuplicateObservation {
                asset: asset.to_string(),
                date: pair[1].date.to_rfc3339(),
            });
        }
    }
    Ok(())
}

fn validate_price(asset: &str, point: &Observation) -> Result<(), DataError> {
    if !point.value.is_finite() || point.value < 0.0 {
        return Err(DataError::InvalidPrice {
            asset: asset.to_string(),
            date: point.date.to_rfc3339(),
            price: point.value,
        });
    }
    Ok(())
}
