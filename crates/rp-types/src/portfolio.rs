use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::market::Observation;

/// Asset weights in insertion order.
///
/// Order matters: concentration checks report the first offender they meet.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct WeightVector {
    entries: Vec<(String, f64)>,
}

impl WeightVector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the weight for `asset`, replacing an existing entry in place.
    pub fn insert(&mut self, asset: impl Into<String>, weight: f64) {
        let asset = asset.into();
        match self.entries.iter_mut().find(|(a, _)| *a == asset) {
            Some(entry) => entry.1 = weight,
            None => self.entries.push((asset, weight)),
        }
    }

    /// Weight for `asset`, or 0 if it is not part of the vector.
    pub fn get(&self, asset: &str) -> f64 {
        self.entries
            .iter()
            .find(|(a, _)| a == asset)
            .map(|(_, w)| *w)
            .unwrap_or(0.0)
    }

    pub fn contains(&self, asset: &str) -> bool {
        self.entries.iter().any(|(a, _)| a == asset)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.entries.iter().map(|(a, w)| (a.as_str(), *w))
    }

    pub fn assets(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(a, _)| a.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn sum(&self) -> f64 {
        self.entries.iter().map(|(_, w)| w).sum()
    }

    /// Largest single weight with its asset (first one wins on ties).
    pub fn max_weight(&self) -> Option<(&str, f64)> {
        self.iter().fold(None, |best, (asset, w)| match best {
            Some((_, bw)) if bw >= w => best,
            _ => Some((asset, w)),
        })
    }
}

impl<S: Into<String>> FromIterator<(S, f64)> for WeightVector {
    fn from_iter<I: IntoIterator<Item = (S, f64)>>(iter: I) -> Self {
        let mut weights = WeightVector::new();
        for (asset, w) in iter {
            weights.insert(asset, w);
        }
        weights
    }
}

/// Portfolio return per date, one entry per date common to every
/// contributing asset.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PortfolioReturnSeries {
    pub points: Vec<Observation>,
}

impl PortfolioReturnSeries {
    pub fn new(points: Vec<Observation>) -> Self {
        Self { points }
    }

    pub fn values(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.value).collect()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Compounded value path: `v[0] = 1 + r[0]`, `v[t] = v[t-1] * (1 + r[t])`.
    pub fn cumulative(&self) -> CumulativeSeries {
        let mut value = 1.0;
        let points = self
            .points
            .iter()
            .map(|p| {
                value *= 1.0 + p.value;
                Observation::new(p.date, value)
            })
            .collect();
        CumulativeSeries { points }
    }
}

/// Compounded portfolio value, starting from 1.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CumulativeSeries {
    pub points: Vec<Observation>,
}

impl CumulativeSeries {
    pub fn values(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.value).collect()
    }

    pub fn last(&self) -> Option<f64> {
        self.points.last().map(|p| p.value)
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

/// Pairwise sample covariance matrix (ddof = 1), rows and columns in
/// `assets` order. Each cell uses only the dates its two assets share; a cell
/// with fewer than two shared dates is `None`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CovarianceMatrix {
    pub assets: Vec<String>,
    pub values: Vec<Vec<Option<f64>>>,
}

impl CovarianceMatrix {
    pub fn get(&self, a: &str, b: &str) -> Option<f64> {
        let i = self.assets.iter().position(|x| x == a)?;
        let j = self.assets.iter().position(|x| x == b)?;
        self.values.get(i)?.get(j).copied().flatten()
    }
}

/// Per-asset return statistics over the full window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryStats {
    pub mean: BTreeMap<String, f64>,
    /// `None` when an asset has a single return (ddof = 1 is undefined).
    pub variance: BTreeMap<String, Option<f64>>,
    pub covariance: CovarianceMatrix,
}

/// Per-asset row of a stored portfolio run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetRunStats {
    pub asset: String,
    pub weight: f64,
    pub mean_return: f64,
    pub variance: Option<f64>,
}

/// One allocation strategy run, as persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioRunRecord {
    pub name: String,
    pub date_run: DateTime<Utc>,
    pub total_return: f64,
    /// `None` when a weighted pair of assets has no defined covariance.
    pub volatility: Option<f64>,
    pub assets: Vec<AssetRunStats>,
}
