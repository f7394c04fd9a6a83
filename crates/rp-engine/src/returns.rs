//! Price panel to simple returns, plus the summary statistics every strategy
//! run reports.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use tracing::debug;

use rp_types::stats::{mean, sample_covariance, sample_variance};
use rp_types::{CovarianceMatrix, DataError, Observation, PricePanel, ReturnsPanel, SummaryStats, WeightVector};

/// Stateless returns and statistics calculator.
pub struct ReturnsEngine;

impl ReturnsEngine {
    /// `r[t] = p[t] / p[t-1] - 1` per asset; the first date of each asset has
    /// no return.
    ///
    /// A zero price followed by another zero is a 0 return. A zero followed
    /// by a positive price is rejected.
    pub fn returns_from_prices(prices: &PricePanel) -> Result<ReturnsPanel, DataError> {
        if prices.is_empty() {
            return Err(DataError::EmptyPanel);
        }

        let mut series = Vec::with_capacity(prices.len());
        for (asset, points) in prices.iter() {
            if points.len() < 2 {
                return Err(DataError::InsufficientData {
                    asset: asset.to_string(),
                    observations: points.len(),
                    required: 2,
                });
            }

            let returns = points
                .windows(2)
                .map(|pair| simple_return(asset, &pair[0], &pair[1]))
                .collect::<Result<Vec<_>, _>>()?;
            series.push((asset.to_string(), returns));
        }

        let panel = ReturnsPanel::from_series(series)?;
        debug!(assets = panel.len(), "Computed simple returns");
        Ok(panel)
    }

    /// Per-asset mean and variance over each asset's full history, and the
    /// pairwise covariance matrix.
    pub fn summary_stats(returns: &ReturnsPanel) -> Result<SummaryStats, DataError> {
        if returns.is_empty() {
            return Err(DataError::EmptyPanel);
        }

        let mut means = BTreeMap::new();
        let mut variances = BTreeMap::new();
        for (asset, points) in returns.iter() {
            let values: Vec<f64> = points.iter().map(|p| p.value).collect();
            let m = mean(&values).ok_or_else(|| DataError::InsufficientData {
                asset: asset.to_string(),
                observations: 0,
                required: 1,
            })?;
            means.insert(asset.to_string(), m);
            variances.insert(asset.to_string(), sample_variance(&values));
        }

        let covariance = Self::covariance(returns)?;
        Ok(SummaryStats {
            mean: means,
            variance: variances,
            covariance,
        })
    }

    /// Sample covariance per pair of assets over the dates that pair shares.
    /// A pair with fewer than two shared dates has an undefined cell.
    pub fn covariance(returns: &ReturnsPanel) -> Result<CovarianceMatrix, DataError> {
        if returns.is_empty() {
            return Err(DataError::EmptyPanel);
        }

        let assets: Vec<String> = returns.assets().map(str::to_string).collect();
        let by_date: Vec<BTreeMap<DateTime<Utc>, f64>> = returns
            .iter()
            .map(|(_, points)| points.iter().map(|p| (p.date, p.value)).collect())
            .collect();

        let n = assets.len();
        let mut values = vec![vec![None; n]; n];
        for i in 0..n {
            for j in i..n {
                let (a, b): (Vec<f64>, Vec<f64>) = by_date[i]
                    .iter()
                    .filter_map(|(date, x)| by_date[j].get(date).map(|y| (*x, *y)))
                    .unzip();
                let cell = sample_covariance(&a, &b);
                if cell.is_none() {
                    debug!(a = %assets[i], b = %assets[j], shared = a.len(), "Covariance undefined for pair");
                }
                values[i][j] = cell;
                values[j][i] = cell;
            }
        }

        Ok(CovarianceMatrix { assets, values })
    }

    /// `Σ wᵢ·meanᵢ`. Assets without a weight count as 0.
    pub fn portfolio_return(weights: &WeightVector, means: &BTreeMap<String, f64>) -> f64 {
        means
            .iter()
            .map(|(asset, m)| weights.get(asset) * m)
            .sum()
    }

    /// `√(wᵀΣw)` over the matrix's assets.
    ///
    /// Pairs where either weight is zero are skipped. `None` when a weighted
    /// pair has an undefined covariance.
    pub fn portfolio_volatility(weights: &WeightVector, covariance: &CovarianceMatrix) -> Option<f64> {
        let w: Vec<f64> = covariance.assets.iter().map(|a| weights.get(a)).collect();
        let mut variance = 0.0;
        for (i, row) in covariance.values.iter().enumerate() {
            for (j, cell) in row.iter().enumerate() {
                let wij = w[i] * w[j];
                if wij == 0.0 {
                    continue;
                }
                variance += wij * (*cell)?;
            }
        }
        if !variance.is_finite() {
            return None;
        }
        // rounding can leave a tiny negative variance for a degenerate matrix
        Some(variance.max(0.0).sqrt())
    }
}

fn simple_return(asset: &str, prev: &Observation, cur: &Observation) -> Result<Observation, DataError> {
    let value = if prev.value == 0.0 {
        if cur.value == 0.0 {
            0.0
        } else {
            return Err(DataError::InvalidPrice {
                asset: asset.to_string(),
                date: prev.date.to_rfc3339(),
                price: prev.value,
            });
        }
    } else {
        cur.value / prev.value - 1.0
    };
    Ok(Observation::new(cur.date, value))
}
