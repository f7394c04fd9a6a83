//! Price shocks and scenario analysis.
//!
//! A stress run applies a [`ShockMap`] to every price on or after the shock
//! date, then re-aggregates both the unshocked and the shocked panels with the
//! same pre-shock weights.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use rp_types::stats::{mean, sample_std};
use rp_types::{AllocationError, DataError, Observation, PortfolioReturnSeries, PricePanel, ReturnsPanel, RpResult, WeightVector};

use crate::aggregator::PortfolioAggregator;
use crate::allocation::AllocationEngine;
use crate::returns::ReturnsEngine;

/// Asset → multiplicative shock, e.g. `-0.20` for a 20 % drop.
pub type ShockMap = BTreeMap<String, f64>;

/// Distribution summary of one portfolio return series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesSummary {
    pub observations: usize,
    pub mean: Option<f64>,
    pub volatility: Option<f64>,
    /// `Π(1+r) − 1`.
    pub total_return: f64,
    pub worst_day: Option<f64>,
}

impl SeriesSummary {
    pub fn of(series: &PortfolioReturnSeries) -> Self {
        let values = series.values();
        let total_return = values.iter().fold(1.0, |acc, r| acc * (1.0 + r)) - 1.0;
        Self {
            observations: values.len(),
            mean: mean(&values),
            volatility: sample_std(&values),
            total_return,
            worst_day: values.iter().copied().reduce(f64::min),
        }
    }
}

/// Baseline and shocked portfolios under the same weights.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StressReport {
    pub shock_date: DateTime<Utc>,
    pub shocks: ShockMap,
    pub weights: WeightVector,
    pub baseline: PortfolioReturnSeries,
    pub stressed: PortfolioReturnSeries,
    pub baseline_summary: SeriesSummary,
    pub stressed_summary: SeriesSummary,
}

impl StressReport {
    /// Stressed minus baseline total return.
    pub fn total_return_impact(&self) -> f64 {
        self.stressed_summary.total_return - self.baseline_summary.total_return
    }
}

/// Portfolio behaviour on a synthetic returns scenario.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioOutcome {
    pub name: String,
    pub weights: WeightVector,
    pub returns: PortfolioReturnSeries,
    pub mean_return: Option<f64>,
}

/// Stateless stress-test runner.
pub struct StressSimulator;

impl StressSimulator {
    /// `price × (1 + shock)` for every date `>= shock_date` of every asset in
    /// `shocks`. Assets in the map but not in the panel are ignored.
    ///
    /// A shock below −100 % produces a negative price and is rejected.
    pub fn apply_shock(prices: &PricePanel, shock_date: DateTime<Utc>, shocks: &ShockMap) -> Result<PricePanel, DataError> {
        prices.map_prices(|asset, point| match shocks.get(asset) {
            Some(shock) if point.date >= shock_date => point.value * (1.0 + shock),
            _ => point.value,
        })
    }

    /// Baseline vs shocked portfolio series under `weights`.
    pub fn run(
        prices: &PricePanel,
        weights: &WeightVector,
        shock_date: DateTime<Utc>,
        shocks: &ShockMap,
    ) -> RpResult<StressReport> {
        let shocked = Self::apply_shock(prices, shock_date, shocks)?;

        let baseline = PortfolioAggregator::aggregate(&ReturnsEngine::returns_from_prices(prices)?, weights);
        let stressed = PortfolioAggregator::aggregate(&ReturnsEngine::returns_from_prices(&shocked)?, weights);

        let report = StressReport {
            shock_date,
            shocks: shocks.clone(),
            weights: weights.clone(),
            baseline_summary: SeriesSummary::of(&baseline),
            stressed_summary: SeriesSummary::of(&stressed),
            baseline,
            stressed,
        };
        info!(
            shock_date = %shock_date,
            assets = shocks.len(),
            baseline_total = report.baseline_summary.total_return,
            stressed_total = report.stressed_summary.total_return,
            "Stress test complete"
        );
        Ok(report)
    }

    /// The middle date of the panel's distinct dates.
    pub fn midpoint_date(prices: &PricePanel) -> Option<DateTime<Utc>> {
        let dates = prices.dates();
        dates.get(dates.len() / 2).copied()
    }

    /// The same shock for every asset.
    pub fn uniform_shock<'a, I>(assets: I, shock: f64) -> ShockMap
    where
        I: IntoIterator<Item = &'a str>,
    {
        assets.into_iter().map(|a| (a.to_string(), shock)).collect()
    }

    /// Inverse-volatility weights from the scenario's own returns, and the
    /// resulting portfolio series.
    pub fn simulate_scenario(name: &str, scenario: &ReturnsPanel) -> Result<ScenarioOutcome, AllocationError> {
        let weights = AllocationEngine::inverse_volatility_from_returns(scenario)?;
        let returns = PortfolioAggregator::aggregate(scenario, &weights);
        let mean_return = mean(&returns.values());
        info!(scenario = name, days = returns.len(), mean_return = ?mean_return, "Scenario simulated");
        Ok(ScenarioOutcome {
            name: name.to_string(),
            weights,
            returns,
            mean_return,
        })
    }

    /// Bull, bear and volatile four-day markets for BTC, ETH and ADA.
    pub fn builtin_scenarios() -> Result<Vec<(&'static str, ReturnsPanel)>, DataError> {
        let bull: [(&str, [f64; 4]); 3] = [
            ("BTC", [0.05, 0.04, 0.03, 0.06]),
            ("ETH", [0.04, 0.03, 0.02, 0.05]),
            ("ADA", [0.03, 0.02, 0.01, 0.04]),
        ];
        let bear: [(&str, [f64; 4]); 3] = [
            ("BTC", [-0.05, -0.04, -0.03, -0.06]),
            ("ETH", [-0.04, -0.03, -0.02, -0.05]),
            ("ADA", [-0.03, -0.02, -0.01, -0.04]),
        ];
        let volatile: [(&str, [f64; 4]); 3] = [
            ("BTC", [0.10, -0.10, 0.12, -0.08]),
            ("ETH", [0.08, -0.07, 0.09, -0.06]),
            ("ADA", [0.07, -0.05, 0.06, -0.04]),
        ];

        Ok(vec![
            ("Bull Market", scenario_panel(&bull)?),
            ("Bear Market", scenario_panel(&bear)?),
            ("Volatile Market", scenario_panel(&volatile)?),
        ])
    }
}

fn scenario_panel(data: &[(&str, [f64; 4])]) -> Result<ReturnsPanel, DataError> {
    let start = Utc
        .with_ymd_and_hms(2024, 1, 1, 0, 0, 0)
        .single()
        .ok_or_else(|| DataError::ParseError {
            message: "invalid scenario start date".to_string(),
        })?;
    ReturnsPanel::from_series(data.iter().map(|(asset, values)| {
        let points: Vec<Observation> = values
            .iter()
            .enumerate()
            .map(|(i, v)| Observation::new(start + Duration::days(i as i64), *v))
            .collect();
        (*asset, points)
    }))
}
