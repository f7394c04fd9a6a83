//! Weighting strategies.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::debug;

use rp_types::stats::sample_std;
use rp_types::{AllocationError, ReturnsPanel, WeightVector};

/// Trailing observation window for inverse-volatility weighting.
pub const DEFAULT_RISK_PARITY_WINDOW: usize = 90;

/// Priority used by the rule-based strategy for symbols without an entry.
const DEFAULT_PRIORITY: f64 = 1.0;

const PRIORITY_TABLE: &[(&str, f64)] = &[
    ("BTC", 3.0),
    ("USDT", 3.0),
    ("ETH", 2.0),
    ("AAVE", 1.0),
    ("UNI", 1.0),
    ("DOGE", 0.5),
];

/// Strategy selected by key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AllocationStrategy {
    EqualWeight,
    RuleBased,
    RiskParity { window: usize },
    /// Equal weights under the `performance` key.
    Performance,
}

impl AllocationStrategy {
    pub fn name(&self) -> &'static str {
        match self {
            AllocationStrategy::EqualWeight => "equal",
            AllocationStrategy::RuleBased => "rule",
            AllocationStrategy::RiskParity { .. } => "risk_parity",
            AllocationStrategy::Performance => "performance",
        }
    }

    /// Weights for `assets`, in the given order.
    pub fn allocate(&self, assets: &[String], returns: &ReturnsPanel) -> Result<WeightVector, AllocationError> {
        let weights = match self {
            AllocationStrategy::EqualWeight | AllocationStrategy::Performance => {
                AllocationEngine::equal_weights(assets)?
            }
            AllocationStrategy::RuleBased => AllocationEngine::rule_based_weights(assets)?,
            AllocationStrategy::RiskParity { window } => {
                AllocationEngine::inverse_volatility_weights(assets, returns, *window)?
            }
        };
        debug!(strategy = self.name(), assets = weights.len(), "Allocated weights");
        Ok(weights)
    }
}

impl FromStr for AllocationStrategy {
    type Err = AllocationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "equal" | "equal_weight" => Ok(AllocationStrategy::EqualWeight),
            "rule" | "rule_based" => Ok(AllocationStrategy::RuleBased),
            "risk_parity" | "inverse_volatility" => Ok(AllocationStrategy::RiskParity {
                window: DEFAULT_RISK_PARITY_WINDOW,
            }),
            "performance" => Ok(AllocationStrategy::Performance),
            _ => Err(AllocationError::UnknownStrategy { name: s.to_string() }),
        }
    }
}

impl fmt::Display for AllocationStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Stateless weight calculators.
pub struct AllocationEngine;

impl AllocationEngine {
    /// `1/n` per asset.
    pub fn equal_weights(assets: &[String]) -> Result<WeightVector, AllocationError> {
        if assets.is_empty() {
            return Err(AllocationError::EmptyAssetSet);
        }
        let w = 1.0 / assets.len() as f64;
        Ok(assets.iter().map(|a| (a.as_str(), w)).collect())
    }

    /// Weight proportional to the symbol's priority, normalized.
    pub fn rule_based_weights(assets: &[String]) -> Result<WeightVector, AllocationError> {
        if assets.is_empty() {
            return Err(AllocationError::EmptyAssetSet);
        }
        let priorities: Vec<f64> = assets.iter().map(|a| priority(a)).collect();
        let total: f64 = priorities.iter().sum();
        Ok(assets
            .iter()
            .zip(priorities)
            .map(|(a, p)| (a.as_str(), p / total))
            .collect())
    }

    /// Weight proportional to `1 / vol`, where vol is the sample standard
    /// deviation over the trailing `window` returns.
    ///
    /// Assets with zero or undefined volatility get weight 0. If no asset has
    /// a positive volatility the result is equal weights.
    pub fn inverse_volatility_weights(
        assets: &[String],
        returns: &ReturnsPanel,
        window: usize,
    ) -> Result<WeightVector, AllocationError> {
        if assets.is_empty() {
            return Err(AllocationError::EmptyAssetSet);
        }

        let inverse: Vec<f64> = assets
            .iter()
            .map(|asset| {
                let vol = trailing_volatility(returns, asset, window);
                if vol > 0.0 {
                    1.0 / vol
                } else {
                    0.0
                }
            })
            .collect();
        let total: f64 = inverse.iter().sum();

        if total == 0.0 || !total.is_finite() {
            debug!("No asset has a positive volatility; falling back to equal weights");
            return Self::equal_weights(assets);
        }

        Ok(assets
            .iter()
            .zip(inverse)
            .map(|(a, inv)| (a.as_str(), inv / total))
            .collect())
    }

    /// Inverse-volatility weights over every asset and the full history of
    /// `returns`.
    pub fn inverse_volatility_from_returns(returns: &ReturnsPanel) -> Result<WeightVector, AllocationError> {
        let assets: Vec<String> = returns.assets().map(str::to_string).collect();
        Self::inverse_volatility_weights(&assets, returns, usize::MAX)
    }
}

/// Rule-based priority for a symbol, matched case-insensitively.
pub fn priority(symbol: &str) -> f64 {
    PRIORITY_TABLE
        .iter()
        .find(|(s, _)| s.eq_ignore_ascii_case(symbol.trim()))
        .map(|(_, p)| *p)
        .unwrap_or(DEFAULT_PRIORITY)
}

fn trailing_volatility(returns: &ReturnsPanel, asset: &str, window: usize) -> f64 {
    let values = match returns.values(asset) {
        Some(values) => values,
        None => return 0.0,
    };
    let start = values.len().saturating_sub(window);
    sample_std(&values[start..]).unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use rp_types::Observation;

    fn day(n: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + Duration::days(n)
    }

    fn returns(data: &[(&str, &[f64])]) -> ReturnsPanel {
        ReturnsPanel::from_series(data.iter().map(|(a, r)| {
            let points: Vec<Observation> = r
                .iter()
                .enumerate()
                .map(|(i, v)| Observation::new(day(i as i64), *v))
                .collect();
            (*a, points)
        }))
        .unwrap()
    }

    fn names(assets: &[&str]) -> Vec<String> {
        assets.iter().map(|a| a.to_string()).collect()
    }

    #[test]
    fn equal_weights_sum_to_one() {
        let w = AllocationEngine::equal_weights(&names(&["BTC", "ETH", "ADA"])).unwrap();
        assert!((w.sum() - 1.0).abs() < 1e-9);
        for (_, weight) in w.iter() {
            assert!((weight - 1.0 / 3.0).abs() < 1e-12);
        }
        assert_eq!(
            AllocationEngine::equal_weights(&[]),
            Err(AllocationError::EmptyAssetSet)
        );
    }

    #[test]
    fn rule_based_uses_priority_table() {
        let w = AllocationEngine::rule_based_weights(&names(&["btc", "ETH", "DOGE", "XRP"])).unwrap();
        // priorities 3 + 2 + 0.5 + 1 = 6.5
        assert!((w.get("btc") - 3.0 / 6.5).abs() < 1e-12);
        assert!((w.get("ETH") - 2.0 / 6.5).abs() < 1e-12);
        assert!((w.get("DOGE") - 0.5 / 6.5).abs() < 1e-12);
        assert!((w.get("XRP") - 1.0 / 6.5).abs() < 1e-12);
        assert!((w.sum() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn inverse_volatility_favours_calm_assets() {
        let panel = returns(&[
            ("BTC", &[0.01, -0.01, 0.01, -0.01]),
            ("DOGE", &[0.05, -0.05, 0.05, -0.05]),
            ("ETH", &[0.02, -0.02, 0.02, -0.02]),
        ]);
        let assets = names(&["BTC", "DOGE", "ETH"]);
        let w = AllocationEngine::inverse_volatility_weights(&assets, &panel, 90).unwrap();

        assert!((w.sum() - 1.0).abs() < 1e-9);
        assert!(w.get("BTC") >= w.get("ETH"));
        assert!(w.get("ETH") >= w.get("DOGE"));
        // vol ratios 1 : 2 : 5
        let expected_btc = 1.0 / (1.0 + 0.5 + 0.2);
        assert!((w.get("BTC") - expected_btc).abs() < 1e-9);
    }

    #[test]
    fn inverse_volatility_is_monotone_across_panels() {
        let base = [0.01, -0.02, 0.015, -0.005, 0.02, -0.01, 0.03, -0.025];
        let scale_sets: [&[f64]; 5] = [
            &[1.0, 2.0, 3.0],
            &[0.5, 4.0, 1.5, 2.5],
            &[3.0, 1.0],
            &[1.0, 1.0, 2.0],
            &[0.1, 7.0, 0.3, 2.0, 5.0],
        ];

        for scales in scale_sets {
            let series: Vec<(String, Vec<f64>)> = scales
                .iter()
                .enumerate()
                .map(|(i, scale)| {
                    let mut shape = base.to_vec();
                    shape.rotate_left(i);
                    (format!("A{i}"), shape.iter().map(|r| r * scale).collect())
                })
                .collect();
            let refs: Vec<(&str, &[f64])> = series.iter().map(|(a, r)| (a.as_str(), r.as_slice())).collect();
            let panel = returns(&refs);
            let assets: Vec<String> = series.iter().map(|(a, _)| a.clone()).collect();

            let w = AllocationEngine::inverse_volatility_weights(&assets, &panel, DEFAULT_RISK_PARITY_WINDOW).unwrap();
            assert!((w.sum() - 1.0).abs() < 1e-9, "weights {w:?} do not sum to 1");

            let mut by_vol: Vec<(f64, f64)> = series
                .iter()
                .map(|(a, r)| (sample_std(r).unwrap(), w.get(a)))
                .collect();
            by_vol.sort_by(|x, y| x.0.total_cmp(&y.0));
            for pair in by_vol.windows(2) {
                assert!(
                    pair[1].1 <= pair[0].1 + 1e-12,
                    "vol {} weight {} vs vol {} weight {}",
                    pair[0].0,
                    pair[0].1,
                    pair[1].0,
                    pair[1].1
                );
            }
        }
    }

    #[test]
    fn inverse_volatility_uses_trailing_window() {
        // calm tail for BTC, wild tail for ETH
        let panel = returns(&[
            ("BTC", &[0.5, -0.5, 0.01, -0.01]),
            ("ETH", &[0.01, -0.01, 0.01, -0.01]),
        ]);
        let assets = names(&["BTC", "ETH"]);
        let w = AllocationEngine::inverse_volatility_weights(&assets, &panel, 2).unwrap();
        assert!((w.get("BTC") - 0.5).abs() < 1e-9);

        let full = AllocationEngine::inverse_volatility_weights(&assets, &panel, 90).unwrap();
        assert!(full.get("BTC") < full.get("ETH"));
    }

    #[test]
    fn zero_volatility_assets_get_no_weight() {
        let panel = returns(&[("USDT", &[0.0, 0.0, 0.0]), ("BTC", &[0.02, -0.01, 0.03])]);
        let w = AllocationEngine::inverse_volatility_weights(&names(&["USDT", "BTC", "SOL"]), &panel, 90).unwrap();
        assert_eq!(w.get("USDT"), 0.0);
        assert_eq!(w.get("SOL"), 0.0);
        assert!((w.get("BTC") - 1.0).abs() < 1e-12);
    }

    #[test]
    fn all_flat_falls_back_to_equal() {
        let panel = returns(&[("USDT", &[0.0, 0.0]), ("USDC", &[0.0, 0.0])]);
        let w = AllocationEngine::inverse_volatility_from_returns(&panel).unwrap();
        assert_eq!(w.get("USDT"), 0.5);
        assert_eq!(w.get("USDC"), 0.5);
    }

    #[test]
    fn strategy_keys() {
        assert_eq!("equal".parse::<AllocationStrategy>().unwrap(), AllocationStrategy::EqualWeight);
        assert_eq!("Rule_Based".parse::<AllocationStrategy>().unwrap(), AllocationStrategy::RuleBased);
        assert_eq!(
            "inverse_volatility".parse::<AllocationStrategy>().unwrap(),
            AllocationStrategy::RiskParity { window: 90 }
        );
        assert_eq!("performance".parse::<AllocationStrategy>().unwrap(), AllocationStrategy::Performance);
        assert!(matches!(
            "momentum".parse::<AllocationStrategy>(),
            Err(AllocationError::UnknownStrategy { name }) if name == "momentum"
        ));
    }

    #[test]
    fn performance_allocates_equal_weights() {
        let panel = returns(&[("BTC", &[0.01, 0.02]), ("ETH", &[0.03, -0.01])]);
        let assets = names(&["BTC", "ETH"]);
        let w = AllocationStrategy::Performance.allocate(&assets, &panel).unwrap();
        assert_eq!(w.get("BTC"), 0.5);
        assert_eq!(w.get("ETH"), 0.5);
    }
}
