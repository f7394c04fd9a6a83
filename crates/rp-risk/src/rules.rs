//! Pure threshold predicates, one per rule.
//!
//! Every comparison is written so that a NaN metric fails.

use rp_types::{RuleError, WeightVector};

use crate::metrics::{max_drawdown, sharpe_ratio, sortino_ratio, volatility};

/// Verdict of a single predicate.
#[derive(Debug, Clone, PartialEq)]
pub struct RuleCheck {
    pub passed: bool,
    pub message: String,
    pub metric: Option<f64>,
    pub asset: Option<String>,
}

impl RuleCheck {
    fn new(passed: bool, message: String, metric: f64) -> Self {
        Self {
            passed,
            message,
            metric: Some(metric),
            asset: None,
        }
    }
}

pub fn check_volatility(returns: &[f64], threshold: f64) -> Result<RuleCheck, RuleError> {
    let vol = volatility(returns)?;
    Ok(if vol <= threshold {
        RuleCheck::new(true, format!("Volatility {vol:.2} within threshold {threshold}"), vol)
    } else {
        RuleCheck::new(false, format!("Volatility {vol:.2} above threshold {threshold}"), vol)
    })
}

pub fn check_sharpe(returns: &[f64], min_sharpe: f64) -> Result<RuleCheck, RuleError> {
    let sharpe = sharpe_ratio(returns)?;
    Ok(if sharpe >= min_sharpe {
        RuleCheck::new(true, format!("Sharpe {sharpe:.2} at or above {min_sharpe}"), sharpe)
    } else {
        RuleCheck::new(false, format!("Sharpe {sharpe:.2} below {min_sharpe}"), sharpe)
    })
}

pub fn check_sortino(returns: &[f64], min_sortino: f64) -> Result<RuleCheck, RuleError> {
    let sortino = sortino_ratio(returns)?;
    Ok(if sortino >= min_sortino {
        RuleCheck::new(true, format!("Sortino {sortino:.2} at or above {min_sortino}"), sortino)
    } else {
        RuleCheck::new(false, format!("Sortino {sortino:.2} below {min_sortino}"), sortino)
    })
}

/// `cumulative` is a compounded value path, see [`max_drawdown`].
pub fn check_max_drawdown(cumulative: &[f64], threshold: f64) -> Result<RuleCheck, RuleError> {
    let dd = max_drawdown(cumulative)?;
    Ok(if dd >= threshold {
        RuleCheck::new(true, format!("Max Drawdown {dd:.2} within {threshold}"), dd)
    } else {
        RuleCheck::new(false, format!("Max Drawdown {dd:.2} below {threshold}"), dd)
    })
}

/// Placeholder until a benchmark series exists.
pub fn check_beta() -> Result<RuleCheck, RuleError> {
    Ok(RuleCheck {
        passed: true,
        message: "Beta not evaluated".to_string(),
        metric: None,
        asset: None,
    })
}

/// Fails on the first asset, in vector order, whose weight exceeds `max_weight`.
pub fn check_max_asset_weight(weights: &WeightVector, max_weight: f64) -> Result<RuleCheck, RuleError> {
    if weights.is_empty() {
        return Err(RuleError::EmptyWeights);
    }
    if let Some((asset, weight)) = weights.iter().find(|(_, w)| w.is_nan() || *w < 0.0) {
        return Err(RuleError::InvalidWeight {
            asset: asset.to_string(),
            weight,
        });
    }

    if let Some((asset, weight)) = weights.iter().find(|(_, w)| *w > max_weight) {
        return Ok(RuleCheck {
            passed: false,
            message: format!("Asset {asset} weight {weight:.2} above {max_weight}"),
            metric: Some(weight),
            asset: Some(asset.to_string()),
        });
    }

    let largest = weights.max_weight().map(|(_, w)| w).unwrap_or(0.0);
    Ok(RuleCheck::new(
        true,
        format!("Largest weight {largest:.2} within {max_weight}"),
        largest,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    const RETURNS: [f64; 5] = [0.01, -0.02, 0.03, 0.04, -0.01];

    fn weights(pairs: &[(&str, f64)]) -> WeightVector {
        pairs.iter().map(|(a, w)| (*a, *w)).collect()
    }

    #[test]
    fn volatility_within_threshold() {
        let check = check_volatility(&RETURNS, 0.5).unwrap();
        assert!(check.passed);
        assert!((check.metric.unwrap() - 0.025495).abs() < 1e-5);
    }

    #[test]
    fn volatility_breach_message() {
        let check = check_volatility(&RETURNS, 0.01).unwrap();
        assert!(!check.passed);
        assert_eq!(check.message, "Volatility 0.03 above threshold 0.01");
    }

    #[test]
    fn sharpe_and_sortino_against_minimum() {
        // sharpe ~0.39, sortino ~1.41
        let sharpe = check_sharpe(&RETURNS, 0.5).unwrap();
        assert!(!sharpe.passed);
        assert_eq!(sharpe.message, "Sharpe 0.39 below 0.5");

        let sortino = check_sortino(&RETURNS, 0.5).unwrap();
        assert!(sortino.passed);
    }

    #[test]
    fn nan_metric_fails_closed() {
        // zero mean and zero deviation
        let check = check_sharpe(&[0.0, 0.0, 0.0], -1.0).unwrap();
        assert!(check.metric.unwrap().is_nan());
        assert!(!check.passed);
    }

    #[test]
    fn infinite_sortino_passes() {
        let check = check_sortino(&[0.01, 0.02], 0.5).unwrap();
        assert!(check.passed);
        assert_eq!(check.metric, Some(f64::INFINITY));
    }

    #[test]
    fn single_loss_sortino_fails_closed() {
        let check = check_sortino(&[0.05, 0.04, -0.01], 0.5).unwrap();
        assert!(check.metric.unwrap().is_nan());
        assert!(!check.passed);
        assert_eq!(check.message, "Sortino NaN below 0.5");
    }

    #[test]
    fn drawdown_below_threshold_fails() {
        let check = check_max_drawdown(&[1.0, 1.2, 0.9], -0.2).unwrap();
        assert!(!check.passed);
        assert_eq!(check.message, "Max Drawdown -0.25 below -0.2");
        assert!(check_max_drawdown(&[1.0, 1.05, 1.0], -0.2).unwrap().passed);
    }

    #[test]
    fn beta_always_passes() {
        let check = check_beta().unwrap();
        assert!(check.passed);
        assert_eq!(check.metric, None);
    }

    #[test]
    fn max_asset_weight_reports_first_offender() {
        let w = weights(&[("BTC", 0.5), ("ETH", 0.3), ("ADA", 0.2)]);
        let check = check_max_asset_weight(&w, 0.4).unwrap();
        assert!(!check.passed);
        assert_eq!(check.asset.as_deref(), Some("BTC"));
        assert_eq!(check.metric, Some(0.5));
        assert_eq!(check.message, "Asset BTC weight 0.50 above 0.4");
    }

    #[test]
    fn max_asset_weight_short_circuits_in_vector_order() {
        let w = weights(&[("ETH", 0.45), ("BTC", 0.55)]);
        let check = check_max_asset_weight(&w, 0.4).unwrap();
        assert_eq!(check.asset.as_deref(), Some("ETH"));
    }

    #[test]
    fn max_asset_weight_rejects_bad_vectors() {
        assert_eq!(
            check_max_asset_weight(&WeightVector::new(), 0.4),
            Err(RuleError::EmptyWeights)
        );
        let w = weights(&[("BTC", 0.2), ("ETH", -0.1)]);
        assert!(matches!(
            check_max_asset_weight(&w, 0.4),
            Err(RuleError::InvalidWeight { ref asset, .. }) if asset == "ETH"
        ));
    }

    #[test]
    fn max_asset_weight_pass_reports_largest() {
        let w = weights(&[("BTC", 0.35), ("ETH", 0.35), ("ADA", 0.3)]);
        let check = check_max_asset_weight(&w, 0.4).unwrap();
        assert!(check.passed);
        assert_eq!(check.metric, Some(0.35));
    }
}
