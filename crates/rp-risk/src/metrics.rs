//! Risk metrics over a portfolio return series.
//!
//! Ratios follow one policy for a zero denominator: `+inf` when the mean is
//! positive, `-inf` when negative, `NaN` when the mean is exactly zero.

use rp_types::stats::{mean, sample_std};
use rp_types::RuleError;

use crate::alerts::RuleKind;

/// Sample standard deviation of returns.
pub fn volatility(returns: &[f64]) -> Result<f64, RuleError> {
    require_observations(RuleKind::Volatility, returns, 2)?;
    sample_std(returns).ok_or_else(|| insufficient(RuleKind::Volatility, returns.len(), 2))
}

/// Mean over standard deviation, no risk-free adjustment.
pub fn sharpe_ratio(returns: &[f64]) -> Result<f64, RuleError> {
    require_observations(RuleKind::Sharpe, returns, 2)?;
    let m = mean(returns).ok_or_else(|| insufficient(RuleKind::Sharpe, 0, 2))?;
    let sd = sample_std(returns).ok_or_else(|| insufficient(RuleKind::Sharpe, returns.len(), 2))?;
    Ok(ratio(m, sd))
}

/// Mean over the standard deviation of the negative returns only.
///
/// Without any negative return the downside deviation is 0. A single
/// negative return leaves it undefined and the ratio is `NaN`.
pub fn sortino_ratio(returns: &[f64]) -> Result<f64, RuleError> {
    require_observations(RuleKind::Sortino, returns, 2)?;
    let m = mean(returns).ok_or_else(|| insufficient(RuleKind::Sortino, 0, 2))?;
    let downside: Vec<f64> = returns.iter().copied().filter(|r| *r < 0.0).collect();
    Ok(match downside.len() {
        0 => ratio(m, 0.0),
        1 => f64::NAN,
        _ => sample_std(&downside).map_or(f64::NAN, |dev| ratio(m, dev)),
    })
}

/// Worst `value / running_peak - 1` over a cumulative value path. Always <= 0.
pub fn max_drawdown(cumulative: &[f64]) -> Result<f64, RuleError> {
    require_observations(RuleKind::MaxDrawdown, cumulative, 1)?;

    let mut peak = f64::NEG_INFINITY;
    let mut worst = 0.0_f64;
    for &value in cumulative {
        if value > peak {
            peak = value;
        }
        let drawdown = if peak > 0.0 { value / peak - 1.0 } else { -1.0 };
        if drawdown < worst {
            worst = drawdown;
        }
    }
    Ok(worst)
}

/// `numerator / denominator` with the signed-infinity policy for a zero
/// denominator.
pub fn ratio(numerator: f64, denominator: f64) -> f64 {
    if denominator > 0.0 {
        numerator / denominator
    } else if numerator > 0.0 {
        f64::INFINITY
    } else if numerator < 0.0 {
        f64::NEG_INFINITY
    } else {
        f64::NAN
    }
}

fn require_observations(rule: RuleKind, values: &[f64], required: usize) -> Result<(), RuleError> {
    if values.is_empty() {
        return Err(RuleError::EmptyReturns {
            rule: rule.as_str().to_string(),
        });
    }
    if values.len() < required {
        return Err(insufficient(rule, values.len(), required));
    }
    Ok(())
}

fn insufficient(rule: RuleKind, observations: usize, required: usize) -> RuleError {
    RuleError::InsufficientObservations {
        rule: rule.as_str().to_string(),
        observations,
        required,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RETURNS: [f64; 5] = [0.01, -0.02, 0.03, 0.04, -0.01];

    #[test]
    fn volatility_of_sample_returns() {
        let vol = volatility(&RETURNS).unwrap();
        assert!((vol - 0.025495).abs() < 1e-5);
    }

    #[test]
    fn sharpe_of_sample_returns() {
        let sharpe = sharpe_ratio(&RETURNS).unwrap();
        assert!((sharpe - 0.01 / 0.00065f64.sqrt()).abs() < 1e-12);
    }

    #[test]
    fn sortino_uses_downside_only() {
        // downside = [-0.02, -0.01], sample std = 0.00707...
        let sortino = sortino_ratio(&RETURNS).unwrap();
        assert!((sortino - 0.01 / 0.00005f64.sqrt()).abs() < 1e-9);
    }

    #[test]
    fn zero_deviation_policy() {
        assert_eq!(sharpe_ratio(&[0.25, 0.25, 0.25]).unwrap(), f64::INFINITY);
        assert_eq!(sharpe_ratio(&[-0.01, -0.01]).unwrap(), f64::NEG_INFINITY);
        assert!(sharpe_ratio(&[0.0, 0.0]).unwrap().is_nan());
        // no losses at all: downside deviation is zero
        assert_eq!(sortino_ratio(&[0.01, 0.02]).unwrap(), f64::INFINITY);
        // one loss is not enough for a sample deviation
        assert!(sortino_ratio(&[0.05, -0.01]).unwrap().is_nan());
        assert!(sortino_ratio(&[0.05, 0.04, -0.01]).unwrap().is_nan());
    }

    #[test]
    fn too_few_observations() {
        assert!(matches!(
            volatility(&[]),
            Err(RuleError::EmptyReturns { .. })
        ));
        assert!(matches!(
            sharpe_ratio(&[0.01]),
            Err(RuleError::InsufficientObservations { required: 2, .. })
        ));
    }

    #[test]
    fn max_drawdown_from_value_path() {
        let dd = max_drawdown(&[1.0, 1.1, 0.99, 1.05]).unwrap();
        assert!((dd - (0.99 / 1.1 - 1.0)).abs() < 1e-12);
        assert_eq!(max_drawdown(&[1.0, 1.1, 1.2]).unwrap(), 0.0);
        assert!(max_drawdown(&[]).is_err());
    }

    #[test]
    fn max_drawdown_of_wiped_out_path() {
        assert_eq!(max_drawdown(&[1.0, 0.0, 0.0]).unwrap(), -1.0);
        assert_eq!(max_drawdown(&[0.0]).unwrap(), -1.0);
    }
}
