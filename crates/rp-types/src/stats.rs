//! Sample statistics shared by the returns, allocation and risk code.
//!
//! Variance, standard deviation and covariance use the sample convention
//! (ddof = 1), so they are undefined below two observations.

pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

pub fn sample_variance(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let m = mean(values)?;
    let ss: f64 = values.iter().map(|v| (v - m).powi(2)).sum();
    Some(ss / (values.len() - 1) as f64)
}

pub fn sample_std(values: &[f64]) -> Option<f64> {
    sample_variance(values).map(f64::sqrt)
}

/// Sample covariance of two equally long series.
pub fn sample_covariance(a: &[f64], b: &[f64]) -> Option<f64> {
    if a.len() != b.len() || a.len() < 2 {
        return None;
    }
    let ma = mean(a)?;
    let mb = mean(b)?;
    let sp: f64 = a.iter().zip(b).map(|(x, y)| (x - ma) * (y - mb)).sum();
    Some(sp / (a.len() - 1) as f64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sample_std_uses_ddof_one() {
        let returns = [0.01, -0.02, 0.03, 0.04, -0.01];
        assert!((mean(&returns).unwrap() - 0.01).abs() < 1e-12);
        // squared deviations sum to 0.0026, over n - 1 = 4
        assert!((sample_variance(&returns).unwrap() - 0.00065).abs() < 1e-12);
        assert!((sample_std(&returns).unwrap() - 0.00065f64.sqrt()).abs() < 1e-12);
    }

    #[test]
    fn undefined_below_two_observations() {
        assert_eq!(mean(&[]), None);
        assert_eq!(sample_variance(&[0.1]), None);
        assert_eq!(sample_covariance(&[0.1], &[0.2]), None);
    }

    #[test]
    fn covariance_matches_variance_on_diagonal() {
        let a = [0.01, 0.02, -0.01, 0.03];
        let b = [0.02, 0.01, 0.00, 0.01];
        assert!((sample_covariance(&a, &a).unwrap() - sample_variance(&a).unwrap()).abs() < 1e-15);
        assert!(sample_covariance(&a, &b).unwrap() > 0.0);
        assert_eq!(sample_covariance(&a, &b[..3]), None);
    }
}
