//! Weight vector × returns panel → portfolio return series.

use std::collections::BTreeMap;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use rp_types::{CumulativeSeries, DataError, Observation, PortfolioReturnSeries, ReturnsPanel, RpResult, WeightVector};

/// Stateless portfolio aggregation.
pub struct PortfolioAggregator;

impl PortfolioAggregator {
    /// `Σ w·r` per date, over the dates every contributing asset has.
    ///
    /// An asset contributes when its weight is non-zero and it is present in
    /// the panel. With no contributors the series is empty.
    pub fn aggregate(returns: &ReturnsPanel, weights: &WeightVector) -> PortfolioReturnSeries {
        let contributors: Vec<(&str, f64)> = weights
            .iter()
            .filter(|(asset, w)| *w != 0.0 && returns.series(asset).is_some())
            .collect();
        if contributors.is_empty() {
            debug!("No contributing assets; portfolio series is empty");
            return PortfolioReturnSeries::default();
        }

        let by_date: Vec<(f64, BTreeMap<DateTime<Utc>, f64>)> = contributors
            .iter()
            .map(|(asset, w)| {
                let lookup = returns
                    .series(asset)
                    .unwrap_or_default()
                    .iter()
                    .map(|p| (p.date, p.value))
                    .collect();
                (*w, lookup)
            })
            .collect();

        let dates = returns.common_dates(contributors.iter().map(|(a, _)| *a));
        let points = dates
            .into_iter()
            .map(|date| {
                let value = by_date
                    .iter()
                    .map(|(w, lookup)| w * lookup.get(&date).copied().unwrap_or(0.0))
                    .sum();
                Observation::new(date, value)
            })
            .collect();

        PortfolioReturnSeries::new(points)
    }

    pub fn cumulative(series: &PortfolioReturnSeries) -> CumulativeSeries {
        series.cumulative()
    }

    /// Cumulative return (`Π(1+r) − 1`) of the portfolio and of one asset over
    /// the dates both have.
    pub fn compare_with_asset(
        series: &PortfolioReturnSeries,
        returns: &ReturnsPanel,
        asset: &str,
    ) -> Result<ComparisonSeries, DataError> {
        let asset_returns: BTreeMap<DateTime<Utc>, f64> = returns
            .series(asset)
            .ok_or_else(|| DataError::AssetNotFound {
                asset: asset.to_string(),
            })?
            .iter()
            .map(|p| (p.date, p.value))
            .collect();

        let mut portfolio_value = 1.0;
        let mut asset_value = 1.0;
        let mut points = Vec::with_capacity(series.len());
        for point in &series.points {
            let Some(asset_return) = asset_returns.get(&point.date) else {
                continue;
            };
            portfolio_value *= 1.0 + point.value;
            asset_value *= 1.0 + asset_return;
            points.push(ComparisonPoint {
                date: point.date,
                portfolio: portfolio_value - 1.0,
                asset: asset_value - 1.0,
            });
        }

        Ok(ComparisonSeries {
            asset: asset.to_string(),
            points,
        })
    }
}

/// One joined row of a portfolio-vs-asset comparison.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonPoint {
    pub date: DateTime<Utc>,
    pub portfolio: f64,
    pub asset: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonSeries {
    pub asset: String,
    pub points: Vec<ComparisonPoint>,
}

impl ComparisonSeries {
    /// Final cumulative returns `(portfolio, asset)`.
    pub fn last(&self) -> Option<(f64, f64)> {
        self.points.last().map(|p| (p.portfolio, p.asset))
    }

    /// Writes `date,portfolio_cum,<asset>_cum` rows.
    pub fn write_csv(&self, path: impl AsRef<Path>) -> RpResult<()> {
        let path = path.as_ref();
        let mut writer = csv::Writer::from_path(path).map_err(csv_error)?;
        let asset_column = format!("{}_cum", self.asset.to_lowercase());
        writer
            .write_record(["date", "portfolio_cum", asset_column.as_str()])
            .map_err(csv_error)?;
        for p in &self.points {
            writer
                .write_record([
                    p.date.format("%Y-%m-%d").to_string(),
                    p.portfolio.to_string(),
                    p.asset.to_string(),
                ])
                .map_err(csv_error)?;
        }
        writer.flush()?;
        info!(path = %path.display(), rows = self.points.len(), "Wrote comparison CSV");
        Ok(())
    }
}

fn csv_error(e: csv::Error) -> rp_types::RpError {
    rp_types::RpError::Io(std::io::Error::new(std::io::ErrorKind::Other, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn day(n: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + Duration::days(n)
    }

    fn returns(data: &[(&str, &[(i64, f64)])]) -> ReturnsPanel {
        ReturnsPanel::from_series(data.iter().map(|(a, r)| {
            let points: Vec<Observation> = r.iter().map(|(d, v)| Observation::new(day(*d), *v)).collect();
            (*a, points)
        }))
        .unwrap()
    }

    fn weights(pairs: &[(&str, f64)]) -> WeightVector {
        pairs.iter().map(|(a, w)| (*a, *w)).collect()
    }

    #[test]
    fn equal_weight_portfolio_is_average_return() {
        let panel = returns(&[
            ("BTC", &[(1, 0.01), (2, -0.0198), (3, 0.0606)]),
            ("ETH", &[(1, -0.02), (2, 0.0408), (3, 0.0196)]),
        ]);
        let series = PortfolioAggregator::aggregate(&panel, &weights(&[("BTC", 0.5), ("ETH", 0.5)]));

        let values = series.values();
        assert_eq!(values.len(), 3);
        assert!((values[0] - (-0.005)).abs() < 1e-12);
        assert!((values[1] - 0.0105).abs() < 1e-12);
        assert!((values[2] - 0.0401).abs() < 1e-12);
    }

    #[test]
    fn btc_eth_prices_to_equal_weight_portfolio() {
        use crate::allocation::AllocationEngine;
        use crate::returns::ReturnsEngine;
        use rp_types::PricePanel;

        let prices = PricePanel::from_series([
            ("BTC", [100.0, 101.0, 99.0, 105.0]),
            ("ETH", [50.0, 49.0, 51.0, 52.0]),
        ]
        .into_iter()
        .map(|(asset, closes)| {
            let points: Vec<Observation> = closes
                .iter()
                .enumerate()
                .map(|(i, c)| Observation::new(day(i as i64), *c))
                .collect();
            (asset, points)
        }))
        .unwrap();

        let panel = ReturnsEngine::returns_from_prices(&prices).unwrap();
        let assets: Vec<String> = panel.assets().map(str::to_string).collect();
        let w = AllocationEngine::equal_weights(&assets).unwrap();
        let series = PortfolioAggregator::aggregate(&panel, &w);

        let btc = panel.values("BTC").unwrap();
        let eth = panel.values("ETH").unwrap();
        assert_eq!(series.len(), 3);
        for (i, point) in series.points.iter().enumerate() {
            assert_eq!(point.date, day(i as i64 + 1));
            assert!((point.value - (btc[i] + eth[i]) / 2.0).abs() < 1e-12);
        }
    }

    #[test]
    fn inner_join_over_contributors_only() {
        let panel = returns(&[
            ("BTC", &[(1, 0.01), (2, 0.02), (3, 0.03)]),
            ("ETH", &[(2, 0.04), (3, 0.05)]),
            ("NEW", &[(3, 0.5)]),
        ]);
        let series = PortfolioAggregator::aggregate(
            &panel,
            &weights(&[("BTC", 0.5), ("ETH", 0.5), ("NEW", 0.0), ("GONE", 0.3)]),
        );
        let dates: Vec<DateTime<Utc>> = series.points.iter().map(|p| p.date).collect();
        assert_eq!(dates, vec![day(2), day(3)]);
    }

    #[test]
    fn no_contributors_gives_empty_series() {
        let panel = returns(&[("BTC", &[(1, 0.01)])]);
        assert!(PortfolioAggregator::aggregate(&panel, &weights(&[("BTC", 0.0)])).is_empty());
        assert!(PortfolioAggregator::aggregate(&panel, &WeightVector::new()).is_empty());
    }

    #[test]
    fn aggregation_is_deterministic() {
        let panel = returns(&[("BTC", &[(1, 0.01), (2, 0.02)]), ("ETH", &[(1, 0.03), (2, -0.01)])]);
        let w = weights(&[("BTC", 0.6), ("ETH", 0.4)]);
        let a = PortfolioAggregator::aggregate(&panel, &w);
        let b = PortfolioAggregator::aggregate(&panel, &w);
        assert_eq!(a, b);
        assert_eq!(PortfolioAggregator::cumulative(&a), PortfolioAggregator::cumulative(&b));
    }

    #[test]
    fn cumulative_compounds() {
        let panel = returns(&[("BTC", &[(1, 0.1), (2, -0.5)])]);
        let series = PortfolioAggregator::aggregate(&panel, &weights(&[("BTC", 1.0)]));
        let cum = PortfolioAggregator::cumulative(&series).values();
        assert!((cum[0] - 1.1).abs() < 1e-12);
        assert!((cum[1] - 0.55).abs() < 1e-12);
    }

    #[test]
    fn comparison_against_single_asset() {
        let panel = returns(&[
            ("BTC", &[(1, 0.1), (2, 0.1)]),
            ("DOGE", &[(1, -0.5), (2, 1.0)]),
        ]);
        let series = PortfolioAggregator::aggregate(&panel, &weights(&[("BTC", 1.0)]));
        let cmp = PortfolioAggregator::compare_with_asset(&series, &panel, "DOGE").unwrap();

        assert_eq!(cmp.points.len(), 2);
        let (portfolio, asset) = cmp.last().unwrap();
        assert!((portfolio - 0.21).abs() < 1e-12);
        assert!(asset.abs() < 1e-12);

        assert!(matches!(
            PortfolioAggregator::compare_with_asset(&series, &panel, "XRP"),
            Err(DataError::AssetNotFound { .. })
        ));
    }

    #[test]
    fn comparison_csv_has_header_and_rows() {
        let panel = returns(&[("BTC", &[(1, 0.1), (2, 0.1)])]);
        let series = PortfolioAggregator::aggregate(&panel, &weights(&[("BTC", 1.0)]));
        let cmp = PortfolioAggregator::compare_with_asset(&series, &panel, "BTC").unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("comparison.csv");
        cmp.write_csv(&path).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let mut lines = text.lines();
        assert_eq!(lines.next(), Some("date,portfolio_cum,btc_cum"));
        assert_eq!(lines.count(), 2);
    }
}
