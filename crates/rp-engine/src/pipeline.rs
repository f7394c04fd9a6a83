//! End-to-end risk-parity pipeline.
//!
//! Steps run in a fixed order and each records a [`StepOutcome`]. A failing
//! step is logged and reported; later steps that need its output are skipped,
//! the rest still run.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};

use rp_data::SqliteStore;
use rp_risk::{AlertSinks, RiskRuleEngine, RiskRuleResult};
use rp_types::{CumulativeSeries, PortfolioReturnSeries, PricePanel, ReturnsPanel, RpResult, WeightVector};

use crate::aggregator::{ComparisonSeries, PortfolioAggregator};
use crate::allocation::AllocationStrategy;
use crate::config::PipelineConfig;
use crate::returns::ReturnsEngine;
use crate::stress::{StressReport, StressSimulator};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStep {
    RiskParity,
    Comparison,
    PersistReturns,
    StressTest,
    RiskRules,
}

impl PipelineStep {
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineStep::RiskParity => "risk_parity",
            PipelineStep::Comparison => "comparison",
            PipelineStep::PersistReturns => "persist_returns",
            PipelineStep::StressTest => "stress_test",
            PipelineStep::RiskRules => "risk_rules",
        }
    }
}

impl fmt::Display for PipelineStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StepOutcome {
    Completed { detail: String },
    Failed { error: String },
    Skipped { reason: String },
}

impl StepOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, StepOutcome::Completed { .. })
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, StepOutcome::Failed { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepReport {
    pub step: PipelineStep,
    pub outcome: StepOutcome,
}

/// Everything one pipeline run produced.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PipelineReport {
    pub weights: Option<WeightVector>,
    pub portfolio: PortfolioReturnSeries,
    pub cumulative: CumulativeSeries,
    pub comparison: Option<ComparisonSeries>,
    pub stress: Option<StressReport>,
    pub rule_results: Vec<RiskRuleResult>,
    pub steps: Vec<StepReport>,
}

impl PipelineReport {
    pub fn outcome(&self, step: PipelineStep) -> Option<&StepOutcome> {
        self.steps.iter().find(|s| s.step == step).map(|s| &s.outcome)
    }

    pub fn failed_steps(&self) -> impl Iterator<Item = &StepReport> {
        self.steps.iter().filter(|s| s.outcome.is_failed())
    }

    fn record(&mut self, step: PipelineStep, outcome: StepOutcome) {
        match &outcome {
            StepOutcome::Completed { detail } => info!(step = step.as_str(), %detail, "Pipeline step completed"),
            StepOutcome::Failed { error } => warn!(step = step.as_str(), %error, "Pipeline step failed"),
            StepOutcome::Skipped { reason } => info!(step = step.as_str(), %reason, "Pipeline step skipped"),
        }
        self.steps.push(StepReport { step, outcome });
    }
}

fn completed(detail: impl Into<String>) -> StepOutcome {
    StepOutcome::Completed { detail: detail.into() }
}

fn failed(error: impl fmt::Display) -> StepOutcome {
    StepOutcome::Failed {
        error: error.to_string(),
    }
}

fn skipped(reason: impl Into<String>) -> StepOutcome {
    StepOutcome::Skipped { reason: reason.into() }
}

pub struct RiskPipeline {
    config: PipelineConfig,
    store: Option<Arc<SqliteStore>>,
    rules: RiskRuleEngine,
}

impl RiskPipeline {
    pub fn new(config: PipelineConfig, store: Option<Arc<SqliteStore>>, sinks: AlertSinks) -> Self {
        let rules = RiskRuleEngine::new(config.thresholds.clone(), sinks);
        Self { config, store, rules }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Risk-parity allocation, optional comparison export, persistence of
    /// the portfolio series, the default stress test and the rule battery.
    pub fn run(&self, prices: &PricePanel) -> PipelineReport {
        let mut report = PipelineReport::default();
        info!(assets = prices.len(), observations = prices.observation_count(), "Starting risk pipeline");

        let returns = match self.allocate(prices, &mut report) {
            Ok(returns) => Some(returns),
            Err(e) => {
                report.record(PipelineStep::RiskParity, failed(&e));
                None
            }
        };

        match (&returns, &self.config.comparison_asset) {
            (_, None) => report.record(PipelineStep::Comparison, skipped("no comparison asset configured")),
            (None, Some(_)) => report.record(PipelineStep::Comparison, skipped("no portfolio series")),
            (Some(returns), Some(asset)) => {
                let outcome = match self.compare(returns, asset, &mut report) {
                    Ok(path) => completed(format!("wrote {}", path.display())),
                    Err(e) => failed(&e),
                };
                report.record(PipelineStep::Comparison, outcome);
            }
        }

        let outcome = match (&self.store, &report.weights) {
            (None, _) => skipped("no store configured"),
            (Some(_), None) => skipped("no portfolio series"),
            (Some(store), Some(_)) => match store.save_portfolio_returns(&report.portfolio) {
                Ok(rows) => completed(format!("{rows} portfolio returns saved")),
                Err(e) => failed(&e),
            },
        };
        report.record(PipelineStep::PersistReturns, outcome);

        let outcome = match report.weights.clone() {
            None => skipped("no weights"),
            Some(weights) => match StressSimulator::midpoint_date(prices) {
                None => skipped("price panel has no dates"),
                Some(shock_date) => {
                    let shocks = StressSimulator::uniform_shock(prices.assets(), self.config.stress_shock);
                    match StressSimulator::run(prices, &weights, shock_date, &shocks) {
                        Ok(stress) => {
                            let detail = format!(
                                "shock {} from {}, total return impact {:.4}",
                                self.config.stress_shock,
                                shock_date.format("%Y-%m-%d"),
                                stress.total_return_impact()
                            );
                            report.stress = Some(stress);
                            completed(detail)
                        }
                        Err(e) => failed(&e),
                    }
                }
            },
        };
        report.record(PipelineStep::StressTest, outcome);

        let outcome = match &report.weights {
            None => skipped("no weights"),
            Some(weights) => {
                let results = self.rules.evaluate_portfolio(&report.portfolio, weights);
                let failing = results.iter().filter(|r| !r.passed).count();
                let sink_failures: usize = results.iter().map(|r| r.sink_failures.len()).sum();
                if sink_failures > 0 {
                    warn!(sink_failures, "Some alerts were not fully delivered");
                }
                report.rule_results = results;
                completed(format!(
                    "{failing} of {} rules failed, {sink_failures} sink failures",
                    report.rule_results.len()
                ))
            }
        };
        report.record(PipelineStep::RiskRules, outcome);

        report
    }

    fn allocate(&self, prices: &PricePanel, report: &mut PipelineReport) -> RpResult<ReturnsPanel> {
        let returns = ReturnsEngine::returns_from_prices(prices)?;
        let assets: Vec<String> = returns.assets().map(str::to_string).collect();
        let strategy = AllocationStrategy::RiskParity {
            window: self.config.risk_parity_window,
        };
        let weights = strategy.allocate(&assets, &returns)?;

        report.portfolio = PortfolioAggregator::aggregate(&returns, &weights);
        report.cumulative = PortfolioAggregator::cumulative(&report.portfolio);
        let detail = format!(
            "{} assets, {} portfolio returns, final value {:.4}",
            weights.len(),
            report.portfolio.len(),
            report.cumulative.last().unwrap_or(1.0)
        );
        report.weights = Some(weights);
        report.record(PipelineStep::RiskParity, completed(detail));
        Ok(returns)
    }

    fn compare(&self, returns: &ReturnsPanel, asset: &str, report: &mut PipelineReport) -> RpResult<PathBuf> {
        let comparison = PortfolioAggregator::compare_with_asset(&report.portfolio, returns, asset)?;
        std::fs::create_dir_all(&self.config.results_dir)?;
        let path = self
            .config
            .results_dir
            .join(format!("portfolio_vs_{}.csv", asset.to_lowercase()));
        comparison.write_csv(&path)?;
        report.comparison = Some(comparison);
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use crossbeam_channel::unbounded;
    use rp_risk::ChannelNotifier;
    use rp_types::{AlertStore, Observation};

    fn day(n: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + Duration::days(n)
    }

    fn prices(data: &[(&str, &[f64])]) -> PricePanel {
        PricePanel::from_series(data.iter().map(|(a, p)| {
            let points: Vec<Observation> = p
                .iter()
                .enumerate()
                .map(|(i, v)| Observation::new(day(i as i64), *v))
                .collect();
            (*a, points)
        }))
        .unwrap()
    }

    fn sample_prices() -> PricePanel {
        prices(&[
            ("BTC", &[100.0, 104.0, 98.0, 103.0, 101.0, 107.0, 99.0, 105.0]),
            ("ETH", &[50.0, 49.0, 51.0, 52.0, 50.5, 53.0, 52.0, 54.0]),
        ])
    }

    #[test]
    fn full_run_completes_every_step() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(SqliteStore::open(dir.path().join("rp.db")).unwrap());
        let (tx, rx) = unbounded();
        let sinks = AlertSinks::none()
            .with_store(store.clone() as Arc<dyn AlertStore>)
            .with_notifier(Arc::new(ChannelNotifier::new(tx)));
        let config = PipelineConfig {
            results_dir: dir.path().join("results"),
            comparison_asset: Some("BTC".to_string()),
            ..PipelineConfig::default()
        };

        let report = RiskPipeline::new(config, Some(store.clone()), sinks).run(&sample_prices());

        assert_eq!(report.steps.len(), 5);
        assert!(report.steps.iter().all(|s| s.outcome.is_completed()), "{:?}", report.steps);

        let weights = report.weights.as_ref().unwrap();
        assert!((weights.sum() - 1.0).abs() < 1e-9);
        assert_eq!(report.portfolio.len(), 7);
        assert_eq!(report.cumulative.len(), 7);
        assert_eq!(store.fetch_portfolio_returns().unwrap(), report.portfolio);
        assert!(dir.path().join("results/portfolio_vs_btc.csv").exists());

        let stress = report.stress.as_ref().unwrap();
        assert_eq!(stress.shock_date, day(4));
        assert!(stress.total_return_impact() < 0.0);

        assert_eq!(report.rule_results.len(), 6);
        let failing = report.rule_results.iter().filter(|r| !r.passed).count();
        assert_eq!(store.fetch_alerts().unwrap().len(), failing);
        assert_eq!(rx.try_iter().count(), failing);
    }

    #[test]
    fn allocation_failure_skips_dependent_steps() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(SqliteStore::open(dir.path().join("rp.db")).unwrap());
        let config = PipelineConfig {
            comparison_asset: Some("BTC".to_string()),
            ..PipelineConfig::default()
        };
        let single_day = prices(&[("BTC", &[100.0])]);

        let report = RiskPipeline::new(config, Some(store), AlertSinks::none()).run(&single_day);

        assert!(report.outcome(PipelineStep::RiskParity).unwrap().is_failed());
        for step in [
            PipelineStep::Comparison,
            PipelineStep::PersistReturns,
            PipelineStep::StressTest,
            PipelineStep::RiskRules,
        ] {
            assert!(matches!(report.outcome(step), Some(StepOutcome::Skipped { .. })), "{step}");
        }
        assert!(report.weights.is_none());
        assert!(report.rule_results.is_empty());
    }

    #[test]
    fn missing_comparison_asset_does_not_stop_the_run() {
        let dir = tempfile::tempdir().unwrap();
        let config = PipelineConfig {
            results_dir: dir.path().to_path_buf(),
            comparison_asset: Some("SOL".to_string()),
            ..PipelineConfig::default()
        };

        let report = RiskPipeline::new(config, None, AlertSinks::none()).run(&sample_prices());

        assert!(report.outcome(PipelineStep::Comparison).unwrap().is_failed());
        assert!(matches!(
            report.outcome(PipelineStep::PersistReturns),
            Some(StepOutcome::Skipped { .. })
        ));
        assert!(report.outcome(PipelineStep::StressTest).unwrap().is_completed());
        assert!(report.outcome(PipelineStep::RiskRules).unwrap().is_completed());
        assert_eq!(report.failed_steps().count(), 1);
    }
}
