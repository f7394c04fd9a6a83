//! Risk rule engine: evaluates the rule battery and fans failures out to the
//! injected alert sinks.
//!
//! Every failing rule produces one [`RiskAlert`] that is persisted, notified
//! and appended to the aux log. A passing rule has no side effects. Sink
//! failures are logged and returned in the rule's [`RiskRuleResult`].

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use rp_types::{AlertStore, AuxLog, DeliveryOutcome, Notifier, PortfolioReturnSeries, RuleError, SinkError, WeightVector};

use crate::alerts::{RiskAlert, RiskRuleResult, RuleKind};
use crate::rules::{self, RuleCheck};

/// Thresholds for every rule that has one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskThresholds {
    /// Fails when volatility is above.
    pub max_volatility: f64,
    /// Fails when Sharpe is below.
    pub min_sharpe: f64,
    /// Fails when Sortino is below.
    pub min_sortino: f64,
    /// Fails when the max drawdown (a non-positive number) is below.
    pub max_drawdown: f64,
    /// Fails when any single weight is above.
    pub max_asset_weight: f64,
}

impl Default for RiskThresholds {
    fn default() -> Self {
        Self {
            max_volatility: 0.5,
            min_sharpe: 0.5,
            min_sortino: 0.5,
            max_drawdown: -0.2,
            max_asset_weight: 0.4,
        }
    }
}

/// The collaborators a failing rule writes to. Absent sinks are skipped.
#[derive(Clone, Default)]
pub struct AlertSinks {
    pub store: Option<Arc<dyn AlertStore>>,
    pub notifier: Option<Arc<dyn Notifier>>,
    pub aux_log: Option<Arc<dyn AuxLog>>,
}

impl AlertSinks {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn with_store(mut self, store: Arc<dyn AlertStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn with_aux_log(mut self, aux_log: Arc<dyn AuxLog>) -> Self {
        self.aux_log = Some(aux_log);
        self
    }
}

/// Evaluates risk rules against a return series and a weight vector.
pub struct RiskRuleEngine {
    thresholds: RiskThresholds,
    sinks: AlertSinks,
}

impl RiskRuleEngine {
    pub fn new(thresholds: RiskThresholds, sinks: AlertSinks) -> Self {
        Self { thresholds, sinks }
    }

    pub fn thresholds(&self) -> &RiskThresholds {
        &self.thresholds
    }

    pub fn rule_volatility(&self, returns: &[f64], threshold: f64) -> RiskRuleResult {
        self.finish(RuleKind::Volatility, rules::check_volatility(returns, threshold))
    }

    pub fn rule_sharpe(&self, returns: &[f64], min_sharpe: f64) -> RiskRuleResult {
        self.finish(RuleKind::Sharpe, rules::check_sharpe(returns, min_sharpe))
    }

    pub fn rule_sortino(&self, returns: &[f64], min_sortino: f64) -> RiskRuleResult {
        self.finish(RuleKind::Sortino, rules::check_sortino(returns, min_sortino))
    }

    pub fn rule_max_drawdown(&self, cumulative: &[f64], threshold: f64) -> RiskRuleResult {
        self.finish(RuleKind::MaxDrawdown, rules::check_max_drawdown(cumulative, threshold))
    }

    pub fn rule_beta(&self) -> RiskRuleResult {
        self.finish(RuleKind::Beta, rules::check_beta())
    }

    pub fn rule_max_asset_weight(&self, weights: &WeightVector, max_weight: f64) -> RiskRuleResult {
        self.finish(
            RuleKind::MaxAssetWeight,
            rules::check_max_asset_weight(weights, max_weight),
        )
    }

    /// Runs the full battery with the configured thresholds.
    ///
    /// Always returns one result per rule in [`RuleKind::ALL`] order.
    pub fn run_all_rules(&self, returns: &[f64], cumulative: &[f64], weights: &WeightVector) -> Vec<RiskRuleResult> {
        let t = &self.thresholds;
        let results: Vec<RiskRuleResult> = RuleKind::ALL
            .iter()
            .map(|rule| match rule {
                RuleKind::Volatility => self.rule_volatility(returns, t.max_volatility),
                RuleKind::Sharpe => self.rule_sharpe(returns, t.min_sharpe),
                RuleKind::MaxDrawdown => self.rule_max_drawdown(cumulative, t.max_drawdown),
                RuleKind::Sortino => self.rule_sortino(returns, t.min_sortino),
                RuleKind::Beta => self.rule_beta(),
                RuleKind::MaxAssetWeight => self.rule_max_asset_weight(weights, t.max_asset_weight),
            })
            .collect();

        let failed = results.iter().filter(|r| !r.passed).count();
        info!(rules = results.len(), failed, "Risk rules evaluated");
        results
    }

    /// Convenience wrapper deriving the cumulative path from the series.
    pub fn evaluate_portfolio(&self, series: &PortfolioReturnSeries, weights: &WeightVector) -> Vec<RiskRuleResult> {
        let returns = series.values();
        let cumulative = series.cumulative().values();
        self.run_all_rules(&returns, &cumulative, weights)
    }

    fn finish(&self, rule: RuleKind, check: Result<RuleCheck, RuleError>) -> RiskRuleResult {
        let (check, error) = match check {
            Ok(check) => (check, None),
            Err(err) => {
                warn!(rule = rule.as_str(), error = %err, "Risk metric could not be computed");
                let check = RuleCheck {
                    passed: false,
                    message: format!("{} could not be evaluated: {err}", rule.label()),
                    metric: None,
                    asset: None,
                };
                (check, Some(err))
            }
        };

        let sink_failures = if check.passed {
            debug!(rule = rule.as_str(), message = %check.message, "Risk rule passed");
            Vec::new()
        } else {
            self.emit(RiskAlert::new(rule, check.message.clone(), check.metric, check.asset.clone()))
        };

        RiskRuleResult {
            rule,
            passed: check.passed,
            message: check.message,
            metric: check.metric,
            error,
            sink_failures,
        }
    }

    fn emit(&self, alert: RiskAlert) -> Vec<SinkError> {
        warn!(rule = alert.rule.as_str(), %alert.message, "RISK ALERT");
        let mut failures = Vec::new();

        if let Some(store) = &self.sinks.store {
            if let Err(e) = store.record_alert(&alert.to_record()) {
                warn!(rule = alert.rule.as_str(), error = %e, "Alert persistence failed");
                failures.push(e);
            }
        }

        if let Some(notifier) = &self.sinks.notifier {
            if let DeliveryOutcome::Simulated { reason } = notifier.notify(&alert.to_notification()) {
                debug!(rule = alert.rule.as_str(), %reason, "Alert notification simulated");
            }
        }

        if let Some(aux_log) = &self.sinks.aux_log {
            if let Err(e) = aux_log.append(&alert.to_aux_entry()) {
                warn!(rule = alert.rule.as_str(), error = %e, "Aux log append failed");
                failures.push(e);
            }
        }

        failures
    }
}
