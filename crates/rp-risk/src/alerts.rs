//! Rule identities, alert payloads and per-rule results.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use rp_types::{AlertRecord, AuxLogEntry, Notification, RuleError, SinkError};

/// The fixed battery of risk rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleKind {
    Volatility,
    Sharpe,
    MaxDrawdown,
    Sortino,
    /// Placeholder; always passes.
    Beta,
    MaxAssetWeight,
}

impl RuleKind {
    /// Rules in the order `run_all_rules` evaluates them.
    pub const ALL: [RuleKind; 6] = [
        RuleKind::Volatility,
        RuleKind::Sharpe,
        RuleKind::MaxDrawdown,
        RuleKind::Sortino,
        RuleKind::Beta,
        RuleKind::MaxAssetWeight,
    ];

    /// Stable identifier used in stored alerts and aux-log metadata.
    pub fn as_str(&self) -> &'static str {
        match self {
            RuleKind::Volatility => "volatility",
            RuleKind::Sharpe => "sharpe",
            RuleKind::MaxDrawdown => "max_drawdown",
            RuleKind::Sortino => "sortino",
            RuleKind::Beta => "beta",
            RuleKind::MaxAssetWeight => "max_asset_weight",
        }
    }

    /// Display label used in reports.
    pub fn label(&self) -> &'static str {
        match self {
            RuleKind::Volatility => "Volatility",
            RuleKind::Sharpe => "Sharpe",
            RuleKind::MaxDrawdown => "Max Drawdown",
            RuleKind::Sortino => "Sortino",
            RuleKind::Beta => "Beta",
            RuleKind::MaxAssetWeight => "Max Asset Weight",
        }
    }
}

impl fmt::Display for RuleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failed rule, ready to be fanned out to the alert sinks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskAlert {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub rule: RuleKind,
    pub message: String,
    pub metric: Option<f64>,
    /// Offending asset, only set by `max_asset_weight`.
    pub asset: Option<String>,
}

impl RiskAlert {
    pub fn new(rule: RuleKind, message: String, metric: Option<f64>, asset: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            rule,
            message,
            metric,
            asset,
        }
    }

    pub fn to_record(&self) -> AlertRecord {
        AlertRecord {
            rule: self.rule.as_str().to_string(),
            message: self.message.clone(),
            timestamp: self.timestamp,
        }
    }

    pub fn to_notification(&self) -> Notification {
        Notification {
            subject: format!("Risk Alert: {}", self.rule.as_str()),
            body: self.message.clone(),
            recipients: None,
        }
    }

    pub fn to_aux_entry(&self) -> AuxLogEntry {
        let metadata = match &self.asset {
            Some(asset) => json!({ "rule": self.rule.as_str(), "asset": asset }),
            None => json!({ "rule": self.rule.as_str() }),
        };
        AuxLogEntry {
            timestamp: self.timestamp,
            title: self.rule.as_str().to_string(),
            message: self.message.clone(),
            metadata,
        }
    }
}

/// Outcome of evaluating one rule.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RiskRuleResult {
    pub rule: RuleKind,
    pub passed: bool,
    pub message: String,
    pub metric: Option<f64>,
    /// Set when the metric could not be computed; the rule then fails closed.
    #[serde(skip)]
    pub error: Option<RuleError>,
    /// Sinks that rejected the alert for this rule.
    #[serde(skip)]
    pub sink_failures: Vec<SinkError>,
}

impl RiskRuleResult {
    pub fn is_alerting(&self) -> bool {
        !self.passed
    }
}
