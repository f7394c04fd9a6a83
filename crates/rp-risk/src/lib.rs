//! Risk metrics and rule evaluation for riskpar.
//!
//! Provides:
//! - Portfolio risk metrics (volatility, Sharpe, Sortino, max drawdown)
//! - Pure threshold predicates for the fixed rule battery
//! - A rule engine that fans failures out to injected alert sinks
//! - Mail, channel and file implementations of those sinks

pub mod alerts;
pub mod aux_log;
pub mod engine;
pub mod metrics;
pub mod notify;
pub mod rules;

pub use alerts::{RiskAlert, RiskRuleResult, RuleKind};
pub use aux_log::FileAuxLog;
pub use engine::{AlertSinks, RiskRuleEngine, RiskThresholds};
pub use notify::{notifier_from_config, ChannelNotifier, SimulatedNotifier, SmtpConfig, SmtpNotifier};
pub use rules::RuleCheck;
