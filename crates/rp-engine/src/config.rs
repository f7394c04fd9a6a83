//! Pipeline configuration.
//!
//! Loaded from the JSON file named by `RISKPAR_CONFIG` (defaults otherwise),
//! then overridden by `RISKPAR_PRICES`, `RISKPAR_DB` and the SMTP variables.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use rp_risk::{RiskThresholds, SmtpConfig};
use rp_types::{config_error, AllocationError, RpResult};

use crate::allocation::{AllocationStrategy, DEFAULT_RISK_PARITY_WINDOW};

pub const CONFIG_ENV: &str = "RISKPAR_CONFIG";
pub const PRICES_ENV: &str = "RISKPAR_PRICES";
pub const DATABASE_ENV: &str = "RISKPAR_DB";

/// Per-user data directory for the database and the aux log.
pub fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("riskpar")
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub prices_path: PathBuf,
    pub database_path: PathBuf,
    pub aux_log_path: PathBuf,
    /// Directory for exported comparison CSVs.
    pub results_dir: PathBuf,
    /// Asset the portfolio is compared against after the risk-parity step.
    pub comparison_asset: Option<String>,
    pub risk_parity_window: usize,
    /// Shock applied to every asset from the midpoint date.
    pub stress_shock: f64,
    /// Strategy keys for the concurrent strategy run.
    pub strategies: Vec<String>,
    pub workers: usize,
    pub thresholds: RiskThresholds,
    pub smtp: Option<SmtpConfig>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        let data_dir = default_data_dir();
        Self {
            prices_path: PathBuf::from("data/prices.csv"),
            database_path: data_dir.join("riskpar.db"),
            aux_log_path: data_dir.join("ai_alerts.log"),
            results_dir: PathBuf::from("results"),
            comparison_asset: None,
            risk_parity_window: DEFAULT_RISK_PARITY_WINDOW,
            stress_shock: -0.20,
            strategies: vec!["equal".into(), "rule".into(), "performance".into()],
            workers: 3,
            thresholds: RiskThresholds::default(),
            smtp: None,
        }
    }
}

impl PipelineConfig {
    /// File from `RISKPAR_CONFIG` if set, then environment overrides.
    pub fn load() -> RpResult<Self> {
        let mut config = match std::env::var(CONFIG_ENV) {
            Ok(path) => Self::from_json_file(&path)?,
            Err(_) => {
                debug!("{CONFIG_ENV} not set; using default configuration");
                Self::default()
            }
        };
        config.apply_env_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> RpResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let config: PipelineConfig = serde_json::from_str(&text)?;
        info!(path = %path.display(), "Loaded pipeline configuration");
        Ok(config)
    }

    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(path) = lookup(PRICES_ENV) {
            self.prices_path = PathBuf::from(path);
        }
        if let Some(path) = lookup(DATABASE_ENV) {
            self.database_path = PathBuf::from(path);
        }
        if let Some(smtp) = SmtpConfig::from_lookup(&lookup) {
            self.smtp = Some(smtp);
        }
    }

    pub fn validate(&self) -> RpResult<()> {
        if self.workers == 0 {
            return Err(config_error!("workers must be at least 1"));
        }
        if self.risk_parity_window < 2 {
            return Err(config_error!(
                "risk_parity_window must be at least 2, got {}",
                self.risk_parity_window
            ));
        }
        if !self.stress_shock.is_finite() || self.stress_shock < -1.0 {
            return Err(config_error!(
                "stress_shock must be a finite value >= -1.0, got {}",
                self.stress_shock
            ));
        }
        self.parsed_strategies()?;
        Ok(())
    }

    /// Strategy keys parsed in configured order.
    pub fn parsed_strategies(&self) -> Result<Vec<AllocationStrategy>, AllocationError> {
        self.strategies
            .iter()
            .map(|key| match key.parse::<AllocationStrategy>()? {
                AllocationStrategy::RiskParity { .. } => Ok(AllocationStrategy::RiskParity {
                    window: self.risk_parity_window,
                }),
                other => Ok(other),
            })
            .collect()
    }
}
