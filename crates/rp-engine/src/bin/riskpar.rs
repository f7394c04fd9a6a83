use std::sync::Arc;

use anyhow::Context;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use rp_data::{PriceLoader, SqliteStore};
use rp_engine::{PersistStatus, PipelineConfig, RiskPipeline, StepOutcome, StrategyRunner, StressSimulator};
use rp_risk::{notifier_from_config, AlertSinks, FileAuxLog};
use rp_types::AlertStore;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = PipelineConfig::load().context("loading pipeline configuration")?;
    info!(
        prices = %config.prices_path.display(),
        database = %config.database_path.display(),
        smtp = config.smtp.is_some(),
        "riskpar starting"
    );

    let store = match SqliteStore::open(&config.database_path) {
        Ok(store) => Some(Arc::new(store)),
        Err(e) => {
            warn!(error = %e, "Database unavailable; runs and alerts will not be persisted");
            None
        }
    };

    if let Some(parent) = config.aux_log_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating aux log directory {}", parent.display()))?;
    }
    let mut sinks = AlertSinks::none()
        .with_notifier(notifier_from_config(config.smtp.clone()))
        .with_aux_log(Arc::new(FileAuxLog::new(&config.aux_log_path)));
    if let Some(store) = &store {
        sinks = sinks.with_store(store.clone() as Arc<dyn AlertStore>);
    }

    let loader = PriceLoader::new();
    let loaded = loader
        .load_csv_file(&config.prices_path)
        .with_context(|| format!("loading prices from {}", config.prices_path.display()))?;
    if loaded.dates_synthesized {
        warn!("Price file has no date column; using sequential daily dates");
    }

    let strategies = config.parsed_strategies()?;
    let runner = StrategyRunner::new(config.workers, loader, store.clone())?;
    for result in runner.run_all(&config.prices_path, &strategies) {
        match result {
            Ok(run) => {
                let stored = match &run.persist {
                    PersistStatus::Stored { id } => format!("stored as #{id}"),
                    PersistStatus::Failed(e) => format!("not stored: {e}"),
                    PersistStatus::Skipped => "not stored".to_string(),
                };
                info!(
                    strategy = %run.strategy,
                    total_return = run.total_return(),
                    volatility = ?run.volatility(),
                    %stored,
                    "Strategy result"
                );
            }
            Err(e) => warn!(error = %e, "Strategy failed"),
        }
    }

    for (name, scenario) in StressSimulator::builtin_scenarios()? {
        match StressSimulator::simulate_scenario(name, &scenario) {
            Ok(outcome) => info!(scenario = name, mean_return = ?outcome.mean_return, "Scenario result"),
            Err(e) => warn!(scenario = name, error = %e, "Scenario failed"),
        }
    }

    let pipeline = RiskPipeline::new(config, store, sinks);
    let report = pipeline.run(&loaded.panel);

    for step in &report.steps {
        match &step.outcome {
            StepOutcome::Completed { detail } => info!(step = %step.step, %detail, "done"),
            StepOutcome::Failed { error } => warn!(step = %step.step, %error, "failed"),
            StepOutcome::Skipped { reason } => info!(step = %step.step, %reason, "skipped"),
        }
    }
    for rule in &report.rule_results {
        info!(rule = %rule.rule, passed = rule.passed, message = %rule.message, "Rule");
    }

    let failed = report.failed_steps().count();
    info!(steps = report.steps.len(), failed, "riskpar finished");
    Ok(())
}
