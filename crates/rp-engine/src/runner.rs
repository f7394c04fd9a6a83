//! Concurrent strategy runs on a fixed worker pool.
//!
//! Each task loads the prices itself, allocates, computes the portfolio's
//! expected return and volatility and persists one run record. Tasks share
//! nothing mutable; the store serializes its own writers.

use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use serde::Serialize;
use tracing::{error, info, warn};

use rp_data::{PriceLoader, SqliteStore};
use rp_types::{AssetRunStats, PortfolioRunRecord, RpError, RpResult, SinkError, WeightVector};

use crate::allocation::AllocationStrategy;
use crate::returns::ReturnsEngine;

/// Where a run record ended up.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum PersistStatus {
    Stored { id: i64 },
    #[serde(serialize_with = "serialize_sink_error")]
    Failed(SinkError),
    /// No store configured.
    Skipped,
}

fn serialize_sink_error<S: serde::Serializer>(error: &SinkError, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&error.to_string())
}

/// Outcome of one strategy task.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StrategyRun {
    pub strategy: AllocationStrategy,
    pub weights: WeightVector,
    pub record: PortfolioRunRecord,
    pub persist: PersistStatus,
}

impl StrategyRun {
    pub fn total_return(&self) -> f64 {
        self.record.total_return
    }

    pub fn volatility(&self) -> Option<f64> {
        self.record.volatility
    }
}

pub struct StrategyRunner {
    pool: ThreadPool,
    loader: PriceLoader,
    store: Option<Arc<SqliteStore>>,
}

impl StrategyRunner {
    pub fn new(workers: usize, loader: PriceLoader, store: Option<Arc<SqliteStore>>) -> RpResult<Self> {
        let pool = ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("riskpar-strategy-{i}"))
            .build()
            .map_err(|e| RpError::Internal(format!("failed to build strategy pool: {e}")))?;
        Ok(Self { pool, loader, store })
    }

    pub fn workers(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// Runs every strategy on the pool. Results come back in `strategies`
    /// order; a failing task does not affect the others.
    pub fn run_all(&self, prices_path: &Path, strategies: &[AllocationStrategy]) -> Vec<RpResult<StrategyRun>> {
        info!(
            strategies = strategies.len(),
            workers = self.workers(),
            path = %prices_path.display(),
            "Running allocation strategies"
        );
        self.pool.install(|| {
            strategies
                .par_iter()
                .map(|strategy| {
                    let result = self.run_strategy(prices_path, *strategy);
                    if let Err(e) = &result {
                        error!(strategy = strategy.name(), error = %e, "Strategy run failed");
                    }
                    result
                })
                .collect()
        })
    }

    pub fn run_strategy(&self, prices_path: &Path, strategy: AllocationStrategy) -> RpResult<StrategyRun> {
        let loaded = self.loader.load_csv_file(prices_path)?;
        let returns = ReturnsEngine::returns_from_prices(&loaded.panel)?;
        let stats = ReturnsEngine::summary_stats(&returns)?;

        let assets: Vec<String> = returns.assets().map(str::to_string).collect();
        let weights = strategy.allocate(&assets, &returns)?;

        let total_return = ReturnsEngine::portfolio_return(&weights, &stats.mean);
        let volatility = ReturnsEngine::portfolio_volatility(&weights, &stats.covariance);
        if volatility.is_none() {
            warn!(
                strategy = strategy.name(),
                "Portfolio volatility undefined: weighted assets share fewer than two return dates"
            );
        }

        let record = PortfolioRunRecord {
            name: strategy.name().to_string(),
            date_run: Utc::now(),
            total_return,
            volatility,
            assets: assets
                .iter()
                .map(|asset| AssetRunStats {
                    asset: asset.clone(),
                    weight: weights.get(asset),
                    mean_return: stats.mean.get(asset).copied().unwrap_or(0.0),
                    variance: stats.variance.get(asset).copied().flatten(),
                })
                .collect(),
        };

        let persist = match &self.store {
            Some(store) => match store.store_portfolio(&record) {
                Ok(id) => PersistStatus::Stored { id },
                Err(e) => {
                    warn!(strategy = strategy.name(), error = %e, "Failed to persist strategy run");
                    PersistStatus::Failed(e)
                }
            },
            None => PersistStatus::Skipped,
        };

        info!(
            strategy = strategy.name(),
            total_return,
            volatility = ?volatility,
            "Strategy run complete"
        );

        Ok(StrategyRun {
            strategy,
            weights,
            record,
            persist,
        })
    }
}
