//! riskpar engine: returns, allocation strategies, portfolio aggregation,
//! stress testing, the concurrent strategy runner and the end-to-end
//! pipeline.

pub mod aggregator;
pub mod allocation;
pub mod config;
pub mod pipeline;
pub mod returns;
pub mod runner;
pub mod stress;

pub use aggregator::{ComparisonPoint, ComparisonSeries, PortfolioAggregator};
pub use allocation::{AllocationEngine, AllocationStrategy, DEFAULT_RISK_PARITY_WINDOW};
pub use config::PipelineConfig;
pub use pipeline::{PipelineReport, PipelineStep, RiskPipeline, StepOutcome, StepReport};
pub use returns::ReturnsEngine;
pub use runner::{PersistStatus, StrategyRun, StrategyRunner};
pub use stress::{ScenarioOutcome, SeriesSummary, ShockMap, StressReport, StressSimulator};
