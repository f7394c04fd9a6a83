use thiserror::Error;

/// Main error type for riskpar
#[derive(Error, Debug)]
pub enum RpError {
    #[error("Data error: {0}")]
    Data(#[from] DataError),

    #[error("Allocation error: {0}")]
    Allocation(#[from] AllocationError),

    #[error("Rule error: {0}")]
    Rule(#[from] RuleError),

    #[error("Sink error: {0}")]
    Sink(#[from] SinkError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Data-related errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DataError {
    #[error("Missing required column '{column}' (found: {found:?})")]
    MissingColumn { column: String, found: Vec<String> },

    #[error("Price panel is empty")]
    EmptyPanel,

    #[error("Insufficient data for {asset}: {observations} observation(s), need at least {required}")]
    InsufficientData {
        asset: String,
        observations: usize,
        required: usize,
    },

    #[error("Duplicate observation for {asset} at {date}")]
    DuplicateObservation { asset: String, date: String },

    #[error("Invalid price for {asset} at {date}: {price}")]
    InvalidPrice {
        asset: String,
        date: String,
        price: f64,
    },

    #[error("Asset not found: {asset}")]
    AssetNotFound { asset: String },

    #[error("Data loading failed: {message}")]
    LoadingFailed { message: String },

    #[error("Data parsing error: {message}")]
    ParseError { message: String },
}

/// Allocation-related errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AllocationError {
    #[error("Cannot allocate over an empty asset set")]
    EmptyAssetSet,

    #[error("Unknown allocation strategy: {name}")]
    UnknownStrategy { name: String },
}

/// Errors raised while computing a single risk rule's metric
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RuleError {
    #[error("{rule}: no returns to evaluate")]
    EmptyReturns { rule: String },

    #[error("{rule}: need at least {required} observations, got {observations}")]
    InsufficientObservations {
        rule: String,
        observations: usize,
        required: usize,
    },

    #[error("Weight vector is empty")]
    EmptyWeights,

    #[error("Invalid weight for {asset}: {weight}")]
    InvalidWeight { asset: String, weight: f64 },
}

/// Failures reported by external sinks (persistence, mail, aux log)
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SinkError {
    #[error("Persistence failed: {message}")]
    Persistence { message: String },

    #[error("Notification failed: {message}")]
    Notification { message: String },

    #[error("Aux log write failed: {message}")]
    AuxLog { message: String },
}

/// Result type alias for riskpar operations
pub type RpResult<T> = Result<T, RpError>;

/// Macro for creating configuration errors
#[macro_export]
macro_rules! config_error {
    ($($arg:tt)*) => {
        $crate::RpError::Config(format!($($arg)*))
    };
}
