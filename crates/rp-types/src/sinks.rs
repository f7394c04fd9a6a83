//! Collaborator interfaces the risk core writes to.
//!
//! Implementations live in `rp-data` (SQLite) and `rp-risk` (mail, log file,
//! channel). The core receives them as trait objects; a missing sink is a
//! configuration choice of the caller.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::SinkError;

/// A persisted alert row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertRecord {
    pub rule: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

/// Append-only alert persistence.
pub trait AlertStore: Send + Sync {
    fn record_alert(&self, alert: &AlertRecord) -> Result<(), SinkError>;
}

/// A message to deliver to operators.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub subject: String,
    pub body: String,
    /// Explicit recipients; `None` lets the notifier pick its configured default.
    pub recipients: Option<Vec<String>>,
}

/// What happened to a notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DeliveryOutcome {
    Delivered { recipients: Vec<String> },
    /// Not sent; only logged. `reason` says why the transport was not used.
    Simulated { reason: String },
}

impl DeliveryOutcome {
    pub fn is_delivered(&self) -> bool {
        matches!(self, DeliveryOutcome::Delivered { .. })
    }
}

/// Operator notification. Implementations never fail: transport errors
/// degrade to [`DeliveryOutcome::Simulated`].
pub trait Notifier: Send + Sync {
    fn notify(&self, notification: &Notification) -> DeliveryOutcome;
}

/// An observational log entry written alongside every alert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuxLogEntry {
    pub timestamp: DateTime<Utc>,
    pub title: String,
    pub message: String,
    pub metadata: serde_json::Value,
}

/// Append-only auxiliary log. Never read back by the core.
pub trait AuxLog: Send + Sync {
    fn append(&self, entry: &AuxLogEntry) -> Result<(), SinkError>;
}
