//! Operator notification sinks.
//!
//! [`SmtpNotifier`] sends mail over STARTTLS and degrades to a logged
//! simulation on any failure. [`SimulatedNotifier`] only logs.
//! [`ChannelNotifier`] forwards notifications on a crossbeam channel.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use crossbeam_channel::Sender;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use rp_types::{config_error, DeliveryOutcome, Notification, Notifier, RpResult};

const SMTP_TIMEOUT: Duration = Duration::from_secs(15);

fn default_smtp_host() -> String {
    "smtp.gmail.com".to_string()
}

fn default_smtp_port() -> u16 {
    587
}

/// SMTP credentials and routing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SmtpConfig {
    #[serde(default = "default_smtp_host")]
    pub smtp_host: String,
    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,
    #[serde(alias = "email")]
    pub smtp_user: String,
    #[serde(alias = "password")]
    pub smtp_pass: String,
    /// Comma-separated default recipients.
    #[serde(default)]
    pub alert_to: Option<String>,
}

impl SmtpConfig {
    /// Reads `SMTP_HOST`, `SMTP_PORT`, `SMTP_USER`, `SMTP_PASS` and the
    /// optional `ALERT_TO`. All four connection variables must be set.
    pub fn from_env() -> Option<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`SmtpConfig::from_env`] over an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Option<Self> {
        let smtp_host = lookup("SMTP_HOST")?;
        let smtp_port = match lookup("SMTP_PORT")?.trim().parse() {
            Ok(port) => port,
            Err(_) => {
                warn!("SMTP_PORT is not a valid port number; ignoring SMTP environment");
                return None;
            }
        };
        let smtp_user = lookup("SMTP_USER")?;
        let smtp_pass = lookup("SMTP_PASS")?;
        Some(Self {
            smtp_host,
            smtp_port,
            smtp_user,
            smtp_pass,
            alert_to: lookup("ALERT_TO"),
        })
    }

    /// Loads a JSON file. Accepts `email`/`password` for the credentials.
    pub fn from_json_file(path: impl AsRef<Path>) -> RpResult<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        let config: SmtpConfig = serde_json::from_str(&text)?;
        if config.smtp_user.trim().is_empty() || config.smtp_pass.is_empty() {
            return Err(config_error!(
                "SMTP credentials missing in {}",
                path.as_ref().display()
            ));
        }
        Ok(config)
    }

    /// Explicit recipients win, then `alert_to`, then the SMTP user.
    pub fn resolve_recipients(&self, explicit: Option<&[String]>) -> Vec<String> {
        if let Some(list) = explicit.filter(|l| !l.is_empty()) {
            return list.to_vec();
        }
        let configured: Vec<String> = self
            .alert_to
            .as_deref()
            .unwrap_or("")
            .split(',')
            .map(str::trim)
            .filter(|a| !a.is_empty())
            .map(str::to_string)
            .collect();
        if configured.is_empty() {
            vec![self.smtp_user.clone()]
        } else {
            configured
        }
    }
}

/// Mail notifier. Never fails; transport errors become
/// [`DeliveryOutcome::Simulated`].
pub struct SmtpNotifier {
    config: SmtpConfig,
}

impl SmtpNotifier {
    pub fn new(config: SmtpConfig) -> Self {
        Self { config }
    }

    fn build_message(&self, notification: &Notification, recipients: &[String]) -> Result<Message, String> {
        let from: Mailbox = self.config.smtp_user.parse().map_err(|e| format!("invalid sender: {e}"))?;
        let mut builder = Message::builder().from(from).subject(notification.subject.as_str());
        for recipient in recipients {
            let to: Mailbox = recipient
                .parse()
                .map_err(|e| format!("invalid recipient {recipient}: {e}"))?;
            builder = builder.to(to);
        }
        let body = format!(
            "{}\n\nSent at: {}Z",
            notification.body,
            Utc::now().format("%Y-%m-%dT%H:%M:%S%.6f")
        );
        builder
            .header(ContentType::TEXT_PLAIN)
            .body(body)
            .map_err(|e| e.to_string())
    }

    fn send(&self, message: &Message) -> Result<(), String> {
        let transport = SmtpTransport::starttls_relay(&self.config.smtp_host)
            .map_err(|e| e.to_string())?
            .port(self.config.smtp_port)
            .credentials(Credentials::new(
                self.config.smtp_user.clone(),
                self.config.smtp_pass.clone(),
            ))
            .timeout(Some(SMTP_TIMEOUT))
            .build();
        transport.send(message).map(|_| ()).map_err(|e| e.to_string())
    }
}

impl Notifier for SmtpNotifier {
    fn notify(&self, notification: &Notification) -> DeliveryOutcome {
        let recipients = self.config.resolve_recipients(notification.recipients.as_deref());
        let result = self
            .build_message(notification, &recipients)
            .and_then(|message| self.send(&message));

        match result {
            Ok(()) => {
                info!(subject = %notification.subject, ?recipients, "Alert email sent");
                DeliveryOutcome::Delivered { recipients }
            }
            Err(reason) => {
                warn!(subject = %notification.subject, error = %reason, "Email failed, simulating instead");
                log_simulated(notification, &recipients);
                DeliveryOutcome::Simulated { reason }
            }
        }
    }
}

/// Logs notifications without sending them.
#[derive(Debug, Default, Clone)]
pub struct SimulatedNotifier;

impl Notifier for SimulatedNotifier {
    fn notify(&self, notification: &Notification) -> DeliveryOutcome {
        let recipients = notification.recipients.clone().unwrap_or_default();
        log_simulated(notification, &recipients);
        DeliveryOutcome::Simulated {
            reason: "no SMTP configuration".to_string(),
        }
    }
}

fn log_simulated(notification: &Notification, recipients: &[String]) {
    info!(
        subject = %notification.subject,
        body = %notification.body,
        ?recipients,
        "send_alert (simulation)"
    );
}

/// Forwards every notification on a channel.
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
    tx: Sender<Notification>,
}

impl ChannelNotifier {
    pub fn new(tx: Sender<Notification>) -> Self {
        Self { tx }
    }
}

impl Notifier for ChannelNotifier {
    fn notify(&self, notification: &Notification) -> DeliveryOutcome {
        match self.tx.try_send(notification.clone()) {
            Ok(()) => DeliveryOutcome::Delivered {
                recipients: notification.recipients.clone().unwrap_or_default(),
            },
            Err(e) => DeliveryOutcome::Simulated {
                reason: format!("notification channel unavailable: {e}"),
            },
        }
    }
}

/// SMTP when configured, simulation otherwise.
pub fn notifier_from_config(config: Option<SmtpConfig>) -> Arc<dyn Notifier> {
    match config {
        Some(config) => Arc::new(SmtpNotifier::new(config)),
        None => Arc::new(SimulatedNotifier),
    }
}
