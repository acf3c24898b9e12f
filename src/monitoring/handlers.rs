//! Alert handler seam and the built-in logging handler.

use async_trait::async_trait;
use tracing::{error, info, warn};

use super::alerts::{AlertInstance, AlertRule, AlertSeverity};

/// Receives every alert that fires
///
/// Handlers run concurrently under a timeout; an `Err`, a timeout or a panic
/// is logged and never interrupts evaluation.
#[async_trait]
pub trait AlertHandler: Send + Sync {
    async fn handle(&self, alert: &AlertInstance, rule: &AlertRule) -> Result<(), String>;
}

/// Emits one `tracing` event per alert at a level matching its severity
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingAlertHandler;

#[async_trait]
impl AlertHandler for LoggingAlertHandler {
    async fn handle(&self, alert: &AlertInstance, rule: &AlertRule) -> Result<(), String> {
        match alert.severity {
            AlertSeverity::Critical => error!(
                alert_id = %alert.id,
                rule_id = %alert.rule_id,
                metric = ?rule.metric,
                value = alert.value,
                threshold = alert.threshold,
                "🚨 Critical alert fired"
            ),
            AlertSeverity::Warning => warn!(
                alert_id = %alert.id,
                rule_id = %alert.rule_id,
                metric = ?rule.metric,
                value = alert.value,
                threshold = alert.threshold,
                "⚠️ Alert fired"
            ),
            AlertSeverity::Info => info!(
                alert_id = %alert.id,
                rule_id = %alert.rule_id,
                metric = ?rule.metric,
                value = alert.value,
                threshold = alert.threshold,
                "Alert fired"
            ),
        }
        Ok(())
    }
}
