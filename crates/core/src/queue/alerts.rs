//! Process-wide alerts.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;
use tracing::{error, info};

const MAX_ALERTS: usize = 200;

/// What an alert is about.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    /// The worker pool is halted until resources recover.
    ResourceExhausted,
    /// The rule store could not be read.
    ConfigurationUnavailable,
    /// A scrape run failed unrecoverably.
    ScrapeFatal,
    /// A terminal task could not be written to history.
    HistoryStore,
}

/// An alert surfaced to operators.
#[derive(Debug, Clone, Serialize)]
pub struct Alert {
    pub id: u64,
    pub kind: AlertKind,
    pub message: String,
    pub raised_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cleared_at: Option<DateTime<Utc>>,
}

impl Alert {
    pub fn is_active(&self) -> bool {
        self.cleared_at.is_none()
    }
}

/// Holds recent alerts. Raising an alert identical to an active one
/// returns the existing id.
#[derive(Default)]
pub struct AlertBoard {
    alerts: RwLock<Vec<Alert>>,
    next_id: AtomicU64,
}

impl AlertBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn raise(&self, kind: AlertKind, message: impl Into<String>) -> u64 {
        let message = message.into();
        let mut alerts = self.alerts.write().unwrap_or_else(|e| e.into_inner());

        if let Some(existing) = alerts
            .iter()
            .find(|a| a.is_active() && a.kind == kind && a.message == message)
        {
            return existing.id;
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        error!(alert_id = id, kind = ?kind, message = %message, "Alert raised");
        alerts.push(Alert {
            id,
            kind,
            message,
            raised_at: Utc::now(),
            cleared_at: None,
        });

        if alerts.len() > MAX_ALERTS {
            // Drop the oldest cleared alert first, else the oldest.
            let idx = alerts.iter().position(|a| !a.is_active()).unwrap_or(0);
            alerts.remove(idx);
        }
        id
    }

    /// Clear every active alert of a kind. Returns how many were cleared.
    pub fn clear_kind(&self, kind: AlertKind) -> usize {
        let mut alerts = self.alerts.write().unwrap_or_else(|e| e.into_inner());
        let now = Utc::now();
        let mut cleared = 0;
        for alert in alerts.iter_mut().filter(|a| a.is_active() && a.kind == kind) {
            alert.cleared_at = Some(now);
            cleared += 1;
        }
        if cleared > 0 {
            info!(kind = ?kind, cleared, "Alerts cleared");
        }
        cleared
    }

    /// Clear one alert by id.
    pub fn clear(&self, id: u64) -> bool {
        let mut alerts = self.alerts.write().unwrap_or_else(|e| e.into_inner());
        match alerts.iter_mut().find(|a| a.id == id && a.is_active()) {
            Some(alert) => {
                alert.cleared_at = Some(Utc::now());
                true
            }
            None => false,
        }
    }

    pub fn active(&self) -> Vec<Alert> {
        self.all().into_iter().filter(|a| a.is_active()).collect()
    }

    pub fn all(&self) -> Vec<Alert> {
        self.alerts
            .read()
            .map(|a| a.clone())
            .unwrap_or_else(|e| e.into_inner().clone())
    }

    pub fn has_active(&self, kind: AlertKind) -> bool {
        self.active().iter().any(|a| a.kind == kind)
    }
}
