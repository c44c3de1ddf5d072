//! User-facing alerts.
//!
//! Failures the user must see (a send that did not go through, a rejected
//! form) are published here. Embedders subscribe and render them however they
//! like; nothing waits for acknowledgement.

use serde::Serialize;
use tokio::sync::broadcast;

const ALERT_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum AlertKind {
    /// Client-side validation refused the action.
    Rejected,
    /// A store write failed.
    WriteFailed,
    /// An image upload failed.
    UploadFailed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Alert {
    pub kind: AlertKind,
    pub message: String,
}

#[derive(Debug, Clone)]
pub struct Alerts {
    tx: broadcast::Sender<Alert>,
}

impl Alerts {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(ALERT_CAPACITY);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Alert> {
        self.tx.subscribe()
    }

    pub fn emit(&self, kind: AlertKind, message: impl Into<String>) {
        let alert = Alert {
            kind,
            message: message.into(),
        };
        tracing::debug!(kind = ?alert.kind, message = %alert.message, "alert");
        // No receivers is normal for headless use.
        if self.tx.send(alert).is_err() {
            tracing::trace!("alert dropped, no subscribers");
        }
    }
}

impl Default for Alerts {
    fn default() -> Self {
        Self::new()
    }
}
