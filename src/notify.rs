//! Administrator notifications
//!
//! The engine does not deliver messages itself. It resolves the active
//! administrators through an [`AdminDirectory`] and hands one notification per
//! recipient to a [`NotificationDispatcher`]. A failed delivery is logged and
//! never blocks the other recipients or the flow that raised it.

use async_trait::async_trait;
use chrono::Utc;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

use crate::storage::{AuxCollection, ResultStore};

// ============================================================================
// Accounts
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    User,
    Admin,
    SuperAdmin,
}

/// An account that may receive engine notifications
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdminAccount {
    pub id: String,
    pub role: Role,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

impl AdminAccount {
    pub fn new(id: impl Into<String>, role: Role) -> Self {
        Self {
            id: id.into(),
            role,
            active: true,
        }
    }

    /// Active ADMIN or SUPER_ADMIN
    pub fn receives_alerts(&self) -> bool {
        self.active && matches!(self.role, Role::Admin | Role::SuperAdmin)
    }
}

// ============================================================================
// Notifications
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    HealthAlert,
    SystemCritical,
    RemediationSucceeded,
    RemediationFailed,
    HealthReport,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    Normal,
    High,
    Urgent,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    pub priority: Priority,
    /// Structured payload for the delivery layer
    #[serde(default)]
    pub data: serde_json::Value,
    pub channels: Vec<String>,
}

impl Notification {
    pub fn new(
        kind: NotificationKind,
        priority: Priority,
        title: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            title: title.into(),
            message: message.into(),
            priority,
            data: serde_json::Value::Null,
            channels: Vec::new(),
        }
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = data;
        self
    }

    pub fn with_channels(mut self, channels: Vec<String>) -> Self {
        self.channels = channels;
        self
    }
}

/// Errors raised by notification collaborators
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("admin directory unavailable: {0}")]
    Directory(String),
    #[error("delivery to '{user}' failed: {message}")]
    Delivery { user: String, message: String },
}

// ============================================================================
// Collaborators
// ============================================================================

/// Delivers one notification to one user
#[async_trait]
pub trait NotificationDispatcher: Send + Sync {
    async fn send_to_user(&self, user_id: &str, notification: &Notification) -> Result<(), NotifyError>;
}

/// Lists accounts that may receive notifications
pub trait AdminDirectory: Send + Sync {
    fn accounts(&self) -> Result<Vec<AdminAccount>, NotifyError>;
}

/// Fixed roster, usually the `administrators` table of the engine config
#[derive(Debug, Clone, Default)]
pub struct StaticDirectory {
    accounts: Vec<AdminAccount>,
}

impl StaticDirectory {
    pub fn new(accounts: Vec<AdminAccount>) -> Self {
        Self { accounts }
    }
}

impl AdminDirectory for StaticDirectory {
    fn accounts(&self) -> Result<Vec<AdminAccount>, NotifyError> {
        Ok(self.accounts.clone())
    }
}

/// Logs every notification and records it in the `notifications` collection
pub struct LoggingDispatcher {
    store: Arc<dyn ResultStore>,
}

impl LoggingDispatcher {
    pub fn new(store: Arc<dyn ResultStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl NotificationDispatcher for LoggingDispatcher {
    async fn send_to_user(&self, user_id: &str, notification: &Notification) -> Result<(), NotifyError> {
        info!(
            user = %user_id,
            kind = ?notification.kind,
            priority = ?notification.priority,
            title = %notification.title,
            "Notification"
        );
        let entry = serde_json::json!({
            "user_id": user_id,
            "notification": notification,
        });
        self.store
            .record_auxiliary(AuxCollection::Notifications, Utc::now(), &entry)
            .map_err(|e| NotifyError::Delivery {
                user: user_id.to_string(),
                message: e.to_string(),
            })
    }
}

// ============================================================================
// Fan-out
// ============================================================================

/// Sends a notification to every active administrator
#[derive(Clone)]
pub struct Notifier {
    directory: Arc<dyn AdminDirectory>,
    dispatcher: Arc<dyn NotificationDispatcher>,
}

impl Notifier {
    pub fn new(directory: Arc<dyn AdminDirectory>, dispatcher: Arc<dyn NotificationDispatcher>) -> Self {
        Self {
            directory,
            dispatcher,
        }
    }

    /// Deliver to every recipient concurrently. Returns how many deliveries
    /// succeeded; failures are logged per recipient.
    pub async fn notify_admins(&self, notification: &Notification) -> usize {
        let recipients: Vec<AdminAccount> = match self.directory.accounts() {
            Ok(accounts) => accounts.into_iter().filter(AdminAccount::receives_alerts).collect(),
            Err(e) => {
                warn!(error = %e, title = %notification.title, "Cannot resolve administrators, notification dropped");
                return 0;
            }
        };

        if recipients.is_empty() {
            warn!(title = %notification.title, "No active administrators to notify");
            return 0;
        }

        let deliveries = recipients.iter().map(|admin| async move {
            match self.dispatcher.send_to_user(&admin.id, notification).await {
                Ok(()) => true,
                Err(e) => {
                    warn!(user = %admin.id, error = %e, "Notification delivery failed");
                    false
                }
            }
        });

        join_all(deliveries).await.into_iter().filter(|ok| *ok).count()
    }
}
