//! Post-commit notification dispatch.
//!
//! Services collect [`Notification`]s while a transaction is open and hand
//! them to the [`NotificationDispatcher`] only after commit. Delivery runs on
//! background tasks; failures are logged and counted, never propagated back
//! into the already committed operation.

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::task::JoinSet;
use tripdesk_core::NotifyError;
use tripdesk_core::notify::{Notification, Notifier};

use crate::metrics::EngineMetrics;

/// Fires notifications on background tasks.
#[derive(Clone)]
pub struct NotificationDispatcher {
    notifier: Arc<dyn Notifier>,
    tasks: Arc<Mutex<JoinSet<()>>>,
}

impl NotificationDispatcher {
    /// Dispatcher delivering through `notifier`.
    #[must_use]
    pub fn new(notifier: Arc<dyn Notifier>) -> Self {
        Self {
            notifier,
            tasks: Arc::new(Mutex::new(JoinSet::new())),
        }
    }

    /// Spawn one delivery task per notification.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn dispatch(&self, notifications: Vec<Notification>) {
        if notifications.is_empty() {
            return;
        }

        let mut tasks = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);
        // Reap finished deliveries so the set does not grow without bound.
        while tasks.try_join_next().is_some() {}

        for notification in notifications {
            let notifier = Arc::clone(&self.notifier);
            tasks.spawn(async move {
                let template = notification.template.as_str();
                let recipients = notification.recipients.len();
                match notifier.notify(notification).await {
                    Ok(()) => tracing::debug!(template, recipients, "Notification delivered"),
                    Err(error) => {
                        EngineMetrics::notification_failed(template);
                        tracing::warn!(template, recipients, %error, "Notification delivery failed");
                    }
                }
            });
        }
    }

    /// Wait until every dispatched notification has finished.
    ///
    /// Used on shutdown and in tests.
    pub async fn drain(&self) {
        loop {
            let mut pending = {
                let mut tasks = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);
                std::mem::take(&mut *tasks)
            };
            if pending.is_empty() {
                return;
            }
            while let Some(joined) = pending.join_next().await {
                if let Err(error) = joined {
                    tracing::error!(%error, "Notification task panicked");
                }
            }
        }
    }
}

impl std::fmt::Debug for NotificationDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationDispatcher").finish_non_exhaustive()
    }
}

/// Notifier that only logs; the default when no delivery backend is wired.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(
        &self,
        notification: Notification,
    ) -> Pin<Box<dyn Future<Output = Result<(), NotifyError>> + Send + '_>> {
        Box::pin(async move {
            tracing::info!(
                template = notification.template.as_str(),
                recipients = ?notification.recipients,
                content = %notification.content,
                "Notification"
            );
            Ok(())
        })
    }
}
