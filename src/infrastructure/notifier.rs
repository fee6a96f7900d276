use crate::domain::ports::{Notification, Notifier};
use crate::error::Result;
use async_trait::async_trait;

/// Delivers notifications to the structured log.
///
/// Stands in for an e-mail or push gateway; it never fails.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

#[async_trait]
impl Notifier for TracingNotifier {
    async fn notify(&self, notification: Notification) -> Result<()> {
        tracing::info!(
            recipient = %notification.recipient,
            project_id = %notification.project_id,
            kind = ?notification.kind,
            "{}",
            notification.message
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ports::NotificationKind;
    use uuid::Uuid;

    #[tokio::test]
    async fn test_tracing_notifier_accepts_everything() {
        let notification = Notification {
            recipient: Uuid::new_v4(),
            project_id: Uuid::new_v4(),
            kind: NotificationKind::ProjectStarted,
            message: "Project started".to_string(),
        };
        assert!(TracingNotifier.notify(notification).await.is_ok());
    }
}
