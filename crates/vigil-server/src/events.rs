//! Domain event emitter: turns report triggers into notifications.
//!
//! Each handler builds a notification record, persists it through the
//! notification store, and then asks the realtime channel to push it to
//! the owner's room. The two failure modes are deliberately asymmetric: a
//! persistence failure aborts the handler (nothing to deliver), while a
//! delivery failure is swallowed inside the channel — the stored record
//! remains retrievable either way. Neither failure ever reaches the
//! domain action that raised the event.

use vigil_notify::{create_notification, CreateNotificationParams};
use vigil_types::{NotificationKind, ReportStatus};

use crate::realtime::OutgoingEvent;
use crate::AppState;

/// The slice of a report the emitter needs. Upstream objects may be
/// malformed, so the owner is validated rather than trusted.
#[derive(Debug, Clone)]
pub struct ReportEvent {
    pub report_id: String,
    pub owner_user_id: String,
    pub category: String,
}

/// Called when a new report is created.
pub async fn report_created(state: &AppState, report: ReportEvent) {
    if report.owner_user_id.is_empty() {
        tracing::warn!(report_id = %report.report_id, "report has no owning user, skipping notification");
        return;
    }

    let message = format!("New report submitted: {}", report.category);
    persist_and_deliver(state, report, message, NotificationKind::NewReport).await;
}

/// Called when a report's status changes.
///
/// `new_status` is the raw trigger string; unknown values get the generic
/// fallback message rather than an error, so new statuses never break
/// notification delivery.
pub async fn report_status_changed(state: &AppState, report: ReportEvent, new_status: &str) {
    if report.owner_user_id.is_empty() {
        tracing::warn!(report_id = %report.report_id, "report has no owning user, skipping notification");
        return;
    }

    let message = status_message(new_status).to_string();
    persist_and_deliver(state, report, message, NotificationKind::StatusUpdate).await;
}

/// Maps known status triggers to their fixed messages.
fn status_message(new_status: &str) -> &'static str {
    match new_status {
        "pending" => "Your report is pending review",
        "in_progress" => "Your report is being processed",
        "resolved" => "Your report has been resolved",
        "rejected" => "Your report has been reviewed",
        _ => "Your report status has been updated",
    }
}

/// Renders a report status as the emitter's trigger vocabulary.
pub fn status_trigger(status: ReportStatus) -> &'static str {
    match status {
        ReportStatus::Submitted => "submitted",
        ReportStatus::UnderReview => "under_review",
        ReportStatus::InProgress => "in_progress",
        ReportStatus::ActionTaken => "action_taken",
        ReportStatus::Resolved => "resolved",
    }
}

/// Persists the notification, then pushes it to the owner's room.
async fn persist_and_deliver(
    state: &AppState,
    report: ReportEvent,
    message: String,
    kind: NotificationKind,
) {
    let owner = report.owner_user_id.clone();
    let params = CreateNotificationParams {
        user_id: report.owner_user_id,
        report_id: report.report_id,
        message,
        kind,
    };

    let pool = state.pool.clone();
    let result = tokio::task::spawn_blocking(move || {
        let conn = pool.get().map_err(|e| e.to_string())?;
        create_notification(&conn, &params).map_err(|e| e.to_string())
    })
    .await;

    let notification = match result {
        Ok(Ok(notification)) => notification,
        Ok(Err(e)) => {
            tracing::error!(user_id = %owner, "failed to persist notification: {}", e);
            return;
        }
        Err(e) => {
            tracing::error!(user_id = %owner, "notification persist task failed: {}", e);
            return;
        }
    };

    tracing::info!(
        user_id = %owner,
        notification_id = %notification.id,
        kind = %notification.kind,
        "notification stored"
    );

    state
        .realtime
        .deliver(&owner, &OutgoingEvent::Notification(notification))
        .await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_statuses_have_fixed_messages() {
        assert_eq!(status_message("pending"), "Your report is pending review");
        assert_eq!(status_message("in_progress"), "Your report is being processed");
        assert_eq!(status_message("resolved"), "Your report has been resolved");
        assert_eq!(status_message("rejected"), "Your report has been reviewed");
    }

    #[test]
    fn unknown_status_falls_back_to_generic_message() {
        for status in ["escalated", "", "RESOLVED", "submitted"] {
            assert_eq!(
                status_message(status),
                "Your report status has been updated",
                "status {status:?}"
            );
        }
    }

    #[test]
    fn status_trigger_matches_map_where_defined() {
        assert_eq!(status_trigger(ReportStatus::Resolved), "resolved");
        assert_eq!(status_trigger(ReportStatus::InProgress), "in_progress");
        // Statuses outside the trigger map take the generic fallback
        assert_eq!(
            status_message(status_trigger(ReportStatus::ActionTaken)),
            "Your report status has been updated"
        );
    }
}
