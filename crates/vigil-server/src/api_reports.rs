//! Report endpoints: the event emitter's invocation points.
//!
//! Report handling proper (listing, filtering, statistics, media evidence)
//! belongs to the reporting service; the two endpoints here exist because
//! they are where domain events originate — creating a report and changing
//! its status both end in a notification to the report's owner.

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::Json,
};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use uuid::Uuid;
use vigil_types::{Priority, ReportStatus, Role};

use crate::error::{envelope, ApiError};
use crate::events::{report_created, report_status_changed, status_trigger, ReportEvent};
use crate::middleware::AuthContext;
use crate::AppState;

/// Maximum length for a report category.
const MAX_CATEGORY_LEN: usize = 128;
/// Maximum length for a report description.
const MAX_DESCRIPTION_LEN: usize = 4096;

/// A stored report.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Report {
    pub id: String,
    pub owner_user_id: String,
    pub category: String,
    pub description: String,
    pub status: ReportStatus,
    pub priority: Priority,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateReportRequest {
    pub category: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub priority: Option<Priority>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: String,
}

/// POST /api/reports
///
/// Persists the report, then raises the `report_created` event for the
/// owner — the notification receipt is stored and pushed before this
/// returns, but its failure never fails the request.
pub async fn create_report_handler(
    Extension(state): Extension<Arc<AppState>>,
    Extension(AuthContext(user)): Extension<AuthContext>,
    Json(payload): Json<CreateReportRequest>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    if payload.category.trim().is_empty() {
        return Err(ApiError::Validation("category is required".to_string()));
    }
    if payload.category.len() > MAX_CATEGORY_LEN {
        return Err(ApiError::Validation("category is too long".to_string()));
    }
    if payload.description.len() > MAX_DESCRIPTION_LEN {
        return Err(ApiError::Validation("description is too long".to_string()));
    }

    let id = Uuid::new_v4().to_string();
    let priority = payload.priority.unwrap_or(Priority::Medium);

    let state_clone = state.clone();
    let owner_id = user.id.clone();
    let report = tokio::task::spawn_blocking(move || {
        let conn = state_clone
            .pool
            .get()
            .map_err(|e| ApiError::internal("failed to get db connection for create_report", e))?;
        conn.query_row(
            "INSERT INTO reports (id, owner_user_id, category, description, priority)
             VALUES (?1, ?2, ?3, ?4, ?5)
             RETURNING id, owner_user_id, category, description, status, priority,
                       created_at, updated_at",
            params![
                id,
                owner_id,
                payload.category,
                payload.description,
                priority.as_str(),
            ],
            map_row_to_report,
        )
        .map_err(|e| ApiError::internal("failed to insert report", e))
    })
    .await
    .map_err(|e| ApiError::internal("create_report task join error", e))??;

    report_created(
        &state,
        ReportEvent {
            report_id: report.id.clone(),
            owner_user_id: report.owner_user_id.clone(),
            category: report.category.clone(),
        },
    )
    .await;

    Ok((StatusCode::CREATED, envelope(serde_json::to_value(report)?)))
}

/// PATCH /api/reports/:id/status (officer only)
///
/// One conditional UPDATE moves the status; the owner is then notified
/// through the emitter with the status's trigger string.
pub async fn update_report_status_handler(
    Extension(state): Extension<Arc<AppState>>,
    Extension(AuthContext(user)): Extension<AuthContext>,
    Path(id): Path<String>,
    Json(payload): Json<UpdateStatusRequest>,
) -> Result<Json<Value>, ApiError> {
    if user.role != Role::Officer {
        return Err(ApiError::Forbidden(
            "only officers can update report status".to_string(),
        ));
    }

    let status: ReportStatus = payload
        .status
        .parse()
        .map_err(|_| ApiError::Validation(format!("unknown status: {}", payload.status)))?;

    let state_clone = state.clone();
    let report_id = id.clone();
    let report = tokio::task::spawn_blocking(move || {
        let conn = state_clone
            .pool
            .get()
            .map_err(|e| ApiError::internal("failed to get db connection for update_status", e))?;
        conn.query_row(
            "UPDATE reports SET status = ?1, updated_at = datetime('now')
             WHERE id = ?2
             RETURNING id, owner_user_id, category, description, status, priority,
                       created_at, updated_at",
            params![status.as_str(), report_id],
            map_row_to_report,
        )
        .optional()
        .map_err(|e| ApiError::internal("failed to update report status", e))
    })
    .await
    .map_err(|e| ApiError::internal("update_status task join error", e))??
    .ok_or_else(|| ApiError::NotFound("report not found".to_string()))?;

    report_status_changed(
        &state,
        ReportEvent {
            report_id: report.id.clone(),
            owner_user_id: report.owner_user_id.clone(),
            category: report.category.clone(),
        },
        status_trigger(status),
    )
    .await;

    Ok(envelope(serde_json::to_value(report)?))
}

fn map_row_to_report(row: &Row) -> rusqlite::Result<Report> {
    let status_str: String = row.get(4)?;
    let status: ReportStatus = status_str.parse().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(4, rusqlite::types::Type::Text, Box::new(e))
    })?;

    let priority_str: String = row.get(5)?;
    let priority: Priority = priority_str.parse().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(5, rusqlite::types::Type::Text, Box::new(e))
    })?;

    Ok(Report {
        id: row.get(0)?,
        owner_user_id: row.get(1)?,
        category: row.get(2)?,
        description: row.get(3)?,
        status,
        priority,
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
    })
}

/// Loads a report row by id.
pub fn get_report(conn: &Connection, id: &str) -> Result<Option<Report>, rusqlite::Error> {
    conn.query_row(
        "SELECT id, owner_user_id, category, description, status, priority,
                created_at, updated_at
         FROM reports WHERE id = ?1",
        [id],
        map_row_to_report,
    )
    .optional()
}
