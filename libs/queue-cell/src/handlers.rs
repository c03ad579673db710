// libs/queue-cell/src/handlers.rs
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    Extension, Json,
};
use serde_json::{json, Value};
use uuid::Uuid;

use shared_models::auth::User;
use shared_models::error::AppError;
use shared_utils::extractor::provider_id;

use crate::models::{CallNextRequest, QueueQuery, SessionRequest, UpdateQueueStatusRequest};
use crate::services::QueueController;

pub type QueueState = Arc<QueueController>;

/// GET /queue?date=YYYY-MM-DD
pub async fn get_queue_handler(
    State(controller): State<QueueState>,
    Extension(user): Extension<User>,
    Query(query): Query<QueueQuery>,
) -> Result<Json<Value>, AppError> {
    let provider = provider_id(&user)?;
    let snapshot = controller.get_queue(provider, query.date).await?;
    Ok(Json(json!({ "success": true, "data": snapshot })))
}

/// POST /queue/call-next
pub async fn call_next_handler(
    State(controller): State<QueueState>,
    Extension(user): Extension<User>,
    Json(request): Json<CallNextRequest>,
) -> Result<Json<Value>, AppError> {
    let provider = provider_id(&user)?;
    let outcome = controller
        .call_next(provider, request.session_id, request.appointment_id)
        .await?;
    Ok(Json(json!({ "success": true, "data": outcome })))
}

/// PATCH /queue/{appointment_id}/skip
pub async fn skip_handler(
    State(controller): State<QueueState>,
    Extension(user): Extension<User>,
    Path(appointment_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let provider = provider_id(&user)?;
    let outcome = controller.skip(provider, appointment_id).await?;
    Ok(Json(json!({
        "success": true,
        "message": format!(
            "Moved token {} to position {}",
            outcome.old_token_number, outcome.new_token_number
        ),
        "data": outcome,
    })))
}

/// PATCH /queue/{appointment_id}/recall
pub async fn recall_handler(
    State(controller): State<QueueState>,
    Extension(user): Extension<User>,
    Path(appointment_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let provider = provider_id(&user)?;
    let outcome = controller.recall(provider, appointment_id).await?;
    Ok(Json(json!({ "success": true, "data": outcome })))
}

/// PATCH /queue/{appointment_id}/no-show
pub async fn no_show_handler(
    State(controller): State<QueueState>,
    Extension(user): Extension<User>,
    Path(appointment_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let provider = provider_id(&user)?;
    let outcome = controller.mark_no_show(provider, appointment_id).await?;
    Ok(Json(json!({ "success": true, "data": outcome })))
}

/// PATCH /queue/{appointment_id}/status
pub async fn update_queue_status_handler(
    State(controller): State<QueueState>,
    Extension(user): Extension<User>,
    Path(appointment_id): Path<Uuid>,
    Json(request): Json<UpdateQueueStatusRequest>,
) -> Result<Json<Value>, AppError> {
    let provider = provider_id(&user)?;
    let appointment = controller
        .update_queue_status(provider, appointment_id, request.status)
        .await?;
    Ok(Json(json!({ "success": true, "data": appointment })))
}

/// GET /queue/{appointment_id}/eta
pub async fn get_eta_handler(
    State(controller): State<QueueState>,
    Extension(user): Extension<User>,
    Path(appointment_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let provider = provider_id(&user)?;
    let eta = controller.get_eta(provider, appointment_id).await?;
    Ok(Json(json!({ "success": true, "data": eta })))
}

/// POST /queue/pause
pub async fn pause_handler(
    State(controller): State<QueueState>,
    Extension(user): Extension<User>,
    Json(request): Json<SessionRequest>,
) -> Result<Json<Value>, AppError> {
    let provider = provider_id(&user)?;
    let session = controller.pause(provider, request.session_id).await?;
    Ok(Json(json!({ "success": true, "data": session })))
}

/// POST /queue/resume
pub async fn resume_handler(
    State(controller): State<QueueState>,
    Extension(user): Extension<User>,
    Json(request): Json<SessionRequest>,
) -> Result<Json<Value>, AppError> {
    let provider = provider_id(&user)?;
    let session = controller.resume(provider, request.session_id).await?;
    Ok(Json(json!({ "success": true, "data": session })))
}
