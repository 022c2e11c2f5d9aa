use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;

use crate::{
    error::AppResult,
    models::{DeviceId, RecipientId, Subscription},
    AppState,
};

#[derive(Debug, Deserialize)]
pub struct SubscribeRequest {
    pub recipient_id: RecipientId,
    pub login: String,
    pub password: String,
}

pub async fn subscribe(
    State(state): State<AppState>,
    Json(req): Json<SubscribeRequest>,
) -> AppResult<(StatusCode, Json<Subscription>)> {
    let subscription = state
        .subscriptions
        .subscribe(req.recipient_id, &req.login, &req.password)
        .await?;

    Ok((StatusCode::CREATED, Json(subscription)))
}

pub async fn get_subscription(
    State(state): State<AppState>,
    Path(recipient_id): Path<RecipientId>,
) -> AppResult<Json<Subscription>> {
    let subscription = state.subscriptions.subscription(recipient_id).await?;
    Ok(Json(subscription))
}

pub async fn get_devices(
    State(state): State<AppState>,
    Path(recipient_id): Path<RecipientId>,
) -> AppResult<Json<Vec<DeviceId>>> {
    let subscription = state.subscriptions.subscription(recipient_id).await?;
    Ok(Json(subscription.device_ids))
}

pub async fn unsubscribe(
    State(state): State<AppState>,
    Path(recipient_id): Path<RecipientId>,
) -> AppResult<StatusCode> {
    state.subscriptions.unsubscribe(recipient_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
