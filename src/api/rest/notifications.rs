use std::sync::Arc;

use axum::Json;
use axum::Router;
use axum::extract::{Path, State};
use axum::routing::get;
use uuid::Uuid;

use crate::models::notification::Notification;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/notifications/:recipient_id", get(list_notifications))
}

async fn list_notifications(
    State(state): State<Arc<AppState>>,
    Path(recipient_id): Path<Uuid>,
) -> Json<Vec<Notification>> {
    Json(state.notifications.feed(recipient_id))
}
