use std::sync::Arc;

use axum::Json;
use axum::Router;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::routing::{get, post};
use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::profile::{Profile, Role};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/profiles", post(create_profile))
        .route("/profiles/:id", get(get_profile))
}

#[derive(Deserialize)]
pub struct CreateProfileRequest {
    pub name: String,
    pub role: Role,
    pub location: Option<String>,
}

async fn create_profile(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<CreateProfileRequest>, JsonRejection>,
) -> Result<Json<Profile>, AppError> {
    let Json(payload) = payload?;
    if payload.name.trim().is_empty() {
        return Err(AppError::BadRequest("name cannot be empty".to_string()));
    }

    let profile = Profile {
        id: Uuid::new_v4(),
        name: payload.name,
        role: payload.role,
        location: payload.location.filter(|l| !l.is_empty()),
        created_at: Utc::now(),
    };

    Ok(Json(state.profiles.insert(profile).await?))
}

async fn get_profile(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Profile>, AppError> {
    let profile = state
        .profiles
        .get(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("profile {} not found", id)))?;

    Ok(Json(profile))
}
