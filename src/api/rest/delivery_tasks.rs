use std::sync::Arc;

use axum::Json;
use axum::Router;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::routing::{get, post};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;
use crate::geo::eligible;
use crate::models::delivery_task::{DeliveryStatus, DeliveryTask};
use crate::models::profile::Role;
use crate::state::AppState;
use crate::store::TaskFilter;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/delivery-tasks", post(create_task).get(list_tasks))
        .route("/delivery-tasks/accept", post(accept_task))
        .route("/delivery-tasks/status", post(update_task_status))
        .route("/delivery-tasks/:id", get(get_task))
        .route("/riders/:id/available-tasks", get(available_tasks))
        .route("/routes/:payment_reference", get(get_route))
}

#[derive(Deserialize)]
pub struct CreateTaskRequest {
    pub order_id: Uuid,
    pub vendor_id: Uuid,
    pub payment_reference: Option<String>,
    pub vendor_location: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AcceptTaskRequest {
    pub delivery_task_id: Option<String>,
    pub rider_id: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateStatusRequest {
    pub delivery_task_id: Option<String>,
    pub new_status: Option<String>,
    pub rider_id: Option<String>,
}

#[derive(Deserialize)]
pub struct ListTasksQuery {
    pub status: Option<DeliveryStatus>,
    pub rider_id: Option<Uuid>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AcceptedTaskView {
    pub id: Uuid,
    pub order_id: Uuid,
    pub status: DeliveryStatus,
    pub rider_id: Option<Uuid>,
    pub pickup_sequence: Option<u32>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AcceptTaskResponse {
    pub success: bool,
    pub message: String,
    pub delivery_task: AcceptedTaskView,
    pub total_stops: usize,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdatedTaskView {
    pub id: Uuid,
    pub order_id: Uuid,
    pub status: DeliveryStatus,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateStatusResponse {
    pub success: bool,
    pub message: String,
    pub delivery_task: UpdatedTaskView,
}

#[derive(Serialize)]
pub struct RouteView {
    pub payment_reference: String,
    pub total_stops: usize,
    pub picked_up: usize,
    pub tasks: Vec<DeliveryTask>,
}

fn required(value: Option<String>, message: &str) -> Result<String, AppError> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| AppError::BadRequest(message.to_string()))
}

fn parse_id(raw: &str, field: &str) -> Result<Uuid, AppError> {
    Uuid::parse_str(raw)
        .map_err(|_| AppError::BadRequest(format!("{field} is not a valid id: {raw}")))
}

async fn create_task(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<CreateTaskRequest>, JsonRejection>,
) -> Result<Json<DeliveryTask>, AppError> {
    let Json(payload) = payload?;
    let vendor = state
        .profiles
        .get(payload.vendor_id)
        .await?
        .filter(|profile| profile.role == Role::Vendor)
        .ok_or_else(|| AppError::NotFound(format!("vendor {} not found", payload.vendor_id)))?;

    let vendor_location = payload
        .vendor_location
        .filter(|l| !l.trim().is_empty())
        .or(vendor.location);
    let task = DeliveryTask::new(
        payload.order_id,
        payload.vendor_id,
        payload.payment_reference,
        vendor_location,
    );

    let task = state.tasks.insert(task).await?;
    tracing::info!(
        task_id = %task.id,
        order_id = %task.order_id,
        vendor_id = %task.vendor_id,
        "delivery task created"
    );
    Ok(Json(task))
}

async fn list_tasks(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListTasksQuery>,
) -> Result<Json<Vec<DeliveryTask>>, AppError> {
    let filter = TaskFilter {
        status: query.status,
        rider_id: query.rider_id,
        unclaimed_only: false,
    };
    Ok(Json(state.tasks.list(&filter).await?))
}

async fn get_task(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<DeliveryTask>, AppError> {
    let task = state
        .tasks
        .get(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("delivery task {} not found", id)))?;

    Ok(Json(task))
}

async fn accept_task(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<AcceptTaskRequest>, JsonRejection>,
) -> Result<Json<AcceptTaskResponse>, AppError> {
    const MISSING: &str = "deliveryTaskId and riderId are required";
    let Json(payload) = payload?;
    let task_id = required(payload.delivery_task_id, MISSING)?;
    let rider_id = required(payload.rider_id, MISSING)?;
    let task_id = parse_id(&task_id, "deliveryTaskId")?;
    let rider_id = parse_id(&rider_id, "riderId")?;

    let accepted = state.dispatcher.accept_task(task_id, rider_id).await?;

    let message = if accepted.is_grouped {
        format!(
            "Route accepted: {} of {} stops assigned to you. Pick up in sequence starting with stop 1.",
            accepted.assigned.len(),
            accepted.total_stops
        )
    } else {
        "Delivery task accepted".to_string()
    };

    Ok(Json(AcceptTaskResponse {
        success: true,
        message,
        delivery_task: AcceptedTaskView {
            id: accepted.task.id,
            order_id: accepted.task.order_id,
            status: accepted.task.status,
            rider_id: accepted.task.rider_id,
            pickup_sequence: accepted.task.pickup_sequence,
        },
        total_stops: accepted.total_stops,
    }))
}

async fn update_task_status(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<UpdateStatusRequest>, JsonRejection>,
) -> Result<Json<UpdateStatusResponse>, AppError> {
    const MISSING: &str = "deliveryTaskId, newStatus and riderId are required";
    let Json(payload) = payload?;
    let task_id = required(payload.delivery_task_id, MISSING)?;
    let new_status = required(payload.new_status, MISSING)?;
    let rider_id = required(payload.rider_id, MISSING)?;
    let task_id = parse_id(&task_id, "deliveryTaskId")?;
    let rider_id = parse_id(&rider_id, "riderId")?;

    let updated = state
        .dispatcher
        .update_status(task_id, rider_id, &new_status)
        .await?;

    let message = match updated.stop_label() {
        Some(label) => format!("Delivery task marked as {} ({label})", updated.task.status),
        None => format!("Delivery task marked as {}", updated.task.status),
    };

    Ok(Json(UpdateStatusResponse {
        success: true,
        message,
        delivery_task: UpdatedTaskView {
            id: updated.task.id,
            order_id: updated.task.order_id,
            status: updated.task.status,
        },
    }))
}

async fn available_tasks(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<DeliveryTask>>, AppError> {
    let rider = state
        .profiles
        .get(id)
        .await?
        .filter(|profile| profile.is_rider())
        .ok_or_else(|| AppError::NotFound(format!("rider {} not found", id)))?;

    let filter = TaskFilter {
        unclaimed_only: true,
        ..TaskFilter::default()
    };
    let tasks = state
        .tasks
        .list(&filter)
        .await?
        .into_iter()
        .filter(|task| eligible(rider.location.as_deref(), task.vendor_location.as_deref()))
        .collect();

    Ok(Json(tasks))
}

async fn get_route(
    State(state): State<Arc<AppState>>,
    Path(payment_reference): Path<String>,
) -> Result<Json<RouteView>, AppError> {
    let tasks = state.tasks.by_payment_reference(&payment_reference).await?;
    if tasks.is_empty() {
        return Err(AppError::NotFound(format!(
            "route {} not found",
            payment_reference
        )));
    }

    Ok(Json(RouteView {
        total_stops: tasks.len(),
        picked_up: tasks.iter().filter(|t| t.status.is_picked_up()).count(),
        payment_reference,
        tasks,
    }))
}
