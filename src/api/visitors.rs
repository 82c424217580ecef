use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::auth::CurrentUser;
use super::error::ApiError;
use super::extract::{ApiJson, ApiQuery};
use super::validation::{page_params, parse_visit_id};
use crate::db::{Pagination, RegisterVisitRequest, Visit};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct ListVisitsQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
    pub status: Option<String>,
}

/// A visit together with a confirmation message
#[derive(Debug, Serialize)]
pub struct VisitMessage {
    pub message: &'static str,
    pub visitor: Visit,
}

#[derive(Debug, Serialize)]
pub struct VisitDetail {
    pub visitor: Visit,
}

#[derive(Debug, Serialize)]
pub struct ActiveVisits {
    pub count: usize,
    pub visitors: Vec<Visit>,
}

#[derive(Debug, Serialize)]
pub struct VisitList {
    pub visitors: Vec<Visit>,
    pub pagination: Pagination,
}

fn visit_id(raw: &str) -> Result<i64, ApiError> {
    parse_visit_id(raw).map_err(ApiError::bad_request)
}

/// Register a visitor arrival
pub async fn create_visit(
    State(state): State<Arc<AppState>>,
    current: Option<Extension<CurrentUser>>,
    ApiJson(request): ApiJson<RegisterVisitRequest>,
) -> Result<(StatusCode, Json<VisitMessage>), ApiError> {
    let acting_user = current.map(|Extension(user)| user.id);
    let visitor = state.visits.register(&request, acting_user).await?;
    Ok((
        StatusCode::CREATED,
        Json(VisitMessage {
            message: "Visitor registered",
            visitor,
        }),
    ))
}

pub async fn list_active(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ActiveVisits>, ApiError> {
    let visitors = state.visits.active().await?;
    Ok(Json(ActiveVisits {
        count: visitors.len(),
        visitors,
    }))
}

/// Paginated visit history, newest first
pub async fn list_visits(
    State(state): State<Arc<AppState>>,
    ApiQuery(query): ApiQuery<ListVisitsQuery>,
) -> Result<Json<VisitList>, ApiError> {
    let (page, limit) = page_params(query.page, query.limit);
    let result = state
        .visits
        .list_paged(page, limit, query.status.as_deref())
        .await?;
    Ok(Json(VisitList {
        visitors: result.visits,
        pagination: result.pagination,
    }))
}

pub async fn get_visit(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<VisitDetail>, ApiError> {
    let id = visit_id(&id)?;
    let visitor = state.visits.get(id).await?;
    Ok(Json(VisitDetail { visitor }))
}

pub async fn check_out_visit(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<VisitMessage>, ApiError> {
    let id = visit_id(&id)?;
    let visitor = state.visits.check_out(id).await?;
    Ok(Json(VisitMessage {
        message: "Visitor checked out",
        visitor,
    }))
}

pub async fn cancel_visit(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<VisitMessage>, ApiError> {
    let id = visit_id(&id)?;
    let visitor = state.visits.cancel(id).await?;
    Ok(Json(VisitMessage {
        message: "Visit cancelled",
        visitor,
    }))
}
