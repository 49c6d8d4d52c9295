use axum::{
    Json,
    extract::{Path, State, rejection::JsonRejection},
    http::StatusCode,
    response::Html,
};
use serde_json::{Value, json};
use std::sync::Arc;

use super::{ApiError, store::RouteStore};
use crate::{
    model::{CreateRouteRequest, DeleteStopRequest, Route, RouteId, SaveRouteRequest, Stop},
    render,
};

type Store = State<Arc<RouteStore>>;

fn route_id(id: &str) -> Result<RouteId, ApiError> {
    RouteId::new(id).ok_or(ApiError::NotFound)
}

pub async fn index(State(store): Store) -> Html<String> {
    Html(render::index_page(&store.list().await))
}

pub async fn route_page(State(store): Store, Path(id): Path<String>) -> Result<Html<String>, ApiError> {
    let route = store.get(&route_id(&id)?).await.ok_or(ApiError::NotFound)?;

    Ok(Html(render::route_page(&route)))
}

pub async fn get_route(State(store): Store, Path(id): Path<String>) -> Result<Json<Route>, ApiError> {
    let route = store.get(&route_id(&id)?).await.ok_or(ApiError::NotFound)?;

    Ok(Json(route))
}

/// Autosave target: replaces every stop of the route.
pub async fn save_route(
    State(store): Store,
    Path(id): Path<String>,
    payload: Result<Json<SaveRouteRequest>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let route_id = route_id(&id)?;
    let Json(request) = payload.map_err(|rejection| match rejection {
        JsonRejection::JsonDataError(_) => ApiError::BadRequest("stops must be list"),
        _ => ApiError::BadRequest("no json"),
    })?;

    store
        .replace_stops(&route_id, request.title, request.stops)
        .await?;

    Ok(Json(json!({ "ok": true })))
}

pub async fn create_route(
    State(store): Store,
    payload: Result<Json<CreateRouteRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let Json(request) = payload.map_err(|_| ApiError::BadRequest("title required"))?;

    let title = request
        .title
        .filter(|title| !title.trim().is_empty())
        .ok_or(ApiError::BadRequest("title required"))?;

    let id = request
        .id
        .as_deref()
        .and_then(RouteId::new)
        .or_else(|| RouteId::from_title(&title))
        .ok_or(ApiError::BadRequest("title required"))?;

    let id = store.create(id, title, request.stops).await?;

    Ok((StatusCode::CREATED, Json(json!({ "ok": true, "id": id }))))
}

pub async fn add_stop(
    State(store): Store,
    Path(id): Path<String>,
    payload: Result<Json<Stop>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let route_id = route_id(&id)?;
    let Json(stop) = payload.map_err(|_| ApiError::BadRequest("missing json"))?;

    store.add_stop(&route_id, stop).await?;

    Ok(Json(json!({ "ok": true })))
}

pub async fn delete_stop(
    State(store): Store,
    Path(id): Path<String>,
    payload: Result<Json<DeleteStopRequest>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let route_id = route_id(&id)?;
    let Json(request) = payload.map_err(|_| ApiError::BadRequest("bad index"))?;
    let index = request.index.ok_or(ApiError::BadRequest("index required"))?;

    store.delete_stop(&route_id, index).await?;

    Ok(Json(json!({ "ok": true })))
}
