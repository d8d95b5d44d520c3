use super::extract::{ApiJson, ApiPath, ApiQuery};
use super::router::AppState;
use super::{Result, WebError};
use crate::repository::Record;
use crate::security::SYSTEM_RESOURCE;
use axum::Json;
use axum::extract::State;
use axum::http::HeaderMap;
use serde::Deserialize;
use serde_json::{Value as JsonValue, json};
use tracing::info;

#[derive(Debug, Deserialize)]
pub struct ListParams {
    pub limit: Option<usize>,
}

pub async fn health() -> Json<JsonValue> {
    Json(json!({ "status": "autorestdb running" }))
}

/// Registered collections with their columns and child tables.
pub async fn list_collections(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<JsonValue>> {
    let user = state.security.authenticate(&headers).await?;
    state.security.authorize_read(&user, SYSTEM_RESOURCE).await?;

    let collections = state.repository.collections()?;
    let body = serde_json::to_value(&collections)
        .map_err(|e| WebError::Storage(format!("Failed to serialize collections: {}", e)))?;
    Ok(Json(body))
}

/// `{"collection": "...", "documents": [...]}`: infers a schema from the
/// documents, registers the collection and inserts every document.
pub async fn upload(
    State(state): State<AppState>,
    headers: HeaderMap,
    ApiJson(payload): ApiJson<JsonValue>,
) -> Result<Json<JsonValue>> {
    let user = state.security.authenticate(&headers).await?;
    state.security.authorize_write(&user, SYSTEM_RESOURCE).await?;

    let collection = payload
        .get("collection")
        .and_then(JsonValue::as_str)
        .filter(|name| !name.is_empty())
        .ok_or_else(|| WebError::Validation("Missing 'collection'".to_string()))?;
    let documents = payload
        .get("documents")
        .and_then(JsonValue::as_array)
        .ok_or_else(|| WebError::Validation("'documents' must be a list".to_string()))?;

    let schema = state.inferer.infer(documents);
    let definition = state
        .repository
        .create_from_schema(collection, &schema)
        .await?;

    let mut inserted = 0usize;
    for document in documents.iter().filter_map(JsonValue::as_object) {
        state
            .repository
            .insert(&definition.table_name, document)
            .await?;
        inserted += 1;
    }

    info!(
        collection = %definition.table_name,
        user = user.username(),
        inserted,
        "upload complete"
    );

    Ok(Json(json!({
        "message": "Collection registered",
        "collection": collection,
        "schema": schema.to_json(),
        "inserted": inserted,
    })))
}

pub async fn list_items(
    State(state): State<AppState>,
    headers: HeaderMap,
    ApiPath(collection): ApiPath<String>,
    ApiQuery(params): ApiQuery<ListParams>,
) -> Result<Json<Vec<Record>>> {
    let user = state.security.authenticate(&headers).await?;
    state.security.authorize_read(&user, &collection).await?;

    let limit = state.limits.resolve(params.limit);
    Ok(Json(state.repository.list(&collection, limit).await?))
}

pub async fn get_item(
    State(state): State<AppState>,
    headers: HeaderMap,
    ApiPath((collection, id)): ApiPath<(String, i64)>,
) -> Result<Json<Record>> {
    let user = state.security.authenticate(&headers).await?;
    state.security.authorize_read(&user, &collection).await?;

    state
        .repository
        .get(&collection, id)
        .await?
        .map(Json)
        .ok_or_else(|| WebError::NotFound("Item not found".to_string()))
}

pub async fn create_item(
    State(state): State<AppState>,
    headers: HeaderMap,
    ApiPath(collection): ApiPath<String>,
    ApiJson(payload): ApiJson<JsonValue>,
) -> Result<Json<JsonValue>> {
    let user = state.security.authenticate(&headers).await?;
    state.security.authorize_write(&user, &collection).await?;

    let record = as_record(&payload)?;
    let id = state.repository.insert(&collection, record).await?;
    Ok(Json(json!({ "id": id })))
}

pub async fn update_item(
    State(state): State<AppState>,
    headers: HeaderMap,
    ApiPath((collection, id)): ApiPath<(String, i64)>,
    ApiJson(payload): ApiJson<JsonValue>,
) -> Result<Json<JsonValue>> {
    let user = state.security.authenticate(&headers).await?;
    state.security.authorize_write(&user, &collection).await?;

    let partial = as_record(&payload)?;
    if !state.repository.update(&collection, id, partial).await? {
        return Err(WebError::NotFound("Item not found".to_string()));
    }
    Ok(Json(json!({ "status": "updated" })))
}

pub async fn delete_item(
    State(state): State<AppState>,
    headers: HeaderMap,
    ApiPath((collection, id)): ApiPath<(String, i64)>,
) -> Result<Json<JsonValue>> {
    let user = state.security.authenticate(&headers).await?;
    state.security.authorize_delete(&user, &collection).await?;

    if !state.repository.delete(&collection, id).await? {
        return Err(WebError::NotFound("Item not found".to_string()));
    }
    Ok(Json(json!({ "status": "deleted" })))
}

fn as_record(payload: &JsonValue) -> Result<&Record> {
    payload
        .as_object()
        .ok_or_else(|| WebError::Validation("request body must be a JSON object".to_string()))
}
