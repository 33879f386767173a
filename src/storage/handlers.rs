use super::protocol::*;
use super::proxy::MapProxy;
use crate::error::{GridError, GridResult};
use crate::node::GridNode;

use axum::{
    Json,
    extract::{Extension, Query},
    http::StatusCode,
};
use std::sync::Arc;
use std::time::Duration;

type JsonMap = MapProxy<serde_json::Value>;

pub async fn handle_map_put(
    Extension(node): Extension<Arc<GridNode>>,
    Json(req): Json<PutRequest>,
) -> (StatusCode, Json<MapResponse>) {
    let map = JsonMap::new(node, req.name);
    let ttl = req.ttl_ms.map(Duration::from_millis);
    respond("put", map.put_with_ttl(&req.key, &req.value, ttl).await)
}

pub async fn handle_map_get(
    Extension(node): Extension<Arc<GridNode>>,
    Query(query): Query<KeyQuery>,
) -> (StatusCode, Json<MapResponse>) {
    let key: serde_json::Value = match serde_json::from_str(&query.key) {
        Ok(key) => key,
        Err(e) => return respond("get", Err(GridError::from(e))),
    };
    let map = JsonMap::new(node, query.name);
    respond("get", map.get(&key).await)
}

pub async fn handle_map_remove(
    Extension(node): Extension<Arc<GridNode>>,
    Json(req): Json<KeyRequest>,
) -> (StatusCode, Json<MapResponse>) {
    let map = JsonMap::new(node, req.name);
    respond("remove", map.remove(&req.key).await)
}

pub async fn handle_map_expiry(
    Extension(node): Extension<Arc<GridNode>>,
    Json(req): Json<ExpiryRequest>,
) -> (StatusCode, Json<MapResponse>) {
    let map = JsonMap::new(node, req.name);
    let ttl = req.ttl_ms.map(Duration::from_millis);
    let result = map
        .set_expiry_policy(&req.keys, ttl)
        .await
        .map(|updated| Some(serde_json::Value::Bool(updated)));
    respond("set expiry policy", result)
}

fn respond(
    action: &str,
    result: GridResult<Option<serde_json::Value>>,
) -> (StatusCode, Json<MapResponse>) {
    match result {
        Ok(value) => (
            StatusCode::OK,
            Json(MapResponse {
                success: true,
                value,
                error: None,
            }),
        ),
        Err(e) => {
            tracing::error!("Map {} failed: {}", action, e);
            let status = match e {
                GridError::InvalidArgument { .. } | GridError::Serialization { .. } => {
                    StatusCode::BAD_REQUEST
                }
                GridError::CallTimeout { .. } => StatusCode::GATEWAY_TIMEOUT,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            };
            (
                status,
                Json(MapResponse {
                    success: false,
                    value: None,
                    error: Some(e.to_string()),
                }),
            )
        }
    }
}
