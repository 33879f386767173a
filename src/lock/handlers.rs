use super::protocol::*;
use super::proxy::LockProxy;
use crate::error::GridError;
use crate::node::GridNode;

use axum::{
    Json,
    extract::{Extension, Query},
    http::StatusCode,
};
use std::sync::Arc;
use std::time::Duration;

pub async fn handle_lock_acquire(
    Extension(node): Extension<Arc<GridNode>>,
    Json(req): Json<LockRequest>,
) -> (StatusCode, Json<LockResponse>) {
    let proxy = LockProxy::for_session(node, req.name, req.session);
    let ttl = req.ttl_ms.map(Duration::from_millis);

    let result = match (req.timeout_ms, ttl) {
        (Some(timeout), Some(ttl)) => {
            proxy
                .try_lock_with_lease(&req.key, Duration::from_millis(timeout), ttl)
                .await
        }
        (Some(timeout), None) => {
            proxy
                .try_lock_with_timeout(&req.key, Duration::from_millis(timeout))
                .await
        }
        (None, Some(ttl)) => proxy.lock_with_ttl(&req.key, ttl).await.map(|_| true),
        (None, None) => proxy.lock(&req.key).await.map(|_| true),
    };

    match result {
        Ok(acquired) => {
            tracing::debug!("Lock {} acquire by {}: {}", proxy.name(), req.session, acquired);
            ok(acquired)
        }
        Err(e) => failed("acquire", e),
    }
}

pub async fn handle_lock_release(
    Extension(node): Extension<Arc<GridNode>>,
    Json(req): Json<LockRequest>,
) -> (StatusCode, Json<LockResponse>) {
    let proxy = LockProxy::for_session(node, req.name, req.session);
    match proxy.unlock(&req.key).await {
        Ok(()) => ok(true),
        Err(e) => failed("release", e),
    }
}

pub async fn handle_lock_force_unlock(
    Extension(node): Extension<Arc<GridNode>>,
    Json(req): Json<LockRequest>,
) -> (StatusCode, Json<LockResponse>) {
    let proxy = LockProxy::for_session(node, req.name, req.session);
    match proxy.force_unlock(&req.key).await {
        Ok(()) => ok(true),
        Err(e) => failed("force unlock", e),
    }
}

pub async fn handle_lock_status(
    Extension(node): Extension<Arc<GridNode>>,
    Query(query): Query<LockStatusQuery>,
) -> (StatusCode, Json<Option<LockStatusResponse>>) {
    let key: serde_json::Value = match serde_json::from_str(&query.key) {
        Ok(key) => key,
        Err(e) => {
            tracing::error!("Failed to parse lock key: {}", e);
            return (StatusCode::BAD_REQUEST, Json(None));
        }
    };

    let proxy = match query.session {
        Some(session) => LockProxy::for_session(node, query.name, session),
        None => LockProxy::new(node, query.name),
    };

    let locked = match proxy.is_locked(&key).await {
        Ok(locked) => locked,
        Err(e) => {
            tracing::error!("Lock status failed: {}", e);
            return (status_of(&e), Json(None));
        }
    };
    let locked_by_session = match query.session {
        Some(_) => match proxy.is_locked_by_me(&key).await {
            Ok(mine) => Some(mine),
            Err(e) => {
                tracing::error!("Lock status failed: {}", e);
                return (status_of(&e), Json(None));
            }
        },
        None => None,
    };

    (
        StatusCode::OK,
        Json(Some(LockStatusResponse {
            locked,
            locked_by_session,
        })),
    )
}

fn ok(success: bool) -> (StatusCode, Json<LockResponse>) {
    (
        StatusCode::OK,
        Json(LockResponse {
            success,
            error: None,
        }),
    )
}

fn failed(action: &str, e: GridError) -> (StatusCode, Json<LockResponse>) {
    tracing::error!("Lock {} failed: {}", action, e);
    (
        status_of(&e),
        Json(LockResponse {
            success: false,
            error: Some(e.to_string()),
        }),
    )
}

fn status_of(e: &GridError) -> StatusCode {
    match e {
        GridError::InvalidArgument { .. } | GridError::Serialization { .. } => {
            StatusCode::BAD_REQUEST
        }
        GridError::IllegalLockState { .. } => StatusCode::CONFLICT,
        GridError::CallTimeout { .. } => StatusCode::GATEWAY_TIMEOUT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}
