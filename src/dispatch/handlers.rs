use super::dispatcher::OperationDispatcher;
use super::protocol;

use axum::{body::Bytes, extract::Extension, http::StatusCode};
use std::sync::Arc;

/// Accepts one packet from another member. Processing happens after the
/// hand-off is acknowledged; results travel back as packets of their own.
pub async fn handle_internal_packet(
    Extension(dispatcher): Extension<Arc<OperationDispatcher>>,
    body: Bytes,
) -> StatusCode {
    let packet = match protocol::decode(&body) {
        Ok(packet) => packet,
        Err(e) => {
            tracing::error!("Failed to decode packet: {}", e);
            return StatusCode::BAD_REQUEST;
        }
    };

    tokio::spawn(async move {
        dispatcher.handle(packet).await;
    });
    StatusCode::ACCEPTED
}
