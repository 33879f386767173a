use super::protocol::ENDPOINT_PACKET;

use std::future::Future;
use std::net::SocketAddr;
use std::pin::Pin;
use std::time::Duration;
use thiserror::Error;

pub type SendFuture<'a> = Pin<Box<dyn Future<Output = Result<(), TransportError>> + Send + 'a>>;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("no member is listening at {0}")]
    Unreachable(SocketAddr),

    #[error("send to {address} failed: {message}")]
    Failed {
        address: SocketAddr,
        message: String,
    },
}

/// Hands one encoded packet to the member at `target`.
///
/// A send is attempted once. `Ok` means the packet was handed off, not that
/// it was processed; `Err` means it never left this member.
pub trait Transport: Send + Sync {
    fn send_to_target(&self, target: SocketAddr, payload: Vec<u8>) -> SendFuture<'_>;
}

/// Posts packets to the target's packet endpoint.
pub struct HttpTransport {
    client: reqwest::Client,
    send_timeout: Duration,
}

impl HttpTransport {
    pub fn new(send_timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            send_timeout,
        }
    }
}

impl Transport for HttpTransport {
    fn send_to_target(&self, target: SocketAddr, payload: Vec<u8>) -> SendFuture<'_> {
        Box::pin(async move {
            let url = format!("http://{}{}", target, ENDPOINT_PACKET);
            let response = self
                .client
                .post(url)
                .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
                .body(payload)
                .timeout(self.send_timeout)
                .send()
                .await
                .map_err(|e| TransportError::Failed {
                    address: target,
                    message: e.to_string(),
                })?;

            if !response.status().is_success() {
                return Err(TransportError::Failed {
                    address: target,
                    message: format!("status {}", response.status()),
                });
            }
            Ok(())
        })
    }
}
