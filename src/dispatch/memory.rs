//! In-process network for running several members inside one runtime.
//!
//! Each member attaches its dispatcher under its address. Delivery spawns the
//! receiving side on the runtime, so sender and receiver never share a call
//! stack. Faults are injected per destination: an isolated member silently
//! loses everything sent to it, a delayed one receives it late, a detached one
//! refuses the hand-off.

use super::dispatcher::OperationDispatcher;
use super::transport::{SendFuture, Transport, TransportError};

use dashmap::{DashMap, DashSet};
use std::net::SocketAddr;
use std::sync::{Arc, Weak};
use std::time::Duration;

pub struct InMemoryNetwork {
    endpoints: DashMap<SocketAddr, Weak<OperationDispatcher>>,
    isolated: DashSet<SocketAddr>,
    delays: DashMap<SocketAddr, Duration>,
}

impl InMemoryNetwork {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            endpoints: DashMap::new(),
            isolated: DashSet::new(),
            delays: DashMap::new(),
        })
    }

    pub fn transport(self: &Arc<Self>) -> Arc<dyn Transport> {
        Arc::new(InMemoryTransport {
            network: self.clone(),
        })
    }

    pub fn attach(&self, address: SocketAddr, dispatcher: &Arc<OperationDispatcher>) {
        self.endpoints.insert(address, Arc::downgrade(dispatcher));
    }

    pub fn detach(&self, address: SocketAddr) {
        self.endpoints.remove(&address);
    }

    /// Drops every packet addressed to `address` until healed.
    pub fn isolate(&self, address: SocketAddr) {
        tracing::debug!("Isolating {}", address);
        self.isolated.insert(address);
    }

    pub fn heal(&self, address: SocketAddr) {
        self.isolated.remove(&address);
        self.delays.remove(&address);
    }

    pub fn set_delay(&self, address: SocketAddr, delay: Duration) {
        self.delays.insert(address, delay);
    }

    fn deliver(&self, target: SocketAddr, payload: Vec<u8>) -> Result<(), TransportError> {
        let dispatcher = self
            .endpoints
            .get(&target)
            .and_then(|endpoint| endpoint.upgrade())
            .ok_or(TransportError::Unreachable(target))?;

        if self.isolated.contains(&target) {
            tracing::trace!("Dropping packet to isolated {}", target);
            return Ok(());
        }

        let delay = self.delays.get(&target).map(|delay| *delay);
        tokio::spawn(async move {
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            if let Err(e) = dispatcher.handle_packet(&payload).await {
                tracing::warn!("Member {} rejected packet: {}", target, e);
            }
        });
        Ok(())
    }
}

struct InMemoryTransport {
    network: Arc<InMemoryNetwork>,
}

impl Transport for InMemoryTransport {
    fn send_to_target(&self, target: SocketAddr, payload: Vec<u8>) -> SendFuture<'_> {
        Box::pin(async move { self.network.deliver(target, payload) })
    }
}
