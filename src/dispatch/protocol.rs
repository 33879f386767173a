//! Member-to-member wire protocol.
//!
//! Every exchange between members is one bincode-encoded `Packet`, delivered
//! at most once by the transport. Responses and acks flow back as packets of
//! their own, never as the transport's reply.

use crate::error::GridResult;
use crate::invocation::types::{BackupOperation, CallId, Operation, Response};

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;

/// Endpoint every member exposes for inbound packets.
pub const ENDPOINT_PACKET: &str = "/internal/packet";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Packet {
    /// A primary operation; the response goes to `caller`.
    Operation { caller: SocketAddr, op: Operation },
    Response(Response),
    Backup(BackupPacket),
    BackupAck { call_id: CallId },
}

impl Packet {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Operation { .. } => "operation",
            Self::Response(_) => "response",
            Self::Backup(_) => "backup",
            Self::BackupAck { .. } => "backup_ack",
        }
    }
}

/// The backups one primary produced for one replica.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupPacket {
    /// Address of the invoker waiting for the ack.
    pub origin: SocketAddr,
    /// `None` for fire-and-forget backups nobody waits for.
    pub call_id: Option<CallId>,
    pub partition_id: u32,
    pub replica_index: usize,
    pub namespace: String,
    pub ops: Vec<BackupOperation>,
}

pub fn encode(packet: &Packet) -> GridResult<Vec<u8>> {
    Ok(bincode::serialize(packet)?)
}

pub fn decode(bytes: &[u8]) -> GridResult<Packet> {
    Ok(bincode::deserialize(bytes)?)
}
