use anyhow::Context;
use axum::{
    Router,
    extract::Extension,
    routing::{get, post},
};
use distributed_grid::cluster::partition::PartitionManager;
use distributed_grid::cluster::types::PartitionReplica;
use distributed_grid::config::GridConfig;
use distributed_grid::dispatch::handlers::handle_internal_packet;
use distributed_grid::dispatch::protocol::ENDPOINT_PACKET;
use distributed_grid::dispatch::transport::HttpTransport;
use distributed_grid::lock::handlers::*;
use distributed_grid::lock::protocol::*;
use distributed_grid::node::GridNode;
use distributed_grid::storage::handlers::*;
use distributed_grid::storage::protocol::*;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        // .with_max_level(tracing::Level::DEBUG)
        .with_max_level(tracing::Level::INFO)
        .init();

    let args: Vec<String> = std::env::args().collect();

    if args.len() < 3 {
        eprintln!(
            "Usage: {} --bind <addr:port> [--member <addr:port>]... [--config <file>]",
            args[0]
        );
        eprintln!(
            "Example: {} --bind 127.0.0.1:5701 --member 127.0.0.1:5702 --member 127.0.0.1:5703",
            args[0]
        );

        std::process::exit(1);
    }

    let mut bind_addr: Option<SocketAddr> = None;
    let mut member_addrs: Vec<SocketAddr> = vec![];
    let mut config_path: Option<String> = None;

    let mut i = 1;
    while i < args.len() {
        let value = args.get(i + 1);
        match (args[i].as_str(), value) {
            ("--bind", Some(value)) => {
                bind_addr = Some(value.parse()?);
                i += 2;
            }
            ("--member", Some(value)) => {
                member_addrs.push(value.parse()?);
                i += 2;
            }
            ("--config", Some(value)) => {
                config_path = Some(value.clone());
                i += 2;
            }
            _ => {
                i += 1;
            }
        }
    }

    let bind_addr = bind_addr.context("--bind is required")?;
    let config = match config_path {
        Some(path) => GridConfig::from_file(path)?,
        None => GridConfig::default(),
    };

    // The local member is always part of the static member list.
    if !member_addrs.contains(&bind_addr) {
        member_addrs.push(bind_addr);
    }
    let members: Vec<PartitionReplica> = member_addrs
        .iter()
        .map(|addr| PartitionReplica::from_address(*addr))
        .collect();
    let local = PartitionReplica::from_address(bind_addr);

    tracing::info!("Starting member {} on {}", local.member, bind_addr);
    tracing::info!(
        "Cluster of {} members, {} partitions, {} backups",
        members.len(),
        config.partition_count,
        config.backup_count
    );

    // 1. Partition table (static membership):
    let partitions = PartitionManager::new(config.partition_count, config.backup_count, members);
    tracing::info!(
        "Owning {} partitions, backing up {}",
        partitions.primary_partitions(&local.member).len(),
        partitions.backup_partitions(&local.member).len()
    );

    // 2. Node:
    let transport = Arc::new(HttpTransport::new(Duration::from_millis(
        config.transport.send_timeout_ms,
    )));
    let node = GridNode::new(config, local, partitions.clone(), transport);

    // 3. HTTP Router:
    let app = Router::new()
        .route(ENDPOINT_PACKET, post(handle_internal_packet))
        .route(ENDPOINT_MAP_PUT, post(handle_map_put))
        .route(ENDPOINT_MAP_GET, get(handle_map_get))
        .route(ENDPOINT_MAP_REMOVE, post(handle_map_remove))
        .route(ENDPOINT_MAP_EXPIRY, post(handle_map_expiry))
        .route(ENDPOINT_LOCK_ACQUIRE, post(handle_lock_acquire))
        .route(ENDPOINT_LOCK_RELEASE, post(handle_lock_release))
        .route(ENDPOINT_LOCK_FORCE_UNLOCK, post(handle_lock_force_unlock))
        .route(ENDPOINT_LOCK_STATUS, get(handle_lock_status))
        .layer(Extension(node.dispatcher().clone()))
        .layer(Extension(node.clone()));

    // 4. Spawn stats reporter:
    let stats_node = node.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(5));

        loop {
            interval.tick().await;
            let stats = stats_node.local_stats();
            tracing::info!(
                "Member stats: {} locked keys, {} records in {} partitions, {} pending invocations",
                stats.locked_keys,
                stats.records,
                stats_node.dispatcher().records().local_partition_count(),
                stats.pending_invocations
            );
        }
    });

    // 5. Start HTTP server:
    tracing::info!("HTTP server listening on {}", bind_addr);
    tracing::info!("Press Ctrl+C to shutdown");

    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
