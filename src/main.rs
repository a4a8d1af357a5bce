use std::sync::Arc;

use quorum_engine::cluster::role_name;
use quorum_engine::gather;
use quorum_engine::ClientConfig;
use quorum_engine::LocalNetwork;
use quorum_engine::Node;
use quorum_engine::NodeBuilder;
use quorum_engine::RaftClientBuilder;
use quorum_engine::RaftNodeConfig;
use quorum_engine::Result;
use tracing::error;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Runs every member of `initial_cluster` in this process, submits a few
/// commands and waits for Ctrl+C.
#[tokio::main(flavor = "multi_thread", worker_threads = 4)]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = RaftNodeConfig::new()?.validate()?;
    let members = config.cluster.member_ids();
    let network = LocalNetwork::new();

    let mut nodes: Vec<Node> = Vec::with_capacity(members.len());
    for id in &members {
        let node = NodeBuilder::new(config.for_node(*id))
            .transport(Arc::new(network.transport(*id)))
            .start()?;
        network.register(node.handle());
        nodes.push(node);
    }
    info!("started {} nodes: {:?}", nodes.len(), members);

    let client = RaftClientBuilder::new(members.clone(), network.clone())
        .set_config(ClientConfig::from_policy(&config.retry.client))
        .build()?;
    for i in 1..=5 {
        let command = format!("demo-command-{}", i).into_bytes();
        match client.submit(command).await {
            Ok(result) => info!("command {} committed at index {} in term {}", i, result.index, result.term),
            Err(e) => error!("command {} failed: {}", i, e),
        }
    }

    for node in &nodes {
        let status = node.handle().status();
        info!(
            "node {}: {} term={} commit={} applied={}",
            status.node_id,
            role_name(status.role),
            status.current_term,
            status.commit_index,
            status.last_applied
        );
    }
    info!("metrics:\n{}", gather());

    info!("Waiting for CTRL+C signal...");
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for Ctrl+C: {:?}", e);
    }

    for node in nodes {
        let node_id = node.node_id();
        network.unregister(node_id);
        if let Err(e) = node.shutdown().await {
            error!("node {} stopped with error: {:?}", node_id, e);
        }
    }
    info!("Shutdown completed");
    Ok(())
}
