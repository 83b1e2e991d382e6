//! Wiring of a single node: topology, storage, compute and the HTTP router.

use crate::cluster::topology::ClusterTopology;
use crate::compute::handlers::{handle_run_job, handle_sum_balances};
use crate::compute::job::ComputeNode;
use crate::compute::protocol::{ENDPOINT_RUN_JOB, ENDPOINT_SUM_BALANCES};
use crate::compute::submitter::HttpJobSubmitter;
use crate::compute::task::Dispatcher;
use crate::config::NodeConfig;
use crate::ingestion::handlers::handle_bulk_load;
use crate::storage::handlers::{handle_forward_put, handle_put_account, handle_stats};
use crate::storage::memory::AccountStore;
use crate::storage::partitioner::PartitionManager;
use crate::storage::protocol::{
    ENDPOINT_BULK_ACCOUNTS, ENDPOINT_FORWARD_PUT, ENDPOINT_PUT_ACCOUNT, ENDPOINT_STATS,
};

use axum::{
    Router,
    extract::Extension,
    routing::{get, post},
};
use std::sync::Arc;

pub struct NodeServices {
    pub topology: Arc<ClusterTopology>,
    pub partitioner: Arc<PartitionManager>,
    pub store: Arc<AccountStore>,
    pub compute: Arc<ComputeNode>,
    pub dispatcher: Arc<Dispatcher>,
}

impl NodeServices {
    pub fn build(config: &NodeConfig) -> Self {
        let topology = ClusterTopology::new(config.local_node(), config.members.clone());
        let partitioner = PartitionManager::with_partitions(topology.clone(), config.num_partitions);
        let store = AccountStore::new(partitioner.clone());

        let compute = ComputeNode::new(
            config.node_id.clone(),
            partitioner.clone(),
            store.clone(),
            config.compute.job_settings(),
        );
        let submitter = HttpJobSubmitter::new(compute.clone(), config.compute.request_timeout());
        let dispatcher = Arc::new(Dispatcher::new(Arc::new(submitter)));

        tracing::info!(
            "Node {} owns {} of {} partition(s) in a {}-node cluster",
            config.node_id,
            compute.owned_partitions().len(),
            partitioner.num_partitions(),
            topology.len()
        );

        Self {
            topology,
            partitioner,
            store,
            compute,
            dispatcher,
        }
    }

    pub fn router(&self) -> Router {
        Router::new()
            .route(ENDPOINT_PUT_ACCOUNT, post(handle_put_account))
            .route(ENDPOINT_BULK_ACCOUNTS, post(handle_bulk_load))
            .route(ENDPOINT_FORWARD_PUT, post(handle_forward_put))
            .route(ENDPOINT_STATS, get(handle_stats))
            .route(ENDPOINT_SUM_BALANCES, post(handle_sum_balances))
            .route(ENDPOINT_RUN_JOB, post(handle_run_job))
            .layer(Extension(self.store.clone()))
            .layer(Extension(self.compute.clone()))
            .layer(Extension(self.dispatcher.clone()))
            .layer(Extension(self.topology.clone()))
    }
}
