//! Per-query settings: config plus the runtime pieces that cannot be
//! serialized (cancellation, scheduler).

use std::fmt;
use std::sync::Arc;

use partq_core::cancel::{CancellationState, CancellationToken};
use partq_core::config::{ExecutionMode, MergeOptions, QueryConfig};
use partq_core::id::QueryId;

use crate::scheduler::{TaskScheduler, ThreadScheduler};

#[derive(Clone)]
pub struct QuerySettings {
    config: QueryConfig,
    cancellation: CancellationState,
    scheduler: Arc<dyn TaskScheduler>,
    query_id: QueryId,
}

impl QuerySettings {
    pub fn new(config: QueryConfig) -> Self {
        Self {
            config,
            cancellation: CancellationState::default(),
            scheduler: Arc::new(ThreadScheduler::new()),
            query_id: QueryId::next(),
        }
    }

    /// Attach the caller's cancellation token.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = CancellationState::new(token);
        self
    }

    pub fn with_scheduler(mut self, scheduler: Arc<dyn TaskScheduler>) -> Self {
        self.scheduler = scheduler;
        self
    }

    /// Settings for one execution: same config, token and scheduler, a fresh
    /// internal cancellation source and a new query id.
    pub fn with_per_execution_state(&self) -> Self {
        Self {
            config: self.config.clone(),
            cancellation: self.cancellation.renew(),
            scheduler: Arc::clone(&self.scheduler),
            query_id: QueryId::next(),
        }
    }

    pub fn config(&self) -> &QueryConfig {
        &self.config
    }

    pub fn cancellation(&self) -> &CancellationState {
        &self.cancellation
    }

    pub fn merged_token(&self) -> &CancellationToken {
        self.cancellation.merged_token()
    }

    pub fn scheduler(&self) -> &dyn TaskScheduler {
        self.scheduler.as_ref()
    }

    pub fn query_id(&self) -> QueryId {
        self.query_id
    }

    pub fn degree_of_parallelism(&self) -> usize {
        self.config.degree_of_parallelism
    }

    pub fn execution_mode(&self) -> ExecutionMode {
        self.config.execution_mode
    }

    pub fn merge_options(&self) -> MergeOptions {
        self.config.merge_options
    }
}

impl Default for QuerySettings {
    fn default() -> Self {
        Self::new(QueryConfig::default())
    }
}

impl fmt::Debug for QuerySettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QuerySettings")
            .field("config", &self.config)
            .field("query_id", &self.query_id)
            .field("scheduler", &self.scheduler.name())
            .field("cancellation", &self.cancellation)
            .finish()
    }
}
