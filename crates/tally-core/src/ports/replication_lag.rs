//! ReplicationLagService port: staleness check for backing data sources.
//!
//! The recurrence scheduler skips a whole pass when any backing source is
//! lagging; computing reports against stale data and then never revisiting
//! those days would bake wrong numbers into the record.

use async_trait::async_trait;

#[async_trait]
pub trait ReplicationLagService: Send + Sync {
    /// Is any backing data source stale beyond its configured threshold?
    async fn is_any_lagged(&self) -> bool;
}

/// Default implementation for deployments without replicated sources.
#[derive(Debug, Clone, Copy, Default)]
pub struct NeverLagged;

#[async_trait]
impl ReplicationLagService for NeverLagged {
    async fn is_any_lagged(&self) -> bool {
        false
    }
}
