//! Cloud provider access for the load balancer resource graph
//!
//! The verifier only ever reads from the provider. Implementations:
//! - [`HttpProvider`] for a live provider API
//! - [`InMemoryProvider`] for scripted, deterministic test runs

pub mod client;
pub mod error;
pub mod memory;
pub mod types;

use async_trait::async_trait;

pub use client::HttpProvider;
pub use error::{ProviderError, ProviderResult};
pub use memory::{Fault, Graph, InMemoryProvider, Stage};
pub use types::{Listener, LoadBalancer, LoadBalancerRef, Member, Pool};

/// Read-only view of the provider's load balancer API
#[async_trait]
pub trait LoadBalancerProvider: Send + Sync {
    /// Fetch a load balancer by identifier. `Ok(None)` when it does not exist.
    async fn get_load_balancer(&self, id: &str) -> ProviderResult<Option<LoadBalancer>>;

    /// Look a load balancer up by its exact display name
    async fn find_load_balancer(&self, name: &str) -> ProviderResult<Option<LoadBalancer>>;

    async fn list_listeners(&self, lb_id: &str) -> ProviderResult<Vec<Listener>>;

    async fn list_pools(&self, lb_id: &str) -> ProviderResult<Vec<Pool>>;

    async fn list_members(&self, pool_id: &str) -> ProviderResult<Vec<Member>>;

    /// Total member count across `pool_ids`
    async fn count_members(&self, pool_ids: &[String]) -> ProviderResult<usize> {
        let mut total = 0;
        for pool_id in pool_ids {
            total += self.list_members(pool_id).await?.len();
        }
        Ok(total)
    }

    /// Resolve a [`LoadBalancerRef`] to the current load balancer, if any
    async fn resolve(&self, lb_ref: &LoadBalancerRef) -> ProviderResult<Option<LoadBalancer>> {
        match lb_ref {
            LoadBalancerRef::Id(id) => self.get_load_balancer(id).await,
            LoadBalancerRef::Name(name) => self.find_load_balancer(name).await,
        }
    }
}
