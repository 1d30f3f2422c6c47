//! Resource graph polling
//!
//! Repeatedly fetches a load balancer's listeners, pools and members from the provider
//! until the snapshot matches an [`ExpectedTopology`] or the deadline passes:
//! - Every cycle issues fresh provider calls; nothing is cached
//! - Transient failures are logged and retried on the next tick
//! - Non-retryable failures abort immediately with `FatalProvider`
//! - A missing load balancer is observed as an empty snapshot, not an error

pub mod snapshot;

#[cfg(test)]
mod poller_test;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::try_join_all;
use tracing::{debug, info, instrument, warn};

use crate::error::{Error, Result};
use crate::expectation::{compare, ExpectedTopology, TopologyDiff};
use crate::provider::{LoadBalancerProvider, LoadBalancerRef, ProviderResult};
use crate::retry::{Clock, RetryPolicy};

pub use snapshot::{TopologyCounts, TopologySnapshot};

/// Successful poll result
#[derive(Clone, Debug, PartialEq)]
pub struct PollOutcome {
    /// The snapshot that matched the expectation
    pub snapshot: TopologySnapshot,
    pub attempts: u32,
    pub elapsed: Duration,
}

/// Polls the provider for a load balancer graph
#[derive(Clone)]
pub struct ResourceGraphPoller {
    provider: Arc<dyn LoadBalancerProvider>,
    clock: Arc<dyn Clock>,
    policy: RetryPolicy,
}

impl ResourceGraphPoller {
    pub fn new(
        provider: Arc<dyn LoadBalancerProvider>,
        clock: Arc<dyn Clock>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            provider,
            clock,
            policy,
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Fetch one complete snapshot: load balancer, listeners, pools, then members per pool
    #[instrument(skip(self), fields(lb = %lb_ref))]
    pub async fn fetch_snapshot(&self, lb_ref: &LoadBalancerRef) -> ProviderResult<TopologySnapshot> {
        let Some(load_balancer) = self.provider.resolve(lb_ref).await? else {
            debug!("Load balancer {} not found, observing empty graph", lb_ref);
            return Ok(TopologySnapshot::absent());
        };

        let listeners = self.provider.list_listeners(&load_balancer.id).await?;
        let pools = self.provider.list_pools(&load_balancer.id).await?;

        let member_lists = try_join_all(pools.iter().map(|pool| {
            let provider = self.provider.clone();
            let pool_id = pool.id.clone();
            async move {
                let members = provider.list_members(&pool_id).await?;
                ProviderResult::Ok((pool_id, members))
            }
        }))
        .await?;
        let members: BTreeMap<_, _> = member_lists.into_iter().collect();

        debug!(
            "Fetched {} listener(s), {} pool(s) for load balancer {}",
            listeners.len(),
            pools.len(),
            load_balancer.id
        );

        TopologySnapshot::assemble(load_balancer, listeners, pools, members)
    }

    /// Poll until the graph matches `expected` or `deadline` passes.
    ///
    /// At least one fetch is always made, even when the deadline has already passed.
    #[instrument(skip(self, expected), fields(lb = %lb_ref))]
    pub async fn poll_until_converged(
        &self,
        lb_ref: &LoadBalancerRef,
        expected: &ExpectedTopology,
        deadline: Instant,
    ) -> Result<PollOutcome> {
        let started = self.clock.now();
        let mut backoff = self.policy.backoff();
        let mut attempts = 0u32;
        let mut last_snapshot: Option<TopologySnapshot> = None;
        let mut last_diff: Option<TopologyDiff> = None;
        let mut last_error: Option<String> = None;

        loop {
            attempts += 1;

            match self.fetch_snapshot(lb_ref).await {
                Ok(snapshot) => {
                    let diff = compare(expected, &snapshot);
                    if diff.is_converged() {
                        let elapsed = self.clock.now().saturating_duration_since(started);
                        info!(
                            "Load balancer {} converged after {} attempt(s): {}",
                            lb_ref,
                            attempts,
                            snapshot.counts()
                        );
                        return Ok(PollOutcome {
                            snapshot,
                            attempts,
                            elapsed,
                        });
                    }
                    debug!(
                        "Load balancer {} not converged (attempt {}): {}",
                        lb_ref, attempts, diff
                    );
                    last_snapshot = Some(snapshot);
                    last_diff = Some(diff);
                    last_error = None;
                }
                Err(e) if e.is_retryable() => {
                    warn!(
                        "Transient provider failure for {} (attempt {}): {}",
                        lb_ref, attempts, e
                    );
                    last_error = Some(e.to_string());
                }
                Err(e) => {
                    return Err(Error::FatalProvider {
                        load_balancer: lb_ref.to_string(),
                        source: e,
                    });
                }
            }

            let remaining = self.clock.remaining(deadline);
            if remaining.is_zero() {
                return Err(Error::ConvergenceTimeout {
                    load_balancer: lb_ref.to_string(),
                    attempts,
                    elapsed: self.clock.now().saturating_duration_since(started),
                    last_snapshot: last_snapshot.map(Box::new),
                    last_diff,
                    last_error,
                });
            }

            let delay = backoff.next_delay().min(remaining);
            debug!("Next poll of {} in {:?}", lb_ref, delay);
            self.clock.sleep(delay).await;
        }
    }

    /// [`poll_until_converged`](Self::poll_until_converged) with a relative timeout
    pub async fn poll_for(
        &self,
        lb_ref: &LoadBalancerRef,
        expected: &ExpectedTopology,
        timeout: Duration,
    ) -> Result<PollOutcome> {
        let deadline = self.clock.now() + timeout;
        self.poll_until_converged(lb_ref, expected, deadline).await
    }
}
