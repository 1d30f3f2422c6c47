//! One fully-fetched observation of a load balancer resource graph

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::Serialize;

use crate::provider::{Listener, LoadBalancer, Member, Pool, ProviderError};

/// Counts compared against an expectation
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct TopologyCounts {
    pub listeners: usize,
    pub pools: usize,
    /// Sum of per-pool member counts
    pub members: usize,
    /// Members counted once per backend address across all pools
    pub distinct_members: usize,
}

impl fmt::Display for TopologyCounts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "listeners={} pools={} members={} (distinct {})",
            self.listeners, self.pools, self.members, self.distinct_members
        )
    }
}

/// Snapshot of a load balancer graph at a single polling instant.
///
/// A snapshot is only built from a complete fetch cycle and is replaced wholesale on the
/// next poll.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct TopologySnapshot {
    /// `None` when the load balancer does not exist
    pub load_balancer: Option<LoadBalancer>,
    pub listeners: Vec<Listener>,
    pub pools: Vec<Pool>,
    /// Members keyed by pool id
    pub members: BTreeMap<String, Vec<Member>>,
}

impl TopologySnapshot {
    /// Snapshot of a load balancer that does not exist
    pub fn absent() -> Self {
        Self::default()
    }

    /// Assemble a snapshot, rejecting graphs that changed mid-fetch.
    ///
    /// Pools must reference listeners of this load balancer and members must belong to
    /// the pool they were listed under.
    pub fn assemble(
        load_balancer: LoadBalancer,
        mut listeners: Vec<Listener>,
        mut pools: Vec<Pool>,
        members: BTreeMap<String, Vec<Member>>,
    ) -> Result<Self, ProviderError> {
        let listener_ids: BTreeSet<&str> = listeners.iter().map(|l| l.id.as_str()).collect();

        for listener in &listeners {
            if !listener.load_balancer_id.is_empty() && listener.load_balancer_id != load_balancer.id
            {
                return Err(ProviderError::Inconsistent(format!(
                    "listener {} belongs to load balancer {}",
                    listener.id, listener.load_balancer_id
                )));
            }
        }
        for pool in &pools {
            if !pool.listener_id.is_empty() && !listener_ids.contains(pool.listener_id.as_str()) {
                return Err(ProviderError::Inconsistent(format!(
                    "pool {} references unknown listener {}",
                    pool.id, pool.listener_id
                )));
            }
            if !members.contains_key(&pool.id) {
                return Err(ProviderError::Inconsistent(format!(
                    "members of pool {} were not fetched",
                    pool.id
                )));
            }
        }
        for (pool_id, pool_members) in &members {
            if let Some(stray) = pool_members.iter().find(|m| &m.pool_id != pool_id) {
                return Err(ProviderError::Inconsistent(format!(
                    "member {} listed under pool {} belongs to {}",
                    stray.id, pool_id, stray.pool_id
                )));
            }
        }

        listeners.sort_by(|a, b| a.id.cmp(&b.id));
        pools.sort_by(|a, b| a.id.cmp(&b.id));

        Ok(Self {
            load_balancer: Some(load_balancer),
            listeners,
            pools,
            members,
        })
    }

    pub fn is_present(&self) -> bool {
        self.load_balancer.is_some()
    }

    pub fn counts(&self) -> TopologyCounts {
        let distinct: BTreeSet<&str> = self
            .members
            .values()
            .flatten()
            .map(|m| m.address.as_str())
            .collect();

        TopologyCounts {
            listeners: self.listeners.len(),
            pools: self.pools.len(),
            members: self.members.values().map(Vec::len).sum(),
            distinct_members: distinct.len(),
        }
    }

    /// (protocol, port) of every listener
    pub fn listener_ports(&self) -> BTreeSet<(String, u16)> {
        self.listeners
            .iter()
            .map(|l| (l.protocol.to_ascii_uppercase(), l.port))
            .collect()
    }

    /// Pool protocols, sorted, one entry per pool
    pub fn pool_protocols(&self) -> Vec<String> {
        let mut protocols: Vec<String> = self
            .pools
            .iter()
            .map(|p| p.protocol.to_ascii_uppercase())
            .collect();
        protocols.sort();
        protocols
    }

    /// Pools that currently have no members
    pub fn empty_pools(&self) -> Vec<&str> {
        self.pools
            .iter()
            .filter(|p| self.members.get(&p.id).map_or(true, Vec::is_empty))
            .map(|p| p.id.as_str())
            .collect()
    }
}
