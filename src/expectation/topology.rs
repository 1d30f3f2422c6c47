//! Expected load balancer topology for a Service
//!
//! The expectation is a pure function of the Service ports, the ready backend Pods,
//! the effective annotation options and a [`TopologyPolicy`]. The policy is explicit
//! because controllers differ on whether ports sharing a protocol share a pool and on
//! how members are registered; the caller picks the behaviour of the controller under
//! test instead of the matcher assuming one.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use super::annotations::{NetworkType, ServiceOptions};
use super::service::{BackendPod, ServiceView};

/// How declared ports map onto pools
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PoolGrouping {
    /// One pool behind every listener
    #[default]
    PerListener,
    /// Ports sharing a protocol collapse into one pool
    PerProtocol,
}

/// How pool members are counted
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum MemberCounting {
    /// Members summed over pools, as the provider's member count reports them;
    /// every pool registers every backend, so members = pools × backends
    #[default]
    PerPool,
    /// Each backend address is counted once across all pools
    DistinctBackends,
}

/// What a member points at
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum MemberTarget {
    /// Nodes hosting ready pods (NodePort backends)
    #[default]
    Node,
    /// The pods themselves
    Pod,
}

/// Controller behaviour the expectation encodes
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopologyPolicy {
    pub pool_grouping: PoolGrouping,
    pub member_counting: MemberCounting,
    pub member_target: MemberTarget,
}

/// Read-only projection of what the provider graph should look like
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpectedTopology {
    /// Whether the load balancer must exist
    pub present: bool,
    pub listeners: usize,
    pub pools: usize,
    pub members: usize,
    pub member_counting: MemberCounting,
    /// (protocol, port) per listener
    pub listener_ports: BTreeSet<(String, u16)>,
    /// One entry per pool, sorted
    pub pool_protocols: Vec<String>,
    /// Checked only when set
    pub network_type: Option<NetworkType>,
}

impl ExpectedTopology {
    /// Teardown expectation: no load balancer and nothing under it
    pub fn absent() -> Self {
        Self {
            present: false,
            listeners: 0,
            pools: 0,
            members: 0,
            member_counting: MemberCounting::default(),
            listener_ports: BTreeSet::new(),
            pool_protocols: Vec::new(),
            network_type: None,
        }
    }

    /// Backends the Service should route to: ready, selected, on a target node
    pub fn selected_backends<'a>(
        service: &ServiceView,
        options: &ServiceOptions,
        backends: &'a [BackendPod],
    ) -> Vec<&'a BackendPod> {
        backends
            .iter()
            .filter(|b| b.ready)
            .filter(|b| b.matches_selector(&service.selector))
            .filter(|b| b.on_matching_node(&options.target_node_labels))
            .collect()
    }
}

/// Derive the expected topology. Deterministic for identical inputs.
pub fn derive_expected(
    service: &ServiceView,
    options: &ServiceOptions,
    backends: &[BackendPod],
    policy: &TopologyPolicy,
) -> ExpectedTopology {
    let listener_ports: BTreeSet<(String, u16)> = service
        .ports
        .iter()
        .map(|p| (p.protocol.to_ascii_uppercase(), p.port))
        .collect();

    let pool_protocol = |protocol: &str| -> String {
        if options.proxy_protocol && protocol == "TCP" {
            "PROXY".to_string()
        } else {
            protocol.to_string()
        }
    };

    let mut pool_protocols: Vec<String> = match policy.pool_grouping {
        PoolGrouping::PerListener => listener_ports
            .iter()
            .map(|(protocol, _)| pool_protocol(protocol))
            .collect(),
        PoolGrouping::PerProtocol => listener_ports
            .iter()
            .map(|(protocol, _)| pool_protocol(protocol))
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect(),
    };
    pool_protocols.sort();

    let targets: BTreeSet<&str> = ExpectedTopology::selected_backends(service, options, backends)
        .into_iter()
        .filter_map(|b| match policy.member_target {
            MemberTarget::Node => b.node_name.as_deref(),
            MemberTarget::Pod => b.address.as_deref().or(Some(b.name.as_str())),
        })
        .collect();

    let pools = pool_protocols.len();
    let members = match policy.member_counting {
        MemberCounting::PerPool => pools * targets.len(),
        MemberCounting::DistinctBackends => targets.len(),
    };

    ExpectedTopology {
        present: true,
        listeners: listener_ports.len(),
        pools,
        members,
        member_counting: policy.member_counting,
        listener_ports,
        pool_protocols,
        network_type: options.network_type,
    }
}
