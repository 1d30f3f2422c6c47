//! Comparison of an observed snapshot against the expected topology

use std::collections::BTreeSet;
use std::fmt;

use serde::Serialize;

use super::topology::{ExpectedTopology, MemberCounting};
use crate::poller::TopologySnapshot;

/// One dimension in which a snapshot differs from the expectation
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub enum Mismatch {
    /// Expected a load balancer, none exists
    LoadBalancerMissing,
    /// Expected no load balancer, one still exists
    LoadBalancerPresent { id: String },
    Listeners { expected: usize, observed: usize },
    Pools { expected: usize, observed: usize },
    Members { expected: usize, observed: usize },
    ListenerPorts {
        missing: Vec<(String, u16)>,
        unexpected: Vec<(String, u16)>,
    },
    PoolProtocols {
        expected: Vec<String>,
        observed: Vec<String>,
    },
    NetworkType {
        expected: String,
        observed: Option<String>,
    },
    /// Pools with no backend registered
    EmptyPools { pools: usize },
}

impl fmt::Display for Mismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LoadBalancerMissing => write!(f, "load balancer: expected present, observed absent"),
            Self::LoadBalancerPresent { id } => {
                write!(f, "load balancer: expected absent, observed {id}")
            }
            Self::Listeners { expected, observed } => {
                write!(f, "listeners: expected {expected}, observed {observed}")
            }
            Self::Pools { expected, observed } => {
                write!(f, "pools: expected {expected}, observed {observed}")
            }
            Self::Members { expected, observed } => {
                write!(f, "members: expected {expected}, observed {observed}")
            }
            Self::ListenerPorts { missing, unexpected } => write!(
                f,
                "listener ports: missing [{}], unexpected [{}]",
                format_ports(missing),
                format_ports(unexpected)
            ),
            Self::PoolProtocols { expected, observed } => write!(
                f,
                "pool protocols: expected [{}], observed [{}]",
                expected.join(","),
                observed.join(",")
            ),
            Self::NetworkType { expected, observed } => write!(
                f,
                "network type: expected {expected}, observed {}",
                observed.as_deref().unwrap_or("none")
            ),
            Self::EmptyPools { pools } => write!(f, "{pools} pool(s) have no members"),
        }
    }
}

fn format_ports(ports: &[(String, u16)]) -> String {
    ports
        .iter()
        .map(|(protocol, port)| format!("{protocol}/{port}"))
        .collect::<Vec<_>>()
        .join(",")
}

/// Result of a comparison; empty means converged
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct TopologyDiff {
    pub mismatches: Vec<Mismatch>,
}

impl TopologyDiff {
    pub fn is_converged(&self) -> bool {
        self.mismatches.is_empty()
    }
}

impl fmt::Display for TopologyDiff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.mismatches.is_empty() {
            return f.write_str("converged");
        }
        let parts: Vec<String> = self.mismatches.iter().map(ToString::to_string).collect();
        f.write_str(&parts.join(", "))
    }
}

/// Compare a snapshot against an expectation. All counts come from the same snapshot.
pub fn compare(expected: &ExpectedTopology, snapshot: &TopologySnapshot) -> TopologyDiff {
    let mut mismatches = Vec::new();

    match (&snapshot.load_balancer, expected.present) {
        (None, false) => return TopologyDiff::default(),
        (Some(lb), false) => {
            mismatches.push(Mismatch::LoadBalancerPresent { id: lb.id.clone() });
            return TopologyDiff { mismatches };
        }
        (None, true) => {
            mismatches.push(Mismatch::LoadBalancerMissing);
            return TopologyDiff { mismatches };
        }
        (Some(_), true) => {}
    }

    let counts = snapshot.counts();

    if counts.listeners != expected.listeners {
        mismatches.push(Mismatch::Listeners {
            expected: expected.listeners,
            observed: counts.listeners,
        });
    }
    if counts.pools != expected.pools {
        mismatches.push(Mismatch::Pools {
            expected: expected.pools,
            observed: counts.pools,
        });
    }

    let observed_members = match expected.member_counting {
        MemberCounting::PerPool => counts.members,
        MemberCounting::DistinctBackends => counts.distinct_members,
    };
    if observed_members != expected.members {
        mismatches.push(Mismatch::Members {
            expected: expected.members,
            observed: observed_members,
        });
    }

    // every expected pool must be backed, whatever the member total says
    let empty_pools = snapshot.empty_pools().len();
    if expected.pools > 0 && empty_pools > 0 {
        mismatches.push(Mismatch::EmptyPools { pools: empty_pools });
    }

    let observed_ports = snapshot.listener_ports();
    if observed_ports != expected.listener_ports {
        let missing: BTreeSet<_> = expected.listener_ports.difference(&observed_ports).collect();
        let unexpected: BTreeSet<_> = observed_ports.difference(&expected.listener_ports).collect();
        mismatches.push(Mismatch::ListenerPorts {
            missing: missing.into_iter().cloned().collect(),
            unexpected: unexpected.into_iter().cloned().collect(),
        });
    }

    let observed_protocols = snapshot.pool_protocols();
    if observed_protocols != expected.pool_protocols {
        mismatches.push(Mismatch::PoolProtocols {
            expected: expected.pool_protocols.clone(),
            observed: observed_protocols,
        });
    }

    if let Some(network_type) = expected.network_type {
        let observed = snapshot
            .load_balancer
            .as_ref()
            .and_then(|lb| lb.network_type.clone());
        let matches = observed
            .as_deref()
            .is_some_and(|o| o.eq_ignore_ascii_case(network_type.as_str()));
        if !matches {
            mismatches.push(Mismatch::NetworkType {
                expected: network_type.to_string(),
                observed,
            });
        }
    }

    TopologyDiff { mismatches }
}
