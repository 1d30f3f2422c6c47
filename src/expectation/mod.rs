//! Expected topology derivation and matching
//!
//! - `service`: views over the Service and its backend Pods
//! - `annotations`: controller options read from Service annotations
//! - `topology`: the [`ExpectedTopology`] a Service should produce
//! - `matcher`: [`compare`] of a snapshot against an expectation
//! - `hostname`: hostname-based ingress checks

pub mod annotations;
pub mod hostname;
pub mod matcher;
pub mod service;
pub mod topology;

pub use annotations::{NetworkType, ServiceOptions};
pub use hostname::{ingress_hostnames, ingress_hostnames_for_ingress, HostnameExpectation};
pub use matcher::{compare, Mismatch, TopologyDiff};
pub use service::{has_ready_endpoints, is_pod_ready, BackendPod, ServicePortSpec, ServiceView};
pub use topology::{
    derive_expected, ExpectedTopology, MemberCounting, MemberTarget, PoolGrouping,
    TopologyPolicy,
};

use k8s_openapi::api::core::v1::{Pod, Service};

use crate::error::Result;

/// Derive the expectation straight from cluster objects.
///
/// `node_labels` resolves a node name to its labels; pods on unknown nodes get none.
pub fn expectation_for<F>(
    service: &Service,
    pods: &[Pod],
    node_labels: F,
    policy: &TopologyPolicy,
) -> Result<ExpectedTopology>
where
    F: Fn(&str) -> Option<std::collections::BTreeMap<String, String>>,
{
    let view = ServiceView::from_service(service)?;
    let options = ServiceOptions::from_annotations(&view.annotations)?;
    let backends: Vec<BackendPod> = pods
        .iter()
        .map(|pod| {
            let labels = pod
                .spec
                .as_ref()
                .and_then(|s| s.node_name.as_deref())
                .and_then(&node_labels);
            BackendPod::from_pod(pod, labels.as_ref())
        })
        .collect();
    Ok(derive_expected(&view, &options, &backends, policy))
}
