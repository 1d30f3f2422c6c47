//! Views over the Service and Pods that drive a load balancer

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::{Endpoints, Pod, Service};
use kube::ResourceExt;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// One declared Service port
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServicePortSpec {
    #[serde(default)]
    pub name: String,
    pub port: u16,
    /// Upper-case protocol, `TCP` when unset
    pub protocol: String,
    #[serde(default)]
    pub node_port: Option<u16>,
}

impl ServicePortSpec {
    pub fn new(name: &str, port: u16, protocol: &str) -> Self {
        Self {
            name: name.to_string(),
            port,
            protocol: protocol.to_ascii_uppercase(),
            node_port: None,
        }
    }
}

/// The parts of a LoadBalancer Service the expectation depends on
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceView {
    pub namespace: String,
    pub name: String,
    pub ports: Vec<ServicePortSpec>,
    pub selector: BTreeMap<String, String>,
    #[serde(default)]
    pub annotations: BTreeMap<String, String>,
}

impl ServiceView {
    pub fn from_service(service: &Service) -> Result<Self> {
        let name = service.name_any();
        let spec = service
            .spec
            .as_ref()
            .ok_or_else(|| Error::InvalidSpec(format!("service {name} has no spec")))?;

        let ports = spec
            .ports
            .iter()
            .flatten()
            .map(|p| {
                let port = u16::try_from(p.port).map_err(|_| {
                    Error::InvalidSpec(format!("service {name} port {} out of range", p.port))
                })?;
                let node_port = p.node_port.and_then(|np| u16::try_from(np).ok());
                Ok(ServicePortSpec {
                    name: p.name.clone().unwrap_or_default(),
                    port,
                    protocol: p
                        .protocol
                        .as_deref()
                        .unwrap_or("TCP")
                        .to_ascii_uppercase(),
                    node_port,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        if ports.is_empty() {
            return Err(Error::InvalidSpec(format!("service {name} declares no ports")));
        }

        Ok(Self {
            namespace: service.namespace().unwrap_or_else(|| "default".to_string()),
            name,
            ports,
            selector: spec.selector.clone().unwrap_or_default(),
            annotations: service.annotations().clone(),
        })
    }
}

/// A Pod that may back the Service
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendPod {
    pub name: String,
    pub node_name: Option<String>,
    pub address: Option<String>,
    pub labels: BTreeMap<String, String>,
    /// Labels of the node the pod runs on
    #[serde(default)]
    pub node_labels: BTreeMap<String, String>,
    pub ready: bool,
}

impl BackendPod {
    /// Build from a Pod; `node_labels` are the labels of the Pod's node, when known
    pub fn from_pod(pod: &Pod, node_labels: Option<&BTreeMap<String, String>>) -> Self {
        let status = pod.status.as_ref();
        Self {
            name: pod.name_any(),
            node_name: pod.spec.as_ref().and_then(|s| s.node_name.clone()),
            address: status.and_then(|s| s.pod_ip.clone()),
            labels: pod.labels().clone(),
            node_labels: node_labels.cloned().unwrap_or_default(),
            ready: is_pod_ready(pod),
        }
    }

    /// Whether the pod's labels satisfy a Service selector.
    ///
    /// An empty selector selects nothing, matching Services without a selector.
    pub fn matches_selector(&self, selector: &BTreeMap<String, String>) -> bool {
        !selector.is_empty() && contains_all(&self.labels, selector)
    }

    pub fn on_matching_node(&self, required: &BTreeMap<String, String>) -> bool {
        contains_all(&self.node_labels, required)
    }
}

/// Running with a `Ready=True` condition
pub fn is_pod_ready(pod: &Pod) -> bool {
    let status = pod.status.as_ref();
    let running = status
        .and_then(|s| s.phase.as_deref())
        .is_some_and(|phase| phase == "Running");
    let ready_condition = status
        .and_then(|s| s.conditions.as_ref())
        .and_then(|conds| conds.iter().find(|c| c.type_ == "Ready"))
        .is_some_and(|c| c.status == "True");
    running && ready_condition
}

/// Whether the Service's Endpoints list at least one ready address
pub fn has_ready_endpoints(endpoints: &Endpoints) -> bool {
    endpoints
        .subsets
        .iter()
        .flatten()
        .any(|subset| subset.addresses.as_ref().is_some_and(|a| !a.is_empty()))
}

fn contains_all(labels: &BTreeMap<String, String>, required: &BTreeMap<String, String>) -> bool {
    required.iter().all(|(k, v)| labels.get(k) == Some(v))
}
