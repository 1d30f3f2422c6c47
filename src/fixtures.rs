//! Builders for the cluster objects a load balancer test creates

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::{
    Container, ContainerPort, Pod, PodSpec, Service, ServicePort, ServiceSpec,
};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::api::ObjectMeta;

/// Image serving HTTP on its container port
pub const TEST_SERVER_IMAGE: &str = "registry.k8s.io/e2e-test-images/agnhost:2.45";
/// Name of the Service under test
pub const TEST_SERVER_RESOURCE_NAME: &str = "test-server";
/// Node label used to pin a pod to one worker
pub const HOSTNAME_LABEL: &str = "kubernetes.io/hostname";

/// Name the controller gives the load balancer of a Service
pub fn load_balancer_name(cluster: &str, namespace: &str, service: &str) -> String {
    format!("kube_service_{cluster}_{namespace}_{service}")
}

pub fn container_port(name: &str, port: i32) -> ContainerPort {
    ContainerPort {
        name: Some(name.to_string()),
        container_port: port,
        protocol: Some("TCP".to_string()),
        ..Default::default()
    }
}

pub fn service_port(name: &str, port: i32, target_port: i32, protocol: &str) -> ServicePort {
    ServicePort {
        name: Some(name.to_string()),
        port,
        target_port: Some(IntOrString::Int(target_port)),
        protocol: Some(protocol.to_string()),
        ..Default::default()
    }
}

/// A single-container pod carrying `labels`
pub fn pod_object(
    name: &str,
    image: &str,
    ports: Vec<ContainerPort>,
    labels: &BTreeMap<String, String>,
) -> Pod {
    Pod {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            labels: Some(labels.clone()),
            ..Default::default()
        },
        spec: Some(PodSpec {
            containers: vec![Container {
                name: "server".to_string(),
                image: Some(image.to_string()),
                args: Some(vec!["netexec".to_string(), "--http-port=8080".to_string()]),
                ports: Some(ports),
                ..Default::default()
            }],
            ..Default::default()
        }),
        status: None,
    }
}

/// Pin `pod` to the node named `node`
pub fn with_node_selector(mut pod: Pod, node: &str) -> Pod {
    let spec = pod.spec.get_or_insert_with(PodSpec::default);
    spec.node_selector
        .get_or_insert_with(BTreeMap::new)
        .insert(HOSTNAME_LABEL.to_string(), node.to_string());
    pod
}

/// A `type: LoadBalancer` Service selecting `selector`
pub fn load_balancer_service(
    name: &str,
    selector: &BTreeMap<String, String>,
    annotations: &BTreeMap<String, String>,
    ports: Vec<ServicePort>,
    session_affinity_client_ip: bool,
) -> Service {
    Service {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            labels: Some(selector.clone()),
            annotations: (!annotations.is_empty()).then(|| annotations.clone()),
            ..Default::default()
        },
        spec: Some(ServiceSpec {
            type_: Some("LoadBalancer".to_string()),
            selector: Some(selector.clone()),
            ports: Some(ports),
            session_affinity: session_affinity_client_ip.then(|| "ClientIP".to_string()),
            ..Default::default()
        }),
        status: None,
    }
}
