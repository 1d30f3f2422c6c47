//! Hostname checks for load balancer ingress
//!
//! Hostname-based ingress controllers publish a DNS name (often a wildcard DNS service
//! such as `nip.io`) instead of, or next to, a VIP.

use k8s_openapi::api::core::v1::Service;
use k8s_openapi::api::networking::v1::Ingress;
use serde::{Deserialize, Serialize};

/// Accepted shape of a published hostname
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum HostnameExpectation {
    Exact(String),
    /// Any hostname ending in this suffix, e.g. `.nip.io`
    Suffix(String),
}

impl HostnameExpectation {
    pub fn matches(&self, hostname: &str) -> bool {
        let hostname = hostname.trim_end_matches('.').to_ascii_lowercase();
        match self {
            Self::Exact(expected) => hostname == expected.trim_end_matches('.').to_ascii_lowercase(),
            Self::Suffix(suffix) => {
                let suffix = suffix.trim_end_matches('.').to_ascii_lowercase();
                hostname.len() > suffix.len() && hostname.ends_with(&suffix)
            }
        }
    }

    /// True when any of `hostnames` matches
    pub fn matches_any<S: AsRef<str>>(&self, hostnames: &[S]) -> bool {
        hostnames.iter().any(|h| self.matches(h.as_ref()))
    }
}

/// Hostnames published in a Service's load balancer status
pub fn ingress_hostnames(service: &Service) -> Vec<String> {
    service
        .status
        .as_ref()
        .and_then(|s| s.load_balancer.as_ref())
        .and_then(|lb| lb.ingress.as_ref())
        .map(|ingress| ingress.iter().filter_map(|i| i.hostname.clone()).collect())
        .unwrap_or_default()
}

/// Hostnames published in an Ingress's load balancer status
pub fn ingress_hostnames_for_ingress(ingress: &Ingress) -> Vec<String> {
    ingress
        .status
        .as_ref()
        .and_then(|s| s.load_balancer.as_ref())
        .and_then(|lb| lb.ingress.as_ref())
        .map(|entries| entries.iter().filter_map(|i| i.hostname.clone()).collect())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::{LoadBalancerIngress, LoadBalancerStatus, ServiceStatus};
    use k8s_openapi::api::networking::v1::{
        IngressLoadBalancerIngress, IngressLoadBalancerStatus, IngressStatus,
    };

    #[test]
    fn test_nip_io_suffix() {
        let expectation = HostnameExpectation::Suffix(".nip.io".to_string());
        assert!(expectation.matches("103-56-158-12.nip.io"));
        assert!(expectation.matches("app.103.56.158.12.NIP.IO."));
        assert!(!expectation.matches("nip.io.example.com"));
        assert!(!expectation.matches(".nip.io"));
    }

    #[test]
    fn test_exact() {
        let expectation = HostnameExpectation::Exact("lb.example.com".to_string());
        assert!(expectation.matches("LB.example.com"));
        assert!(!expectation.matches("a.lb.example.com"));
        assert!(expectation.matches_any(&["10.0.0.1", "lb.example.com"]));
    }

    #[test]
    fn test_service_status_hostnames() {
        let service = Service {
            status: Some(ServiceStatus {
                load_balancer: Some(LoadBalancerStatus {
                    ingress: Some(vec![
                        LoadBalancerIngress {
                            ip: Some("103.56.158.12".to_string()),
                            ..Default::default()
                        },
                        LoadBalancerIngress {
                            hostname: Some("103-56-158-12.nip.io".to_string()),
                            ..Default::default()
                        },
                    ]),
                }),
                ..Default::default()
            }),
            ..Default::default()
        };
        assert_eq!(ingress_hostnames(&service), vec!["103-56-158-12.nip.io"]);
        assert!(ingress_hostnames(&Service::default()).is_empty());
    }

    #[test]
    fn test_ingress_status_hostnames() {
        let ingress = Ingress {
            status: Some(IngressStatus {
                load_balancer: Some(IngressLoadBalancerStatus {
                    ingress: Some(vec![IngressLoadBalancerIngress {
                        hostname: Some("shop.10.0.0.5.nip.io".to_string()),
                        ..Default::default()
                    }]),
                }),
            }),
            ..Default::default()
        };
        let hostnames = ingress_hostnames_for_ingress(&ingress);
        assert!(HostnameExpectation::Suffix(".nip.io".to_string()).matches_any(&hostnames));
    }
}
