//! Scripted in-memory provider
//!
//! Serves a fixed sequence of provider states. The k-th load balancer lookup
//! (`get_load_balancer` or `find_load_balancer`) selects stage `k` (the last stage
//! repeats forever), and the listener/pool/member calls that follow read from the
//! selected stage. This makes a poll run fully determined by its stage list, which is
//! what the idempotence and deadline tests rely on.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use super::error::{validate_id, ProviderError, ProviderResult};
use super::types::{Listener, LoadBalancer, Member, Pool};
use super::LoadBalancerProvider;

/// A complete load balancer resource graph
#[derive(Clone, Debug, PartialEq)]
pub struct Graph {
    pub load_balancer: LoadBalancer,
    pub listeners: Vec<Listener>,
    pub pools: Vec<Pool>,
    pub members: Vec<Member>,
}

impl Graph {
    pub fn new(id: &str, name: &str) -> Self {
        Self {
            load_balancer: LoadBalancer {
                id: id.to_string(),
                name: name.to_string(),
                provisioning_status: "ACTIVE".to_string(),
                operating_status: "ONLINE".to_string(),
                network_type: None,
                vip_address: None,
            },
            listeners: Vec::new(),
            pools: Vec::new(),
            members: Vec::new(),
        }
    }

    pub fn with_network_type(mut self, network_type: &str) -> Self {
        self.load_balancer.network_type = Some(network_type.to_string());
        self
    }

    /// Add a listener with one pool holding one member per backend address
    pub fn with_listener(
        mut self,
        protocol: &str,
        port: u16,
        pool_protocol: &str,
        backends: &[&str],
        member_port: u16,
    ) -> Self {
        let n = self.listeners.len();
        let listener_id = format!("{}-listener-{n}", self.load_balancer.id);
        let pool_id = format!("{}-pool-{n}", self.load_balancer.id);

        self.listeners.push(Listener {
            id: listener_id.clone(),
            name: format!("listener-{port}"),
            load_balancer_id: self.load_balancer.id.clone(),
            protocol: protocol.to_string(),
            port,
        });
        self.pools.push(Pool {
            id: pool_id.clone(),
            name: format!("pool-{port}"),
            listener_id,
            protocol: pool_protocol.to_string(),
            lb_algorithm: Some("ROUND_ROBIN".to_string()),
        });
        for (i, address) in backends.iter().enumerate() {
            self.members.push(Member {
                id: format!("{pool_id}-member-{i}"),
                pool_id: pool_id.clone(),
                address: address.to_string(),
                port: member_port,
                weight: 1,
            });
        }
        self
    }
}

/// Failure injected at a stage
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Fault {
    /// Connection-level failure, retryable
    Unreachable,
    /// HTTP status returned by the provider
    Status(u16),
}

impl Fault {
    fn to_error(&self, resource: &str) -> ProviderError {
        match self {
            Self::Unreachable => ProviderError::Unavailable(format!("{resource}: connection reset")),
            Self::Status(status) => ProviderError::Status {
                status: *status,
                url: format!("memory://{resource}"),
                body: String::new(),
            },
        }
    }
}

/// One entry of the scripted response sequence
#[derive(Clone, Debug, PartialEq)]
pub enum Stage {
    Present(Graph),
    Absent,
    Fail(Fault),
}

/// Provider backed by a scripted stage sequence
pub struct InMemoryProvider {
    stages: Vec<Stage>,
    lookups: AtomicUsize,
    calls: AtomicUsize,
    current: Mutex<usize>,
}

impl InMemoryProvider {
    /// Provider that serves `stages` in order, repeating the last one
    pub fn sequenced(stages: Vec<Stage>) -> Self {
        Self {
            stages,
            lookups: AtomicUsize::new(0),
            calls: AtomicUsize::new(0),
            current: Mutex::new(0),
        }
    }

    /// Provider that always serves one graph
    pub fn fixed(graph: Graph) -> Self {
        Self::sequenced(vec![Stage::Present(graph)])
    }

    /// Provider with no load balancers at all
    pub fn empty() -> Self {
        Self::sequenced(vec![Stage::Absent])
    }

    /// Number of load balancer lookups served so far
    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }

    /// Number of provider calls of any kind served so far
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn advance(&self) -> Option<&Stage> {
        let k = self.lookups.fetch_add(1, Ordering::SeqCst);
        let idx = k.min(self.stages.len().saturating_sub(1));
        if let Ok(mut current) = self.current.lock() {
            *current = idx;
        }
        self.stages.get(idx)
    }

    fn current(&self) -> Option<&Stage> {
        let idx = self.current.lock().map(|c| *c).unwrap_or(0);
        self.stages.get(idx)
    }

    fn graph_for(&self, resource: &str) -> ProviderResult<Option<&Graph>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.current() {
            Some(Stage::Present(graph)) => Ok(Some(graph)),
            Some(Stage::Fail(fault)) => Err(fault.to_error(resource)),
            Some(Stage::Absent) | None => Ok(None),
        }
    }

    fn lookup(&self, resource: &str) -> ProviderResult<Option<&Graph>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.advance() {
            Some(Stage::Present(graph)) => Ok(Some(graph)),
            Some(Stage::Fail(fault)) => Err(fault.to_error(resource)),
            Some(Stage::Absent) | None => Ok(None),
        }
    }
}

#[async_trait]
impl LoadBalancerProvider for InMemoryProvider {
    async fn get_load_balancer(&self, id: &str) -> ProviderResult<Option<LoadBalancer>> {
        validate_id(id)?;
        Ok(self
            .lookup(&format!("loadbalancers/{id}"))?
            .filter(|g| g.load_balancer.id == id)
            .map(|g| g.load_balancer.clone()))
    }

    async fn find_load_balancer(&self, name: &str) -> ProviderResult<Option<LoadBalancer>> {
        if name.is_empty() {
            return Err(ProviderError::InvalidIdentifier(name.to_string()));
        }
        Ok(self
            .lookup("loadbalancers")?
            .filter(|g| g.load_balancer.name == name)
            .map(|g| g.load_balancer.clone()))
    }

    async fn list_listeners(&self, lb_id: &str) -> ProviderResult<Vec<Listener>> {
        validate_id(lb_id)?;
        let resource = format!("loadbalancers/{lb_id}/listeners");
        match self.graph_for(&resource)? {
            Some(graph) if graph.load_balancer.id == lb_id => Ok(graph.listeners.clone()),
            _ => Err(ProviderError::NotFound(resource)),
        }
    }

    async fn list_pools(&self, lb_id: &str) -> ProviderResult<Vec<Pool>> {
        validate_id(lb_id)?;
        let resource = format!("loadbalancers/{lb_id}/pools");
        match self.graph_for(&resource)? {
            Some(graph) if graph.load_balancer.id == lb_id => Ok(graph.pools.clone()),
            _ => Err(ProviderError::NotFound(resource)),
        }
    }

    async fn list_members(&self, pool_id: &str) -> ProviderResult<Vec<Member>> {
        validate_id(pool_id)?;
        let resource = format!("pools/{pool_id}/members");
        let graph = self.graph_for(&resource)?;
        let known: HashSet<&str> = graph
            .map(|g| g.pools.iter().map(|p| p.id.as_str()).collect())
            .unwrap_or_default();
        if !known.contains(pool_id) {
            return Err(ProviderError::NotFound(resource));
        }
        Ok(graph
            .map(|g| {
                g.members
                    .iter()
                    .filter(|m| m.pool_id == pool_id)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_port_graph() -> Graph {
        Graph::new("lb-1", "web")
            .with_listener("TCP", 80, "TCP", &["10.0.0.1", "10.0.0.2"], 30080)
            .with_listener("TCP", 443, "TCP", &["10.0.0.1", "10.0.0.2"], 30443)
    }

    #[tokio::test]
    async fn test_fixed_graph() {
        let provider = InMemoryProvider::fixed(two_port_graph());
        let lb = provider.get_load_balancer("lb-1").await.unwrap().unwrap();
        assert_eq!(lb.name, "web");

        let listeners = provider.list_listeners("lb-1").await.unwrap();
        assert_eq!(listeners.len(), 2);

        let pools = provider.list_pools("lb-1").await.unwrap();
        let ids: Vec<String> = pools.iter().map(|p| p.id.clone()).collect();
        assert_eq!(provider.count_members(&ids).await.unwrap(), 4);
    }

    #[tokio::test]
    async fn test_stages_advance_per_lookup() {
        let provider = InMemoryProvider::sequenced(vec![
            Stage::Fail(Fault::Unreachable),
            Stage::Absent,
            Stage::Present(two_port_graph()),
        ]);

        assert!(provider.get_load_balancer("lb-1").await.is_err());
        assert!(provider.get_load_balancer("lb-1").await.unwrap().is_none());
        assert!(provider.get_load_balancer("lb-1").await.unwrap().is_some());
        // last stage repeats
        assert!(provider.find_load_balancer("web").await.unwrap().is_some());
        assert_eq!(provider.lookups(), 4);
    }

    #[tokio::test]
    async fn test_fault_status_is_classified() {
        let provider = InMemoryProvider::sequenced(vec![Stage::Fail(Fault::Status(403))]);
        let err = provider.get_load_balancer("lb-1").await.unwrap_err();
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn test_unknown_pool_is_not_found() {
        let provider = InMemoryProvider::fixed(two_port_graph());
        provider.get_load_balancer("lb-1").await.unwrap();
        let err = provider.list_members("nope").await.unwrap_err();
        assert!(matches!(err, ProviderError::NotFound(_)));
    }
}
