//! Cloud load balancer resource graph as returned by the provider API

use std::fmt;

use serde::{Deserialize, Serialize};

/// Load balancer owned by the cloud provider
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadBalancer {
    pub id: String,
    #[serde(default)]
    pub name: String,
    /// Provisioning state (ACTIVE, PENDING_CREATE, PENDING_UPDATE, ERROR, ...)
    #[serde(default)]
    pub provisioning_status: String,
    #[serde(default)]
    pub operating_status: String,
    /// "internal" or "external"
    #[serde(default)]
    pub network_type: Option<String>,
    #[serde(default)]
    pub vip_address: Option<String>,
}

/// Listener attached to a load balancer
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Listener {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub load_balancer_id: String,
    pub protocol: String,
    #[serde(alias = "protocol_port")]
    pub port: u16,
}

/// Backend pool attached to a listener
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pool {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub listener_id: String,
    pub protocol: String,
    #[serde(default)]
    pub lb_algorithm: Option<String>,
}

/// Pool member pointing at one backend
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    pub id: String,
    #[serde(default)]
    pub pool_id: String,
    pub address: String,
    #[serde(alias = "protocol_port")]
    pub port: u16,
    #[serde(default = "default_weight")]
    pub weight: u32,
}

fn default_weight() -> u32 {
    1
}

/// How a test scenario identifies the load balancer under test
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum LoadBalancerRef {
    Id(String),
    /// Display name, resolved against the provider on every poll
    Name(String),
}

impl fmt::Display for LoadBalancerRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Id(id) => write!(f, "id={id}"),
            Self::Name(name) => write!(f, "name={name}"),
        }
    }
}
