//! HTTP client for the cloud load balancer API
//!
//! Speaks the Octavia-style REST layout most OpenStack-derived providers expose:
//!
//! - `GET {base}/loadbalancers?name={name}`
//! - `GET {base}/loadbalancers/{id}`
//! - `GET {base}/loadbalancers/{id}/listeners`
//! - `GET {base}/loadbalancers/{id}/pools`
//! - `GET {base}/pools/{id}/members`
//!
//! Every call is a fresh request. Nothing is cached between polls.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::debug;

use super::error::{validate_id, ProviderError, ProviderResult};
use super::types::{Listener, LoadBalancer, Member, Pool};
use super::LoadBalancerProvider;

/// Header carrying the provider API token
pub const AUTH_TOKEN_HEADER: &str = "X-Auth-Token";

#[derive(Deserialize)]
struct LoadBalancerEnvelope {
    loadbalancer: LoadBalancer,
}

#[derive(Deserialize)]
struct LoadBalancersEnvelope {
    #[serde(default)]
    loadbalancers: Vec<LoadBalancer>,
}

#[derive(Deserialize)]
struct ListenersEnvelope {
    #[serde(default)]
    listeners: Vec<Listener>,
}

#[derive(Deserialize)]
struct PoolsEnvelope {
    #[serde(default)]
    pools: Vec<Pool>,
}

#[derive(Deserialize)]
struct MembersEnvelope {
    #[serde(default)]
    members: Vec<Member>,
}

/// Read-only client for the provider's load balancer endpoints
#[derive(Clone)]
pub struct HttpProvider {
    http_client: Client,
    base_url: String,
    token: Option<String>,
}

impl fmt::Debug for HttpProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpProvider")
            .field("base_url", &self.base_url)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl HttpProvider {
    /// Create a client for `base_url` with a per-request timeout
    pub fn new(base_url: &str, token: Option<String>, timeout: Duration) -> ProviderResult<Self> {
        let http_client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("ccm-e2e/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            http_client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// GET a JSON document. `Ok(None)` on 404.
    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> ProviderResult<Option<T>> {
        let url = format!("{}{}", self.base_url, path);
        debug!("GET {}", url);

        let mut request = self.http_client.get(&url);
        if !query.is_empty() {
            request = request.query(query);
        }
        if let Some(token) = &self.token {
            request = request.header(AUTH_TOKEN_HEADER, token);
        }

        let response = request.send().await?;
        let status = response.status();

        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Status {
                status: status.as_u16(),
                url,
                body,
            });
        }

        let bytes = response.bytes().await?;
        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|e| ProviderError::Malformed(format!("{url}: {e}")))
    }

    /// GET a collection that must exist
    async fn get_collection<T: DeserializeOwned>(&self, path: &str) -> ProviderResult<T> {
        self.get_json(path, &[])
            .await?
            .ok_or_else(|| ProviderError::NotFound(path.to_string()))
    }
}

#[async_trait]
impl LoadBalancerProvider for HttpProvider {
    async fn get_load_balancer(&self, id: &str) -> ProviderResult<Option<LoadBalancer>> {
        validate_id(id)?;
        let envelope: Option<LoadBalancerEnvelope> = self
            .get_json(&format!("/loadbalancers/{id}"), &[])
            .await?;
        Ok(envelope.map(|e| e.loadbalancer))
    }

    async fn find_load_balancer(&self, name: &str) -> ProviderResult<Option<LoadBalancer>> {
        if name.is_empty() {
            return Err(ProviderError::InvalidIdentifier(name.to_string()));
        }
        let envelope: Option<LoadBalancersEnvelope> =
            self.get_json("/loadbalancers", &[("name", name)]).await?;

        // Some providers treat `name` as a prefix filter
        Ok(envelope.and_then(|e| e.loadbalancers.into_iter().find(|lb| lb.name == name)))
    }

    async fn list_listeners(&self, lb_id: &str) -> ProviderResult<Vec<Listener>> {
        validate_id(lb_id)?;
        let envelope: ListenersEnvelope = self
            .get_collection(&format!("/loadbalancers/{lb_id}/listeners"))
            .await?;

        Ok(envelope
            .listeners
            .into_iter()
            .map(|mut listener| {
                if listener.load_balancer_id.is_empty() {
                    listener.load_balancer_id = lb_id.to_string();
                }
                listener
            })
            .collect())
    }

    async fn list_pools(&self, lb_id: &str) -> ProviderResult<Vec<Pool>> {
        validate_id(lb_id)?;
        let envelope: PoolsEnvelope = self
            .get_collection(&format!("/loadbalancers/{lb_id}/pools"))
            .await?;
        Ok(envelope.pools)
    }

    async fn list_members(&self, pool_id: &str) -> ProviderResult<Vec<Member>> {
        validate_id(pool_id)?;
        let envelope: MembersEnvelope = self
            .get_collection(&format!("/pools/{pool_id}/members"))
            .await?;

        Ok(envelope
            .members
            .into_iter()
            .map(|mut member| {
                if member.pool_id.is_empty() {
                    member.pool_id = pool_id.to_string();
                }
                member
            })
            .collect())
    }
}
