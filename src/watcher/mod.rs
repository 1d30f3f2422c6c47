//! Event watching for controller lifecycle signals
//!
//! Opens a watch on `core/v1` Events for one target object and turns the controller's
//! load balancer reasons into [`ObservedSignal`]s:
//! - The subscription is checked up front with a bounded list (RBAC, connectivity)
//! - Transient watch errors are logged and retried with the watcher's backoff
//! - Events with reasons outside the lifecycle table are dropped silently

pub mod events;

use chrono::{DateTime, Utc};
use futures::stream::BoxStream;
use futures::StreamExt;
use k8s_openapi::api::core::v1::Event;
use kube::api::ListParams;
use kube::runtime::{watcher, WatchStreamExt};
use kube::{Api, Client};
use tracing::{debug, info, instrument, warn};

use crate::error::{Error, Result};
use crate::lifecycle::ObservedSignal;

pub use events::{
    classify_event, classify_events, event_timestamp, since_cutoff, TargetFilter,
    SINCE_SKEW_ALLOWANCE_SECS,
};

/// Lazy, non-restartable stream of classified signals bound to one subscription
pub type SignalStream = BoxStream<'static, ObservedSignal>;

/// Watches Events recorded against a single object
pub struct EventWatcher {
    client: Client,
    namespace: String,
    target: TargetFilter,
    since: Option<DateTime<Utc>>,
}

impl EventWatcher {
    /// An empty `namespace` watches cluster-wide
    pub fn new(client: Client, namespace: &str, target: TargetFilter) -> Self {
        Self {
            client,
            namespace: namespace.to_string(),
            target,
            since: None,
        }
    }

    /// Drop events older than `timestamp`, e.g. left over from an earlier test case.
    ///
    /// `timestamp` is read on the local clock; events up to
    /// [`SINCE_SKEW_ALLOWANCE_SECS`] older are still kept to absorb server clock skew.
    pub fn since(mut self, timestamp: DateTime<Utc>) -> Self {
        self.since = Some(since_cutoff(timestamp));
        self
    }

    pub fn target(&self) -> &TargetFilter {
        &self.target
    }

    fn api(&self) -> Api<Event> {
        if self.namespace.is_empty() {
            Api::all(self.client.clone())
        } else {
            Api::namespaced(self.client.clone(), &self.namespace)
        }
    }

    fn scope(&self) -> String {
        if self.namespace.is_empty() {
            "all namespaces".to_string()
        } else {
            format!("namespace {}", self.namespace)
        }
    }

    /// Open the subscription.
    ///
    /// Fails with `WatchSetup` when the events cannot be listed with the same selector.
    #[instrument(skip(self), fields(target = %self.target.name, namespace = %self.namespace))]
    pub async fn subscribe(&self) -> Result<SignalStream> {
        let api = self.api();
        let selector = self.target.field_selector();

        api.list(&ListParams::default().fields(&selector).limit(1))
            .await
            .map_err(|source| Error::WatchSetup {
                scope: self.scope(),
                source,
            })?;

        info!(
            "Watching events for {}/{} in {}",
            self.target.kind,
            self.target.name,
            self.scope()
        );

        let target_name = self.target.name.clone();
        let events = watcher(api, watcher::Config::default().fields(&selector))
            .default_backoff()
            .applied_objects()
            .filter_map(move |res| {
                let event = match res {
                    Ok(event) => Some(event),
                    Err(e) => {
                        warn!("Event watch for {} interrupted, resuming: {}", target_name, e);
                        None
                    }
                };
                futures::future::ready(event)
            });

        let signals = classify_events(events, self.target.clone(), self.since).inspect(|s| {
            debug!("Observed {} ({}) for {}", s.signal, s.reason, s.target);
        });

        Ok(signals.boxed())
    }
}
