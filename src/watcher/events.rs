//! Classification of Kubernetes Events into lifecycle signals

use chrono::{DateTime, Utc};
use futures::{Stream, StreamExt};
use k8s_openapi::api::core::v1::Event;

use crate::lifecycle::{ObjectRef, ObservedSignal};

/// Slack subtracted from a local `since` before comparing it with event timestamps,
/// which come from the API server's clock truncated to whole seconds
pub const SINCE_SKEW_ALLOWANCE_SECS: i64 = 5;

/// Cutoff applied to event timestamps for a `since` taken on the local clock
pub fn since_cutoff(local: DateTime<Utc>) -> DateTime<Utc> {
    local - chrono::Duration::seconds(SINCE_SKEW_ALLOWANCE_SECS)
}

/// Identity of the object whose events are followed
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TargetFilter {
    pub kind: String,
    pub name: String,
    /// When set, events for a previous incarnation of the object are dropped
    pub uid: Option<String>,
}

impl TargetFilter {
    pub fn service(name: &str) -> Self {
        Self {
            kind: "Service".to_string(),
            name: name.to_string(),
            uid: None,
        }
    }

    pub fn with_uid(mut self, uid: impl Into<String>) -> Self {
        self.uid = Some(uid.into());
        self
    }

    /// Server-side field selector for this target
    pub fn field_selector(&self) -> String {
        format!(
            "involvedObject.kind={},involvedObject.name={}",
            self.kind, self.name
        )
    }

    /// Client-side check, covering what the field selector cannot express
    pub fn accepts(&self, target: &ObjectRef) -> bool {
        if target.kind != self.kind || target.name != self.name {
            return false;
        }
        match (&self.uid, &target.uid) {
            (Some(want), Some(got)) => want == got,
            _ => true,
        }
    }
}

/// Best timestamp an event carries: last occurrence, then event time, then creation
pub fn event_timestamp(event: &Event) -> DateTime<Utc> {
    event
        .last_timestamp
        .as_ref()
        .map(|t| t.0)
        .or_else(|| event.event_time.as_ref().map(|t| t.0))
        .or_else(|| event.first_timestamp.as_ref().map(|t| t.0))
        .or_else(|| event.metadata.creation_timestamp.as_ref().map(|t| t.0))
        .unwrap_or_else(Utc::now)
}

/// Classify an event by its reason; `None` for reasons outside the lifecycle table
pub fn classify_event(event: &Event) -> Option<ObservedSignal> {
    let reason = event.reason.as_deref()?;
    let involved = &event.involved_object;
    let target = ObjectRef {
        kind: involved.kind.clone().unwrap_or_default(),
        namespace: involved
            .namespace
            .clone()
            .or_else(|| event.metadata.namespace.clone())
            .unwrap_or_default(),
        name: involved.name.clone().unwrap_or_default(),
        uid: involved.uid.clone(),
    };
    ObservedSignal::classify(
        reason,
        event.message.as_deref().unwrap_or_default(),
        target,
        event_timestamp(event),
    )
}

/// Classify a stream of events, dropping unrelated reasons, other targets and stale events
pub fn classify_events<S>(
    events: S,
    filter: TargetFilter,
    since: Option<DateTime<Utc>>,
) -> impl Stream<Item = ObservedSignal>
where
    S: Stream<Item = Event>,
{
    events.filter_map(move |event| {
        let signal = classify_event(&event)
            .filter(|s| filter.accepts(&s.target))
            .filter(|s| since.map_or(true, |since| s.timestamp >= since));
        futures::future::ready(signal)
    })
}
