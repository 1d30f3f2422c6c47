//! Lifecycle signals emitted by the service controller
//!
//! The cloud-controller-manager records Kubernetes Events against the Service it is
//! reconciling. Only the `reason` field carries meaning for verification; it is mapped
//! through a fixed table into a [`LifecycleSignal`]. Reasons outside the table are
//! ignored, never surfaced as errors.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Event reasons recorded by the service controller
pub const REASON_CREATING: &str = "CreatingLoadBalancer";
pub const REASON_ENSURING: &str = "EnsuringLoadBalancer";
pub const REASON_ENSURED: &str = "EnsuredLoadBalancer";
pub const REASON_DELETING: &str = "DeletingLoadBalancer";
pub const REASON_DELETED: &str = "DeletedLoadBalancer";
pub const REASON_SYNC_FAILED: &str = "SyncLoadBalancerFailed";
pub const REASON_DELETE_FAILED: &str = "DeleteLoadBalancerFailed";

/// Normalized provisioning signal derived from an event reason
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LifecycleSignal {
    Creating,
    Ensuring,
    Ensured,
    Deleting,
    Deleted,
    Error,
}

impl LifecycleSignal {
    /// Map an event reason to a signal.
    ///
    /// Exact, case-sensitive lookup. Returns `None` for reasons the verifier does not
    /// track (for example `Scheduled` or `UpdatedLoadBalancer` on the same Service).
    pub fn from_reason(reason: &str) -> Option<Self> {
        match reason {
            REASON_CREATING => Some(Self::Creating),
            REASON_ENSURING => Some(Self::Ensuring),
            REASON_ENSURED => Some(Self::Ensured),
            REASON_DELETING => Some(Self::Deleting),
            REASON_DELETED => Some(Self::Deleted),
            REASON_SYNC_FAILED | REASON_DELETE_FAILED => Some(Self::Error),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Creating => "Creating",
            Self::Ensuring => "Ensuring",
            Self::Ensured => "Ensured",
            Self::Deleting => "Deleting",
            Self::Deleted => "Deleted",
            Self::Error => "Error",
        }
    }
}

impl fmt::Display for LifecycleSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reference to the object an event was recorded against
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectRef {
    pub kind: String,
    pub namespace: String,
    pub name: String,
    pub uid: Option<String>,
}

impl ObjectRef {
    pub fn service(namespace: &str, name: &str) -> Self {
        Self {
            kind: "Service".to_string(),
            namespace: namespace.to_string(),
            name: name.to_string(),
            uid: None,
        }
    }
}

impl fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.namespace.is_empty() {
            write!(f, "{}/{}", self.kind, self.name)
        } else {
            write!(f, "{}/{}/{}", self.kind, self.namespace, self.name)
        }
    }
}

/// A classified event as it arrived on the watch
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ObservedSignal {
    pub signal: LifecycleSignal,
    pub target: ObjectRef,
    /// Raw reason string the signal was derived from
    pub reason: String,
    #[serde(default)]
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl ObservedSignal {
    /// Classify a raw reason; `None` when the reason is not a lifecycle reason
    pub fn classify(
        reason: &str,
        message: &str,
        target: ObjectRef,
        timestamp: DateTime<Utc>,
    ) -> Option<Self> {
        LifecycleSignal::from_reason(reason).map(|signal| Self {
            signal,
            target,
            reason: reason.to_string(),
            message: message.to_string(),
            timestamp,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reason_table() {
        assert_eq!(
            LifecycleSignal::from_reason("EnsuredLoadBalancer"),
            Some(LifecycleSignal::Ensured)
        );
        assert_eq!(
            LifecycleSignal::from_reason("DeletedLoadBalancer"),
            Some(LifecycleSignal::Deleted)
        );
        assert_eq!(
            LifecycleSignal::from_reason("EnsuringLoadBalancer"),
            Some(LifecycleSignal::Ensuring)
        );
        assert_eq!(
            LifecycleSignal::from_reason("DeletingLoadBalancer"),
            Some(LifecycleSignal::Deleting)
        );
        assert_eq!(
            LifecycleSignal::from_reason("CreatingLoadBalancer"),
            Some(LifecycleSignal::Creating)
        );
        assert_eq!(
            LifecycleSignal::from_reason("SyncLoadBalancerFailed"),
            Some(LifecycleSignal::Error)
        );
        assert_eq!(
            LifecycleSignal::from_reason("DeleteLoadBalancerFailed"),
            Some(LifecycleSignal::Error)
        );
    }

    #[test]
    fn test_unknown_reasons_are_ignored() {
        for reason in [
            "",
            "Scheduled",
            "UpdatedLoadBalancer",
            "ensuredloadbalancer",
            "EnsuredLoadBalancer ",
            "FailedMount",
        ] {
            assert_eq!(LifecycleSignal::from_reason(reason), None, "{reason:?}");
        }
    }

    #[test]
    fn test_classify_keeps_raw_reason() {
        let ts = Utc::now();
        let observed = ObservedSignal::classify(
            "EnsuredLoadBalancer",
            "Ensured load balancer",
            ObjectRef::service("default", "web"),
            ts,
        )
        .unwrap();
        assert_eq!(observed.signal, LifecycleSignal::Ensured);
        assert_eq!(observed.reason, "EnsuredLoadBalancer");
        assert_eq!(observed.target.to_string(), "Service/default/web");
        assert_eq!(observed.timestamp, ts);

        assert!(ObservedSignal::classify("Pulled", "", ObjectRef::default(), ts).is_none());
    }
}
