//! Error types for load balancer verification

use std::time::Duration;

use thiserror::Error;

use crate::expectation::TopologyDiff;
use crate::lifecycle::{LifecycleState, ObservedSignal, Scenario};
use crate::poller::TopologySnapshot;
use crate::provider::ProviderError;
use crate::verifier::VerificationFailure;

#[derive(Error, Debug)]
pub enum Error {
    /// The event subscription could not be established (RBAC denial, API server down)
    #[error("WatchSetupError: cannot watch events in {scope}: {source}")]
    WatchSetup {
        scope: String,
        #[source]
        source: kube::Error,
    },

    /// The event stream closed before the lifecycle reached a terminal state
    #[error("event stream for {target} ended in state {state}")]
    WatchStreamEnded {
        target: String,
        state: LifecycleState,
    },

    /// The resource graph did not match the expectation before the deadline
    #[error(
        "ConvergenceTimeoutError: load balancer {load_balancer} did not converge after {attempts} attempt(s) in {elapsed:?}{}",
        describe_last(.last_snapshot.as_deref(), .last_diff.as_ref(), .last_error.as_deref())
    )]
    ConvergenceTimeout {
        load_balancer: String,
        attempts: u32,
        elapsed: Duration,
        last_snapshot: Option<Box<TopologySnapshot>>,
        last_diff: Option<TopologyDiff>,
        last_error: Option<String>,
    },

    /// Non-retryable provider failure
    #[error("FatalProviderError: load balancer {load_balancer}: {source}")]
    FatalProvider {
        load_balancer: String,
        #[source]
        source: ProviderError,
    },

    /// The expected terminal signal did not arrive before the deadline
    #[error("{scenario} of {target} did not reach {expected} in {elapsed:?} (last state {state}, {} signal(s) seen)", .observed.len())]
    SignalTimeout {
        scenario: Scenario,
        target: String,
        expected: LifecycleState,
        state: LifecycleState,
        elapsed: Duration,
        observed: Vec<ObservedSignal>,
    },

    /// The controller reported a failure, or the lifecycle skipped past the expected state
    #[error("{scenario} of {target} failed in state {state}: {reason}: {message}")]
    LifecycleFailed {
        scenario: Scenario,
        target: String,
        state: LifecycleState,
        reason: String,
        message: String,
    },

    /// Combined verification failure naming the dimensions that did not converge
    #[error("{0}")]
    VerificationFailed(Box<VerificationFailure>),

    /// Service annotation could not be interpreted
    #[error("invalid annotation {key}={value:?}: {reason}")]
    InvalidAnnotation {
        key: String,
        value: String,
        reason: String,
    },

    /// Service or Pod object is missing data the expectation needs
    #[error("invalid spec: {0}")]
    InvalidSpec(String),

    #[error("configuration error: {0}")]
    ConfigError(String),

    #[error("Kubernetes API error: {0}")]
    KubeError(#[from] kube::Error),

    #[error("serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

impl Error {
    /// Errors that end a verification immediately, cancelling the other dimension
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::WatchSetup { .. }
                | Self::FatalProvider { .. }
                | Self::LifecycleFailed { .. }
                | Self::KubeError(_)
        )
    }

    /// Last snapshot attached to a convergence timeout
    pub fn last_snapshot(&self) -> Option<&TopologySnapshot> {
        match self {
            Self::ConvergenceTimeout { last_snapshot, .. } => last_snapshot.as_deref(),
            Self::VerificationFailed(failure) => failure.last_snapshot.as_ref(),
            _ => None,
        }
    }
}

fn describe_last(
    snapshot: Option<&TopologySnapshot>,
    diff: Option<&TopologyDiff>,
    error: Option<&str>,
) -> String {
    let mut out = String::new();
    if let Some(snapshot) = snapshot {
        out.push_str(&format!("; last observed {}", snapshot.counts()));
    }
    if let Some(diff) = diff {
        out.push_str(&format!("; {diff}"));
    }
    if let Some(error) = error {
        out.push_str(&format!("; last error: {error}"));
    }
    out
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expectation::Mismatch;

    #[test]
    fn test_convergence_timeout_mentions_last_counts() {
        let err = Error::ConvergenceTimeout {
            load_balancer: "id=lb-1".to_string(),
            attempts: 4,
            elapsed: Duration::from_secs(30),
            last_snapshot: Some(Box::new(TopologySnapshot::absent())),
            last_diff: Some(TopologyDiff {
                mismatches: vec![Mismatch::Listeners {
                    expected: 2,
                    observed: 0,
                }],
            }),
            last_error: Some("provider unavailable: reset".to_string()),
        };
        let msg = err.to_string();
        assert!(msg.starts_with("ConvergenceTimeoutError"));
        assert!(msg.contains("4 attempt(s)"));
        assert!(msg.contains("listeners=0"));
        assert!(msg.contains("listeners: expected 2, observed 0"));
        assert!(msg.contains("provider unavailable"));
        assert!(!err.is_fatal());
        assert!(err.last_snapshot().is_some());
    }

    #[test]
    fn test_fatal_classification() {
        let fatal = Error::FatalProvider {
            load_balancer: "id=lb-1".to_string(),
            source: ProviderError::InvalidIdentifier(String::new()),
        };
        assert!(fatal.is_fatal());
        assert!(fatal.to_string().starts_with("FatalProviderError"));

        let timeout = Error::SignalTimeout {
            scenario: Scenario::Provision,
            target: "Service/default/web".to_string(),
            expected: LifecycleState::Ensured,
            state: LifecycleState::Ensuring,
            elapsed: Duration::from_secs(5),
            observed: vec![],
        };
        assert!(!timeout.is_fatal());
        assert!(timeout.to_string().contains("did not reach Ensured"));
    }
}
