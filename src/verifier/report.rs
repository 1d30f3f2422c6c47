//! Verification outcomes

use std::fmt;
use std::time::Duration;

use serde::Serialize;

use crate::expectation::TopologyDiff;
use crate::lifecycle::{LifecycleState, ObservedSignal, Scenario};
use crate::poller::TopologySnapshot;

/// Independent dimension of a verification
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum Dimension {
    /// The controller's lifecycle signals
    Signal,
    /// The provider's resource graph
    Topology,
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Signal => f.write_str("signal"),
            Self::Topology => f.write_str("topology"),
        }
    }
}

/// Both dimensions converged
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct VerificationReport {
    pub scenario: Scenario,
    pub target: String,
    pub load_balancer: String,
    /// Terminal lifecycle state reached
    pub state: LifecycleState,
    pub signals: Vec<ObservedSignal>,
    /// The converged snapshot
    pub snapshot: TopologySnapshot,
    pub poll_attempts: u32,
    pub elapsed: Duration,
}

/// At least one dimension did not converge before the deadline
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct VerificationFailure {
    pub scenario: Scenario,
    pub target: String,
    pub load_balancer: String,
    /// Dimensions that did not converge, signal first
    pub failed: Vec<Dimension>,
    /// Lifecycle state when the run ended
    pub state: LifecycleState,
    pub signal_error: Option<String>,
    pub topology_error: Option<String>,
    /// Last snapshot fetched, converged or not
    pub last_snapshot: Option<TopologySnapshot>,
    pub last_diff: Option<TopologyDiff>,
    pub elapsed: Duration,
}

impl VerificationFailure {
    pub fn failed_on(&self, dimension: Dimension) -> bool {
        self.failed.contains(&dimension)
    }
}

impl fmt::Display for VerificationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let failed: Vec<String> = self.failed.iter().map(ToString::to_string).collect();
        write!(
            f,
            "VerificationFailed: {} of {} (load balancer {}) did not converge on {} after {:?}; lifecycle state {}",
            self.scenario,
            self.target,
            self.load_balancer,
            failed.join(" and "),
            self.elapsed,
            self.state
        )?;
        if let Some(snapshot) = &self.last_snapshot {
            write!(f, "; last observed {}", snapshot.counts())?;
        }
        if let Some(diff) = &self.last_diff {
            write!(f, "; {diff}")?;
        }
        if let Some(e) = &self.signal_error {
            write!(f, "; signal: {e}")?;
        }
        if let Some(e) = &self.topology_error {
            write!(f, "; topology: {e}")?;
        }
        Ok(())
    }
}
