//! Provisioning state machine
//!
//! ```text
//! Unobserved -> Creating -> Ensuring -> Ensured -> Deleting -> Deleted
//!      \___________\___________\___________\__________\--> Error
//! ```
//!
//! Transitions only move forward. Intermediate states may be skipped because the
//! controller does not emit every reason on every sync (a quick reconcile goes straight
//! from nothing to `EnsuredLoadBalancer`). Repeated or backward signals are ignored, which
//! absorbs duplicate events and periodic re-syncs. `Deleted` and `Error` are terminal.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::signal::{LifecycleSignal, ObservedSignal};

/// Position of a target object in the load balancer lifecycle
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LifecycleState {
    #[default]
    Unobserved,
    Creating,
    Ensuring,
    Ensured,
    Deleting,
    Deleted,
    Error,
}

impl LifecycleState {
    fn rank(self) -> u8 {
        match self {
            Self::Unobserved => 0,
            Self::Creating => 1,
            Self::Ensuring => 2,
            Self::Ensured => 3,
            Self::Deleting => 4,
            Self::Deleted => 5,
            Self::Error => u8::MAX,
        }
    }

    /// No further transitions are possible
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Deleted | Self::Error)
    }

    /// Apply a signal, returning the resulting transition
    pub fn transition(self, signal: LifecycleSignal) -> Transition {
        if self.is_terminal() {
            return Transition::Ignored;
        }

        let next = match signal {
            LifecycleSignal::Creating => Self::Creating,
            LifecycleSignal::Ensuring => Self::Ensuring,
            LifecycleSignal::Ensured => Self::Ensured,
            LifecycleSignal::Deleting => Self::Deleting,
            LifecycleSignal::Deleted => Self::Deleted,
            LifecycleSignal::Error => Self::Error,
        };

        if next.rank() > self.rank() {
            Transition::Advanced(next)
        } else {
            Transition::Ignored
        }
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Unobserved => "Unobserved",
            Self::Creating => "Creating",
            Self::Ensuring => "Ensuring",
            Self::Ensured => "Ensured",
            Self::Deleting => "Deleting",
            Self::Deleted => "Deleted",
            Self::Error => "Error",
        };
        f.write_str(s)
    }
}

/// Result of applying one signal
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Transition {
    Advanced(LifecycleState),
    Ignored,
}

/// Operation under test, which fixes the terminal state a run must reach
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Scenario {
    /// Service created or updated; expects `Ensured`
    Provision,
    /// Service deleted; expects `Deleted`
    Teardown,
}

impl Scenario {
    pub fn expected_state(self) -> LifecycleState {
        match self {
            Self::Provision => LifecycleState::Ensured,
            Self::Teardown => LifecycleState::Deleted,
        }
    }
}

impl fmt::Display for Scenario {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Provision => f.write_str("provision"),
            Self::Teardown => f.write_str("teardown"),
        }
    }
}

/// Where a tracked run stands after the latest signal
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Progress {
    /// Expected state not reached yet
    Pending,
    /// Expected state reached
    Reached,
    /// An `Error` signal was observed
    Failed,
    /// The lifecycle moved past the expected state without stopping on it
    Diverged,
}

/// Folds a signal sequence for one scenario into a [`Progress`]
#[derive(Clone, Debug)]
pub struct LifecycleTracker {
    scenario: Scenario,
    state: LifecycleState,
    history: Vec<ObservedSignal>,
}

impl LifecycleTracker {
    pub fn new(scenario: Scenario) -> Self {
        Self {
            scenario,
            state: LifecycleState::Unobserved,
            history: Vec::new(),
        }
    }

    pub fn scenario(&self) -> Scenario {
        self.scenario
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    /// Every signal fed to the tracker, including ignored ones
    pub fn history(&self) -> &[ObservedSignal] {
        &self.history
    }

    pub fn observe(&mut self, observed: ObservedSignal) -> Progress {
        match self.state.transition(observed.signal) {
            Transition::Advanced(next) => {
                debug!(
                    "{}: {} -> {} ({})",
                    observed.target, self.state, next, observed.reason
                );
                self.state = next;
            }
            Transition::Ignored => {
                debug!(
                    "{}: ignoring {} in state {}",
                    observed.target, observed.signal, self.state
                );
            }
        }
        self.history.push(observed);
        self.progress()
    }

    pub fn progress(&self) -> Progress {
        let expected = self.scenario.expected_state();
        if self.state == expected {
            Progress::Reached
        } else if self.state == LifecycleState::Error {
            Progress::Failed
        } else if self.state.rank() > expected.rank() {
            Progress::Diverged
        } else {
            Progress::Pending
        }
    }

    /// The most recent signal, if any
    pub fn last_signal(&self) -> Option<&ObservedSignal> {
        self.history.last()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::ObjectRef;
    use chrono::Utc;

    fn observed(signal: LifecycleSignal) -> ObservedSignal {
        let reason = match signal {
            LifecycleSignal::Creating => "CreatingLoadBalancer",
            LifecycleSignal::Ensuring => "EnsuringLoadBalancer",
            LifecycleSignal::Ensured => "EnsuredLoadBalancer",
            LifecycleSignal::Deleting => "DeletingLoadBalancer",
            LifecycleSignal::Deleted => "DeletedLoadBalancer",
            LifecycleSignal::Error => "SyncLoadBalancerFailed",
        };
        ObservedSignal {
            signal,
            target: ObjectRef::service("default", "web"),
            reason: reason.to_string(),
            message: String::new(),
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_forward_transitions() {
        use LifecycleSignal as S;
        use LifecycleState as L;

        assert_eq!(L::Unobserved.transition(S::Creating), Transition::Advanced(L::Creating));
        assert_eq!(L::Creating.transition(S::Ensuring), Transition::Advanced(L::Ensuring));
        assert_eq!(L::Ensuring.transition(S::Ensured), Transition::Advanced(L::Ensured));
        assert_eq!(L::Ensured.transition(S::Deleting), Transition::Advanced(L::Deleting));
        assert_eq!(L::Deleting.transition(S::Deleted), Transition::Advanced(L::Deleted));
        // skipped intermediate states
        assert_eq!(L::Unobserved.transition(S::Ensured), Transition::Advanced(L::Ensured));
        assert_eq!(L::Unobserved.transition(S::Deleting), Transition::Advanced(L::Deleting));
    }

    #[test]
    fn test_backward_and_repeated_signals_are_ignored() {
        use LifecycleSignal as S;
        use LifecycleState as L;

        assert_eq!(L::Ensured.transition(S::Ensuring), Transition::Ignored);
        assert_eq!(L::Ensured.transition(S::Ensured), Transition::Ignored);
        assert_eq!(L::Deleting.transition(S::Creating), Transition::Ignored);
    }

    #[test]
    fn test_error_is_reachable_from_non_terminal_and_terminal() {
        use LifecycleSignal as S;
        use LifecycleState as L;

        for state in [L::Unobserved, L::Creating, L::Ensuring, L::Ensured, L::Deleting] {
            assert_eq!(state.transition(S::Error), Transition::Advanced(L::Error));
        }
        assert!(L::Error.is_terminal());
        assert_eq!(L::Error.transition(S::Ensured), Transition::Ignored);
        assert_eq!(L::Deleted.transition(S::Error), Transition::Ignored);
    }

    #[test]
    fn test_tracker_provision_reaches_ensured() {
        let mut tracker = LifecycleTracker::new(Scenario::Provision);
        assert_eq!(tracker.progress(), Progress::Pending);
        assert_eq!(tracker.observe(observed(LifecycleSignal::Ensuring)), Progress::Pending);
        assert_eq!(tracker.observe(observed(LifecycleSignal::Ensured)), Progress::Reached);
        assert_eq!(tracker.state(), LifecycleState::Ensured);
        assert_eq!(tracker.history().len(), 2);
    }

    #[test]
    fn test_tracker_teardown_passes_through_ensured() {
        let mut tracker = LifecycleTracker::new(Scenario::Teardown);
        // stale Ensured from the creation half of the test
        assert_eq!(tracker.observe(observed(LifecycleSignal::Ensured)), Progress::Pending);
        assert_eq!(tracker.observe(observed(LifecycleSignal::Deleting)), Progress::Pending);
        assert_eq!(tracker.observe(observed(LifecycleSignal::Deleted)), Progress::Reached);
    }

    #[test]
    fn test_tracker_error_fails() {
        let mut tracker = LifecycleTracker::new(Scenario::Provision);
        tracker.observe(observed(LifecycleSignal::Ensuring));
        assert_eq!(tracker.observe(observed(LifecycleSignal::Error)), Progress::Failed);
        // terminal: later success does not revive the run
        assert_eq!(tracker.observe(observed(LifecycleSignal::Ensured)), Progress::Failed);
    }

    #[test]
    fn test_tracker_provision_diverges_on_delete() {
        let mut tracker = LifecycleTracker::new(Scenario::Provision);
        assert_eq!(tracker.observe(observed(LifecycleSignal::Deleting)), Progress::Diverged);
    }
}
