//! Lifecycle correlation for load balancer provisioning
//!
//! This module contains:
//! - The reason → [`LifecycleSignal`] lookup table
//! - The forward-only provisioning state machine
//! - A tracker that folds an observed signal sequence into progress for a scenario

pub mod signal;
pub mod state;

pub use signal::{LifecycleSignal, ObjectRef, ObservedSignal};
pub use state::{LifecycleState, LifecycleTracker, Progress, Scenario, Transition};
