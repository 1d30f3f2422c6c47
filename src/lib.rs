//! ccm-e2e: provisioning verification for cloud-controller-manager load balancers
//!
//! This crate checks that a cloud-controller-manager turns a Kubernetes `LoadBalancer`
//! Service into the right cloud resource graph (load balancer, listeners, pools,
//! members) and tears it down again. A verification runs two things concurrently under
//! one deadline:
//!
//! - [`watcher::EventWatcher`] follows the controller's Events and classifies them into
//!   lifecycle signals, folded by [`lifecycle::LifecycleTracker`]
//! - [`poller::ResourceGraphPoller`] polls the provider until the graph matches the
//!   [`expectation::ExpectedTopology`] derived from the Service and its ready Pods
//!
//! [`verifier::Verifier`] combines both and only succeeds when both converge.

pub mod config;
pub mod error;
pub mod expectation;
pub mod fixtures;
pub mod lifecycle;
pub mod poller;
pub mod provider;
pub mod retry;
pub mod telemetry;
pub mod verifier;
pub mod watcher;

pub use crate::error::{Error, Result};
