//! Provisioning verification
//!
//! A verification waits for the controller's terminal lifecycle signal and, at the same
//! time, polls the provider until the resource graph matches the expectation. Both run
//! under one deadline and succeed only together; a premature `Ensured` with a graph that
//! never converges is a failure, and a graph that matched before the terminal signal is
//! polled again so the match holds at or after the signal. A fatal error on either side (watch setup, provider
//! authentication, an `Error` signal) ends the run at once and drops the other side.

pub mod report;


use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::StreamExt;
use tracing::{debug, info, instrument, warn};

use crate::config::VerifierConfig;
use crate::error::{Error, Result};
use crate::expectation::{ExpectedTopology, TopologyDiff};
use crate::lifecycle::{
    LifecycleState, LifecycleTracker, ObjectRef, ObservedSignal, Progress, Scenario,
};
use crate::poller::{PollOutcome, ResourceGraphPoller, TopologySnapshot};
use crate::provider::{LoadBalancerProvider, LoadBalancerRef};
use crate::retry::{Clock, RetryPolicy, TokioClock};
use crate::watcher::SignalStream;

pub use report::{Dimension, VerificationFailure, VerificationReport};

/// Everything a verification run depends on, passed explicitly per test case
#[derive(Clone)]
pub struct VerificationContext {
    pub provider: Arc<dyn LoadBalancerProvider>,
    pub clock: Arc<dyn Clock>,
    pub policy: RetryPolicy,
    /// Default deadline for `verify_provisioned` / `verify_deleted`
    pub timeout: Duration,
}

impl VerificationContext {
    pub fn new(
        provider: Arc<dyn LoadBalancerProvider>,
        clock: Arc<dyn Clock>,
        policy: RetryPolicy,
        timeout: Duration,
    ) -> Self {
        Self {
            provider,
            clock,
            policy,
            timeout,
        }
    }

    /// Context against the configured HTTP provider, on the tokio clock
    pub fn from_config(config: &VerifierConfig) -> Result<Self> {
        config.validate()?;
        let provider = config.http_provider()?;
        Ok(Self::new(
            Arc::new(provider),
            Arc::new(TokioClock),
            config.retry_policy(),
            config.timeout(),
        ))
    }
}

/// What a verification checks
#[derive(Clone, Debug, PartialEq)]
pub struct VerificationRequest {
    pub scenario: Scenario,
    /// Object whose events carry the lifecycle signals
    pub target: ObjectRef,
    pub load_balancer: LoadBalancerRef,
    pub expected: ExpectedTopology,
}

impl VerificationRequest {
    pub fn provision(
        target: ObjectRef,
        load_balancer: LoadBalancerRef,
        expected: ExpectedTopology,
    ) -> Self {
        Self {
            scenario: Scenario::Provision,
            target,
            load_balancer,
            expected,
        }
    }

    /// Deletion: expects `Deleted` and an absent load balancer
    pub fn teardown(target: ObjectRef, load_balancer: LoadBalancerRef) -> Self {
        Self {
            scenario: Scenario::Teardown,
            target,
            load_balancer,
            expected: ExpectedTopology::absent(),
        }
    }
}

/// Terminal signal reached by the signal side
#[derive(Clone, Debug, PartialEq)]
pub struct SignalOutcome {
    pub state: LifecycleState,
    pub signals: Vec<ObservedSignal>,
    pub elapsed: Duration,
}

pub struct Verifier {
    ctx: VerificationContext,
    poller: ResourceGraphPoller,
}

impl Verifier {
    pub fn new(ctx: VerificationContext) -> Self {
        let poller = ResourceGraphPoller::new(
            ctx.provider.clone(),
            ctx.clock.clone(),
            ctx.policy.clone(),
        );
        Self { ctx, poller }
    }

    pub fn context(&self) -> &VerificationContext {
        &self.ctx
    }

    pub fn poller(&self) -> &ResourceGraphPoller {
        &self.poller
    }

    /// Consume `signals` until the scenario's terminal state, a failure, or the deadline
    #[instrument(skip(self, signals), fields(target = %target))]
    pub async fn await_signal(
        &self,
        scenario: Scenario,
        target: &ObjectRef,
        signals: &mut SignalStream,
        deadline: Instant,
    ) -> Result<SignalOutcome> {
        let started = self.ctx.clock.now();
        let mut tracker = LifecycleTracker::new(scenario);

        loop {
            let remaining = self.ctx.clock.remaining(deadline);
            let next = tokio::select! {
                biased;
                next = signals.next() => next,
                _ = self.ctx.clock.sleep(remaining) => {
                    return Err(Error::SignalTimeout {
                        scenario,
                        target: target.to_string(),
                        expected: scenario.expected_state(),
                        state: tracker.state(),
                        elapsed: self.ctx.clock.now().saturating_duration_since(started),
                        observed: tracker.history().to_vec(),
                    });
                }
            };

            let Some(observed) = next else {
                return Err(Error::WatchStreamEnded {
                    target: target.to_string(),
                    state: tracker.state(),
                });
            };

            match tracker.observe(observed) {
                Progress::Pending => {}
                Progress::Reached => {
                    let elapsed = self.ctx.clock.now().saturating_duration_since(started);
                    info!(
                        "{} of {} reached {} after {:?}",
                        scenario,
                        target,
                        tracker.state(),
                        elapsed
                    );
                    return Ok(SignalOutcome {
                        state: tracker.state(),
                        signals: tracker.history().to_vec(),
                        elapsed,
                    });
                }
                Progress::Failed | Progress::Diverged => {
                    let (reason, message) = tracker
                        .last_signal()
                        .map(|s| (s.reason.clone(), s.message.clone()))
                        .unwrap_or_default();
                    warn!(
                        "{} of {} failed in state {}: {}",
                        scenario,
                        target,
                        tracker.state(),
                        reason
                    );
                    return Err(Error::LifecycleFailed {
                        scenario,
                        target: target.to_string(),
                        state: tracker.state(),
                        reason,
                        message,
                    });
                }
            }
        }
    }

    /// Run both dimensions concurrently under `deadline`
    #[instrument(
        skip(self, request, signals),
        fields(scenario = %request.scenario, target = %request.target, lb = %request.load_balancer)
    )]
    pub async fn verify(
        &self,
        request: &VerificationRequest,
        mut signals: SignalStream,
        deadline: Instant,
    ) -> Result<VerificationReport> {
        let started = self.ctx.clock.now();

        let signal_side =
            self.await_signal(request.scenario, &request.target, &mut signals, deadline);
        let topology_side =
            self.poller
                .poll_until_converged(&request.load_balancer, &request.expected, deadline);
        tokio::pin!(signal_side);
        tokio::pin!(topology_side);

        let (signal_result, topology_result) = tokio::select! {
            res = &mut signal_side => match res {
                Err(e) if e.is_fatal() => return Err(e),
                res => (res, topology_side.await),
            },
            res = &mut topology_side => match res {
                Err(e) if e.is_fatal() => return Err(e),
                Ok(early) => {
                    let signal_result = signal_side.await;
                    let topology_result = match &signal_result {
                        Ok(_) => self.reconfirm(request, early, deadline).await,
                        Err(_) => Ok(early),
                    };
                    (signal_result, topology_result)
                }
                res => (signal_side.await, res),
            },
        };

        let elapsed = self.ctx.clock.now().saturating_duration_since(started);
        match (signal_result, topology_result) {
            (Ok(signal), Ok(poll)) => {
                info!(
                    "{} of {} verified in {:?}: {}",
                    request.scenario,
                    request.target,
                    elapsed,
                    poll.snapshot.counts()
                );
                Ok(VerificationReport {
                    scenario: request.scenario,
                    target: request.target.to_string(),
                    load_balancer: request.load_balancer.to_string(),
                    state: signal.state,
                    signals: signal.signals,
                    snapshot: poll.snapshot,
                    poll_attempts: poll.attempts,
                    elapsed,
                })
            }
            (signal_result, topology_result) => {
                // a fatal error may still surface from the side awaited second
                let signal_result = match signal_result {
                    Err(e) if e.is_fatal() => return Err(e),
                    other => other,
                };
                let topology_result = match topology_result {
                    Err(e) if e.is_fatal() => return Err(e),
                    other => other,
                };
                let failure = combine_failure(request, signal_result, topology_result, elapsed);
                warn!("{}", failure);
                Err(Error::VerificationFailed(Box::new(failure)))
            }
        }
    }

    /// Poll again once the terminal signal is in: a graph that matched before the
    /// signal only counts if a snapshot taken afterwards still matches.
    async fn reconfirm(
        &self,
        request: &VerificationRequest,
        early: PollOutcome,
        deadline: Instant,
    ) -> Result<PollOutcome> {
        debug!(
            "Graph of {} matched before the terminal signal, polling again",
            request.load_balancer
        );
        let confirmed = self
            .poller
            .poll_until_converged(&request.load_balancer, &request.expected, deadline)
            .await?;
        Ok(PollOutcome {
            attempts: early.attempts + confirmed.attempts,
            ..confirmed
        })
    }

    /// Provisioning check with the context's default timeout
    pub async fn verify_provisioned(
        &self,
        target: ObjectRef,
        signals: SignalStream,
        load_balancer: LoadBalancerRef,
        expected: ExpectedTopology,
    ) -> Result<VerificationReport> {
        let deadline = self.ctx.clock.now() + self.ctx.timeout;
        let request = VerificationRequest::provision(target, load_balancer, expected);
        self.verify(&request, signals, deadline).await
    }

    /// Teardown check with the context's default timeout
    pub async fn verify_deleted(
        &self,
        target: ObjectRef,
        signals: SignalStream,
        load_balancer: LoadBalancerRef,
    ) -> Result<VerificationReport> {
        let deadline = self.ctx.clock.now() + self.ctx.timeout;
        let request = VerificationRequest::teardown(target, load_balancer);
        self.verify(&request, signals, deadline).await
    }
}

fn combine_failure(
    request: &VerificationRequest,
    signal_result: Result<SignalOutcome>,
    topology_result: Result<PollOutcome>,
    elapsed: Duration,
) -> VerificationFailure {
    let mut failed = Vec::new();
    let mut signal_error = None;
    let mut topology_error = None;
    let mut last_snapshot: Option<TopologySnapshot> = None;
    let mut last_diff: Option<TopologyDiff> = None;

    let state = match signal_result {
        Ok(outcome) => outcome.state,
        Err(e) => {
            failed.push(Dimension::Signal);
            let state = match &e {
                Error::SignalTimeout { state, .. } | Error::WatchStreamEnded { state, .. } => {
                    *state
                }
                _ => LifecycleState::Unobserved,
            };
            signal_error = Some(e.to_string());
            state
        }
    };

    match topology_result {
        Ok(outcome) => last_snapshot = Some(outcome.snapshot),
        Err(e) => {
            failed.push(Dimension::Topology);
            topology_error = Some(e.to_string());
            if let Error::ConvergenceTimeout {
                last_snapshot: snapshot,
                last_diff: diff,
                ..
            } = e
            {
                last_snapshot = snapshot.map(|s| *s);
                last_diff = diff;
            }
        }
    }

    VerificationFailure {
        scenario: request.scenario,
        target: request.target.to_string(),
        load_balancer: request.load_balancer.to_string(),
        failed,
        state,
        signal_error,
        topology_error,
        last_snapshot,
        last_diff,
        elapsed,
    }
}
