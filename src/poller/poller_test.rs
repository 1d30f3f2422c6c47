//! Poller tests on a virtual clock

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use super::*;
use crate::expectation::{MemberCounting, Mismatch};
use crate::provider::{Fault, Graph, InMemoryProvider, Stage};
use crate::retry::ManualClock;

// ── helpers ────────────────────────────────────────────────────────────────

fn two_port_graph() -> Graph {
    Graph::new("lb-1", "web")
        .with_listener("TCP", 80, "TCP", &["192.168.1.10", "192.168.1.11"], 30080)
        .with_listener("TCP", 443, "TCP", &["192.168.1.10", "192.168.1.11"], 30443)
}

fn expected_2_2_2() -> ExpectedTopology {
    ExpectedTopology {
        present: true,
        listeners: 2,
        pools: 2,
        members: 2,
        member_counting: MemberCounting::DistinctBackends,
        listener_ports: BTreeSet::from([("TCP".to_string(), 80), ("TCP".to_string(), 443)]),
        pool_protocols: vec!["TCP".to_string(), "TCP".to_string()],
        network_type: None,
    }
}

fn setup(stages: Vec<Stage>) -> (ResourceGraphPoller, Arc<InMemoryProvider>, Arc<ManualClock>) {
    let provider = Arc::new(InMemoryProvider::sequenced(stages));
    let clock = Arc::new(ManualClock::new());
    let poller = ResourceGraphPoller::new(
        provider.clone(),
        clock.clone(),
        RetryPolicy::fixed(Duration::from_secs(5)),
    );
    (poller, provider, clock)
}

fn lb() -> LoadBalancerRef {
    LoadBalancerRef::Id("lb-1".to_string())
}

// ── convergence ────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_converges_to_two_listeners_pools_members() {
    let (poller, _, clock) = setup(vec![
        Stage::Absent,
        Stage::Present(Graph::new("lb-1", "web")),
        Stage::Present(two_port_graph()),
    ]);

    let outcome = poller
        .poll_for(&lb(), &expected_2_2_2(), Duration::from_secs(60))
        .await
        .unwrap();

    assert_eq!(outcome.attempts, 3);
    assert_eq!(outcome.elapsed, Duration::from_secs(10));
    let counts = outcome.snapshot.counts();
    assert_eq!((counts.listeners, counts.pools, counts.distinct_members), (2, 2, 2));
    assert_eq!(clock.sleeps(), vec![Duration::from_secs(5); 2]);
}

#[tokio::test]
async fn test_pools_without_ready_backends_time_out() {
    let graph = Graph::new("lb-1", "web").with_listener("TCP", 80, "TCP", &[], 30080);
    let (poller, _, clock) = setup(vec![Stage::Present(graph)]);
    let expected = ExpectedTopology {
        listeners: 1,
        pools: 1,
        members: 0,
        listener_ports: BTreeSet::from([("TCP".to_string(), 80)]),
        pool_protocols: vec!["TCP".to_string()],
        ..expected_2_2_2()
    };

    let err = poller
        .poll_for(&lb(), &expected, Duration::from_secs(30))
        .await
        .unwrap_err();

    match err {
        Error::ConvergenceTimeout {
            attempts,
            last_diff,
            last_snapshot,
            ..
        } => {
            assert_eq!(attempts, 7);
            assert_eq!(
                last_diff.unwrap().mismatches,
                vec![Mismatch::EmptyPools { pools: 1 }]
            );
            assert_eq!(last_snapshot.unwrap().counts().members, 0);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(clock.elapsed(), Duration::from_secs(30));
}

#[tokio::test]
async fn test_absent_load_balancer_reports_zeros() {
    let (poller, _, _) = setup(vec![Stage::Absent]);

    let snapshot = poller.fetch_snapshot(&lb()).await.unwrap();
    assert!(!snapshot.is_present());
    assert_eq!(snapshot.counts(), TopologyCounts::default());

    let outcome = poller
        .poll_for(&lb(), &ExpectedTopology::absent(), Duration::from_secs(30))
        .await
        .unwrap();
    assert_eq!(outcome.attempts, 1);
}

#[tokio::test]
async fn test_lookup_by_name() {
    let (poller, _, _) = setup(vec![Stage::Present(two_port_graph())]);
    let outcome = poller
        .poll_for(
            &LoadBalancerRef::Name("web".to_string()),
            &expected_2_2_2(),
            Duration::from_secs(5),
        )
        .await
        .unwrap();
    assert_eq!(outcome.snapshot.load_balancer.unwrap().id, "lb-1");
}

// ── snapshots ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_successive_snapshots_of_converged_graph_are_identical() {
    let (poller, _, _) = setup(vec![Stage::Present(two_port_graph())]);
    let first = poller.fetch_snapshot(&lb()).await.unwrap();
    let second = poller.fetch_snapshot(&lb()).await.unwrap();
    assert_eq!(first, second);
}

#[tokio::test]
async fn test_every_cycle_issues_fresh_calls() {
    let (poller, provider, _) = setup(vec![
        Stage::Absent,
        Stage::Absent,
        Stage::Present(two_port_graph()),
    ]);
    poller
        .poll_for(&lb(), &expected_2_2_2(), Duration::from_secs(60))
        .await
        .unwrap();

    assert_eq!(provider.lookups(), 3);
    // last cycle: lookup, listeners, pools, members of two pools
    assert_eq!(provider.calls(), 2 + 5);
}

// ── failures ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_transient_failures_are_retried() {
    let (poller, _, _) = setup(vec![
        Stage::Fail(Fault::Unreachable),
        Stage::Fail(Fault::Status(503)),
        Stage::Present(two_port_graph()),
    ]);
    let outcome = poller
        .poll_for(&lb(), &expected_2_2_2(), Duration::from_secs(60))
        .await
        .unwrap();
    assert_eq!(outcome.attempts, 3);
}

#[tokio::test]
async fn test_non_retryable_failure_is_immediate() {
    let (poller, provider, clock) = setup(vec![
        Stage::Fail(Fault::Status(401)),
        Stage::Present(two_port_graph()),
    ]);
    let err = poller
        .poll_for(&lb(), &expected_2_2_2(), Duration::from_secs(60))
        .await
        .unwrap_err();

    assert!(matches!(err, Error::FatalProvider { .. }), "{err}");
    assert!(err.is_fatal());
    assert_eq!(provider.lookups(), 1);
    assert!(clock.sleeps().is_empty());
}

#[tokio::test]
async fn test_timeout_carries_last_transient_error() {
    let (poller, _, _) = setup(vec![Stage::Fail(Fault::Unreachable)]);
    let err = poller
        .poll_for(&lb(), &expected_2_2_2(), Duration::from_secs(10))
        .await
        .unwrap_err();
    match &err {
        Error::ConvergenceTimeout {
            last_snapshot,
            last_error,
            ..
        } => {
            assert!(last_snapshot.is_none());
            assert!(last_error.as_deref().unwrap().contains("connection reset"));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_fetch_is_made_even_past_deadline() {
    let (poller, provider, _) = setup(vec![Stage::Present(two_port_graph())]);
    let outcome = poller
        .poll_for(&lb(), &expected_2_2_2(), Duration::ZERO)
        .await
        .unwrap();
    assert_eq!(outcome.attempts, 1);
    assert_eq!(provider.lookups(), 1);
}

// ── deadlines ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_shrinking_the_deadline_only_turns_success_into_timeout() {
    let stages = vec![
        Stage::Absent,
        Stage::Fail(Fault::Status(502)),
        Stage::Absent,
        Stage::Present(two_port_graph()),
    ];

    let mut results = Vec::new();
    for secs in 0..=30u64 {
        let (poller, _, _) = setup(stages.clone());
        let result = poller
            .poll_for(&lb(), &expected_2_2_2(), Duration::from_secs(secs))
            .await;
        if let Err(e) = &result {
            assert!(matches!(e, Error::ConvergenceTimeout { .. }), "{e}");
        }
        results.push(result.is_ok());
    }

    let first_ok = results.iter().position(|ok| *ok).unwrap();
    assert!(results[first_ok..].iter().all(|ok| *ok));
    assert!(!results[0]);
    // fourth fetch happens at 10s + the clamped remainder
    assert_eq!(first_ok, 11);
}
