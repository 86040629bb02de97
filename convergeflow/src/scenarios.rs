//! End-to-end gateway and ingress scenarios against the simulated control
//! plane: set up the suite once, provision a namespace per test, apply
//! routing, then wait for the data plane to serve it. Each scenario skips
//! itself outside a kube environment.

use crate::check::{ConvergenceCheck, EndpointProbe};
use crate::collaborators::{CallOptions, ConfigStore, Endpoint, NamespaceConfig, NamespaceProvisioner};
use crate::environment::{Environment, EnvironmentKind};
use crate::errors::HarnessError;
use crate::events::{self, CollectingEventSink};
use crate::orchestrator::SetupOrchestrator;
use crate::poller::{ConvergencePoller, FailureCause, FatalMode, Outcome, RetryPolicy};
use crate::simulation::{route_document, Route, SimulatedComponentFactory, SimulatedControlPlane};
use crate::testing::{assert_converged, assert_failed, fast_policy, pilot_suite};
use std::sync::Arc;
use std::time::Duration;

async fn suite_environment(plane: &Arc<SimulatedControlPlane>) -> Environment {
    let baseline = vec![route_document(&[Route::new("baseline.example", "/", "baseline")])];
    pilot_suite(
        Arc::new(SimulatedComponentFactory::new()),
        plane.clone(),
        baseline,
        EnvironmentKind::Kube,
    )
    .run()
    .await
    .unwrap()
}

fn check(plane: &Arc<SimulatedControlPlane>, policy: RetryPolicy) -> ConvergenceCheck {
    ConvergenceCheck::new(plane.clone(), ConvergencePoller::new(policy))
}

fn route_check(plane: &Arc<SimulatedControlPlane>, host: &str, path: &str) -> EndpointProbe {
    EndpointProbe::new(
        plane.clone() as Arc<dyn Endpoint>,
        CallOptions::plain_text(host, path, plane.address()),
    )
}

/// Routes `my.domain.example/get` and waits for it. `None` when skipped.
async fn gateway(env: &Environment, plane: &Arc<SimulatedControlPlane>) -> Option<u32> {
    if env.require(EnvironmentKind::Kube).is_err() {
        return None;
    }
    let scope = plane
        .create(&NamespaceConfig::new("gateway").injected())
        .await
        .unwrap();
    let doc = route_document(&[Route::new("my.domain.example", "/get", "server")]);

    let attempts = check(plane, fast_policy(10))
        .apply_and_ensure(&scope, &doc, &route_check(plane, "my.domain.example", "/get"))
        .await
        .unwrap();
    assert!(plane.revision(&scope).is_some());
    Some(attempts)
}

/// Routes `server/` and waits for it. `None` when skipped.
async fn ingress(env: &Environment, plane: &Arc<SimulatedControlPlane>) -> Option<Outcome> {
    if env.require(EnvironmentKind::Kube).is_err() {
        return None;
    }
    let scope = plane
        .create(&NamespaceConfig::new("ingress").injected())
        .await
        .unwrap();
    let doc = route_document(&[Route::new("server", "/", "server")]);
    let served = route_check(plane, "server", "/").expect_body("^backend=server$").unwrap();

    Some(
        check(plane, fast_policy(5))
            .apply_and_poll(&scope, &doc, &served)
            .await
            .unwrap(),
    )
}

#[tokio::test]
async fn test_gateway() {
    let plane = Arc::new(SimulatedControlPlane::new().with_propagation_lag(3));
    let env = suite_environment(&plane).await;
    assert!(env.contains("ingress"));

    assert_eq!(gateway(&env, &plane).await, Some(4));
}

#[tokio::test]
async fn test_ingress() {
    let plane = Arc::new(SimulatedControlPlane::new().with_propagation_lag(1));
    let env = suite_environment(&plane).await;
    assert!(env.contains("istio"));

    let outcome = ingress(&env, &plane).await.unwrap();

    assert_converged(&outcome, 2);
}

#[tokio::test]
async fn test_tests_skip_outside_kube() {
    let plane = Arc::new(SimulatedControlPlane::new());
    let env = SetupOrchestrator::new("pilot_test")
        .with_environment(EnvironmentKind::Native)
        .run()
        .await
        .unwrap();

    assert_eq!(gateway(&env, &plane).await, None);
    assert!(ingress(&env, &plane).await.is_none());
    assert_eq!(plane.calls(), 0);
}

#[tokio::test]
async fn test_route_that_never_appears_exhausts_budget() {
    let plane = Arc::new(SimulatedControlPlane::new().with_propagation_lag(100));
    let scope = plane.create(&NamespaceConfig::new("gateway")).await.unwrap();
    let doc = route_document(&[Route::new("my.domain.example", "/get", "server")]);

    let outcome = check(&plane, fast_policy(5))
        .apply_and_poll(&scope, &doc, &route_check(&plane, "my.domain.example", "/get"))
        .await
        .unwrap();

    assert_failed(&outcome, FailureCause::BudgetExhausted, "got invalid response code 404");
    assert_eq!(plane.calls(), 5);
}

#[tokio::test]
async fn test_unavailable_upstream_reports_last_status() {
    let plane = Arc::new(SimulatedControlPlane::new());
    plane.set_unavailable(true);
    let scope = plane.create(&NamespaceConfig::new("ingress")).await.unwrap();
    let doc = route_document(&[Route::new("server", "/", "server")]);

    let err = check(&plane, fast_policy(3))
        .apply_and_ensure(&scope, &doc, &route_check(&plane, "server", "/"))
        .await
        .unwrap_err();

    match err {
        HarnessError::Convergence(err) => {
            assert_eq!(err.attempts, 3);
            assert!(err.reason.contains("503"));
            assert!(err.to_string().starts_with("server/ did not converge"));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_rejected_document_never_polls() {
    let plane = Arc::new(SimulatedControlPlane::new());
    let scope = plane.create(&NamespaceConfig::new("gateway")).await.unwrap();

    let err = check(&plane, fast_policy(3))
        .apply_and_poll(&scope, "kind: Gateway", &route_check(&plane, "server", "/"))
        .await
        .unwrap_err();

    assert!(matches!(err, HarnessError::Apply { .. }));
    assert_eq!(plane.calls(), 0);
}

#[tokio::test]
async fn test_wrong_address_is_transient_until_budget_exhausted() {
    let plane = Arc::new(SimulatedControlPlane::new());
    let scope = plane.create(&NamespaceConfig::new("gateway")).await.unwrap();
    plane
        .apply(&scope, &route_document(&[Route::new("server", "/", "server")]))
        .await
        .unwrap();
    let misdirected = EndpointProbe::new(
        plane.clone() as Arc<dyn Endpoint>,
        CallOptions::plain_text("server", "/", "10.0.0.1:80"),
    );
    let policy = RetryPolicy::attempts(4)
        .with_fixed_delay(Duration::ZERO)
        .with_fatal_mode(FatalMode::AbortOnFatal);

    let outcome = ConvergencePoller::new(policy).poll(&misdirected).await;

    assert_failed(&outcome, FailureCause::BudgetExhausted, "connection refused");
    assert_eq!(outcome.attempts(), 4);
}

#[tokio::test]
async fn test_convergence_events_are_observable() {
    let plane = Arc::new(SimulatedControlPlane::new().with_propagation_lag(2));
    let scope = plane.create(&NamespaceConfig::new("gateway")).await.unwrap();
    let sink = Arc::new(CollectingEventSink::new());
    let check = ConvergenceCheck::new(
        plane.clone(),
        ConvergencePoller::new(fast_policy(10)).with_event_sink(sink.clone()),
    );
    let doc = route_document(&[Route::new("my.domain.example", "/get", "server")]);

    check
        .apply_and_ensure(&scope, &doc, &route_check(&plane, "my.domain.example", "/get"))
        .await
        .unwrap();

    assert_eq!(sink.events_of_type(events::PROBE_RETRY).len(), 2);
    assert_eq!(sink.events_of_type(events::PROBE_CONVERGED).len(), 1);
}
