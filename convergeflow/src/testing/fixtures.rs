//! Prebuilt policies and suites.

use crate::collaborators::{ComponentConfig, ComponentFactory, ConfigStore};
use crate::environment::EnvironmentKind;
use crate::orchestrator::SetupOrchestrator;
use crate::poller::RetryPolicy;
use crate::stages::{ApplyStage, ComponentStage};
use std::sync::Arc;
use std::time::Duration;

/// A policy that retries without sleeping, bounded by `max_attempts`.
#[must_use]
pub fn fast_policy(max_attempts: u32) -> RetryPolicy {
    RetryPolicy::attempts(max_attempts).with_fixed_delay(Duration::ZERO)
}

/// The control-plane suite. Requires a kube environment.
///
/// Stages, in order: `galley`, `testdata` (baseline documents applied to the
/// cluster scope), `istio` (kube only), `pilot` (wired to galley) and
/// `ingress` (wired to istio).
#[must_use]
pub fn pilot_suite(
    factory: Arc<dyn ComponentFactory>,
    store: Arc<dyn ConfigStore>,
    baseline: Vec<String>,
    environment: EnvironmentKind,
) -> SetupOrchestrator {
    SetupOrchestrator::new("pilot_test")
        .with_environment(environment)
        .require_environment(EnvironmentKind::Kube)
        .label("custom_setup")
        .stage(ComponentStage::new(
            "galley",
            factory.clone(),
            ComponentConfig::new("galley", "galley"),
        ))
        .stage(ApplyStage::new("testdata", store, baseline))
        .stage_on(
            EnvironmentKind::Kube,
            ComponentStage::new(
                "istio",
                factory.clone(),
                ComponentConfig::new("istio", "istio")
                    .with_setting("global.k8sIngress.enabled", serde_json::json!(true))
                    .with_setting("pilot.env.PILOT_ENABLED_SERVICE_APIS", serde_json::json!(true)),
            ),
        )
        .stage(
            ComponentStage::new("pilot", factory.clone(), ComponentConfig::new("pilot", "pilot"))
                .depends_on("galley"),
        )
        .stage(
            ComponentStage::new("ingress", factory, ComponentConfig::new("ingress", "ingress"))
                .depends_on("istio"),
        )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::Scope;
    use crate::errors::{CollaboratorError, SetupFailure, StageError};
    use crate::simulation::{
        route_document, Route, SimulatedComponent, SimulatedComponentFactory, SimulatedControlPlane,
    };
    use crate::stages::{AppliedConfig, StageStatus};
    use crate::testing::assert_setup_failed_at;
    use pretty_assertions::assert_eq;

    fn baseline() -> Vec<String> {
        vec![route_document(&[Route::new("server", "/", "server")])]
    }

    #[test]
    fn test_fast_policy_has_no_deadline() {
        let policy = fast_policy(3);
        assert_eq!(policy.deadline(), None);
        assert_eq!(policy.max_attempts, Some(3));
        assert_eq!(policy.delay_after(1), Duration::ZERO);
    }

    #[tokio::test]
    async fn test_pilot_suite_on_kube() {
        let factory = Arc::new(SimulatedComponentFactory::new());
        let plane = Arc::new(SimulatedControlPlane::new());

        let env = pilot_suite(factory.clone(), plane.clone(), baseline(), EnvironmentKind::Kube)
            .run()
            .await
            .unwrap();

        assert_eq!(factory.created(), vec!["galley", "istio", "pilot", "ingress"]);
        assert!(env.has_label("custom_setup"));
        assert!(env
            .stage_records()
            .iter()
            .all(|r| r.status == StageStatus::Completed));

        let ingress = env.get::<SimulatedComponent>("ingress").unwrap();
        assert_eq!(ingress.dependencies, vec!["istio".to_string()]);
        let pilot = env.get::<SimulatedComponent>("pilot").unwrap();
        assert_eq!(pilot.dependencies, vec!["galley".to_string()]);

        let applied = env.get::<AppliedConfig>("testdata").unwrap();
        assert_eq!(applied.documents, 1);
        assert!(plane.revision(&Scope::cluster()).is_some());
    }

    #[tokio::test]
    async fn test_pilot_suite_refuses_native() {
        let factory = Arc::new(SimulatedComponentFactory::new());
        let plane = Arc::new(SimulatedControlPlane::new());

        let failure = pilot_suite(factory.clone(), plane, baseline(), EnvironmentKind::Native)
            .run()
            .await
            .unwrap_err();

        assert!(matches!(failure, SetupFailure::EnvironmentMismatch { .. }));
        assert!(factory.created().is_empty());
    }

    #[tokio::test]
    async fn test_rejected_baseline_stops_before_istio() {
        let factory = Arc::new(SimulatedComponentFactory::new());
        let plane = Arc::new(SimulatedControlPlane::new());

        let failure = pilot_suite(
            factory.clone(),
            plane,
            vec!["kind: Gateway".to_string()],
            EnvironmentKind::Kube,
        )
        .run()
        .await
        .unwrap_err();

        assert_setup_failed_at(&failure, "testdata", 2);
        assert!(matches!(
            failure,
            SetupFailure::Stage {
                source: StageError::Collaborator(CollaboratorError::Rejected(_)),
                ..
            }
        ));
        assert_eq!(factory.created(), vec!["galley"]);
    }
}
