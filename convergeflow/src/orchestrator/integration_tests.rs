//! Integration tests for ordered suite setup.

#[cfg(test)]
mod tests {
    use crate::config::HarnessConfig;
    use crate::environment::{EnvironmentBuilder, EnvironmentKind};
    use crate::errors::{HandleError, SetupFailure, StageError};
    use crate::events::{self, CollectingEventSink};
    use crate::orchestrator::SetupOrchestrator;
    use crate::stages::{FnStage, Stage, StageStatus};
    use crate::testing::{assert_setup_failed_at, CountingStage, FailingStage};
    use parking_lot::Mutex;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::Ordering;
    use std::sync::Arc;

    fn recording(name: &'static str, log: &Arc<Mutex<Vec<String>>>) -> impl Stage + 'static {
        let log = log.clone();
        FnStage::new(name, move |_env: &mut EnvironmentBuilder| {
            log.lock().push(name.to_string());
            Ok(())
        })
    }

    #[tokio::test]
    async fn test_stages_run_in_declaration_order() {
        let log = Arc::new(Mutex::new(Vec::new()));

        let env = SetupOrchestrator::new("ordering")
            .stage(recording("galley", &log))
            .stage(recording("pilot", &log))
            .stage(recording("ingress", &log))
            .run()
            .await
            .unwrap();

        assert_eq!(*log.lock(), vec!["galley", "pilot", "ingress"]);
        let names: Vec<&str> = env.stage_records().iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["galley", "pilot", "ingress"]);
        assert!(env
            .stage_records()
            .iter()
            .all(|r| r.status == StageStatus::Completed));
    }

    #[tokio::test]
    async fn test_failure_stops_later_stages() {
        let first = CountingStage::new("galley");
        let second = FailingStage::new("pilot", "deployment never became ready");
        let third = CountingStage::new("ingress");
        let (first_calls, second_calls, third_calls) = (first.counter(), second.counter(), third.counter());

        let failure = SetupOrchestrator::new("pilot_test")
            .stage(first)
            .stage(second)
            .stage(third)
            .run()
            .await
            .unwrap_err();

        assert_setup_failed_at(&failure, "pilot", 2);
        assert!(failure.to_string().contains("deployment never became ready"));
        assert_eq!(first_calls.load(Ordering::SeqCst), 1);
        assert_eq!(second_calls.load(Ordering::SeqCst), 1);
        assert_eq!(third_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_first_stage_failure() {
        let later = CountingStage::new("pilot");
        let later_calls = later.counter();

        let failure = SetupOrchestrator::new("suite")
            .stage(FailingStage::new("galley", "boom"))
            .stage(later)
            .run()
            .await
            .unwrap_err();

        assert_setup_failed_at(&failure, "galley", 1);
        assert_eq!(later_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_later_stage_reads_earlier_handle() {
        let env = SetupOrchestrator::new("suite")
            .stage(CountingStage::new("galley").publishing("galley"))
            .stage(FnStage::new("pilot", |env: &mut EnvironmentBuilder| {
                let galley = env.get::<String>("galley")?;
                env.publish("pilot", format!("pilot->{galley}"))?;
                Ok(())
            }))
            .run()
            .await
            .unwrap();

        assert_eq!(env.get::<String>("pilot").unwrap().as_str(), "pilot->galley");
        assert_eq!(env.handle_keys().to_vec(), vec!["galley".to_string(), "pilot".to_string()]);
    }

    #[tokio::test]
    async fn test_duplicate_handle_fails_setup() {
        let failure = SetupOrchestrator::new("suite")
            .stage(CountingStage::new("a").publishing("shared"))
            .stage(CountingStage::new("b").publishing("shared"))
            .run()
            .await
            .unwrap_err();

        assert_setup_failed_at(&failure, "b", 2);
        match failure {
            SetupFailure::Stage {
                source: StageError::Handle(HandleError::Conflict { key }),
                ..
            } => assert_eq!(key, "shared"),
            other => panic!("unexpected failure: {other}"),
        }
    }

    #[tokio::test]
    async fn test_environment_mismatch_runs_nothing() {
        let stage = CountingStage::new("istio");
        let calls = stage.counter();

        let failure = SetupOrchestrator::new("gateway_test")
            .with_environment(EnvironmentKind::Native)
            .require_environment(EnvironmentKind::Kube)
            .stage(stage)
            .run()
            .await
            .unwrap_err();

        assert!(matches!(failure, SetupFailure::EnvironmentMismatch { .. }));
        assert_eq!(failure.stage_name(), None);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_gated_stage_skipped_and_recorded() {
        let istio = CountingStage::new("istio");
        let istio_calls = istio.counter();

        let env = SetupOrchestrator::new("suite")
            .with_environment(EnvironmentKind::Native)
            .stage(CountingStage::new("galley"))
            .stage_on(EnvironmentKind::Kube, istio)
            .stage(CountingStage::new("pilot"))
            .run()
            .await
            .unwrap();

        assert_eq!(istio_calls.load(Ordering::SeqCst), 0);
        let statuses: Vec<StageStatus> = env.stage_records().iter().map(|r| r.status).collect();
        assert_eq!(
            statuses,
            vec![StageStatus::Completed, StageStatus::Skipped, StageStatus::Completed]
        );
        assert_eq!(env.stage_records()[2].index, 3);
    }

    #[tokio::test]
    async fn test_events_emitted_per_stage() {
        let sink = Arc::new(CollectingEventSink::new());

        let _ = SetupOrchestrator::new("suite")
            .with_event_sink(sink.clone())
            .stage(CountingStage::new("galley"))
            .stage_on(EnvironmentKind::Kube, CountingStage::new("istio"))
            .stage(FailingStage::new("pilot", "boom"))
            .run()
            .await;

        assert_eq!(
            sink.event_types(),
            vec![
                events::STAGE_STARTED,
                events::STAGE_COMPLETED,
                events::STAGE_SKIPPED,
                events::STAGE_STARTED,
                events::STAGE_FAILED,
            ]
        );
        let failed = sink.events_of_type(events::STAGE_FAILED);
        assert_eq!(failed[0].data["stage"], "pilot");
        assert_eq!(failed[0].data["index"], 3);
    }

    #[tokio::test]
    async fn test_from_stages_and_labels() {
        let stages: Vec<Arc<dyn Stage>> = vec![
            Arc::new(CountingStage::new("galley")),
            Arc::new(CountingStage::new("pilot")),
        ];
        let orchestrator = SetupOrchestrator::from_stages("pilot_test", stages).label("custom_setup");
        assert_eq!(orchestrator.stage_count(), 2);
        assert_eq!(orchestrator.suite(), "pilot_test");

        let env = orchestrator.run().await.unwrap();

        assert_eq!(env.suite(), "pilot_test");
        assert!(env.has_label("custom_setup"));
        assert!(!env.has_label("flaky"));
    }

    #[tokio::test]
    async fn test_empty_suite_yields_empty_environment() {
        let env = SetupOrchestrator::new("empty").run().await.unwrap();

        assert!(env.handle_keys().is_empty());
        assert!(env.stage_records().is_empty());
    }

    #[tokio::test]
    async fn test_frozen_environment_shared_across_tests() {
        let env = SetupOrchestrator::new("suite")
            .stage(CountingStage::new("galley").publishing("galley"))
            .run()
            .await
            .unwrap();

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let env = env.clone();
                tokio::spawn(async move { env.get::<String>("galley").map(|g| g.len()) })
            })
            .collect();

        for handle in handles {
            assert_eq!(handle.await.unwrap().unwrap(), "galley".len());
        }
        assert_eq!(env.run_id(), env.clone().run_id());
    }

    #[tokio::test]
    async fn test_with_config_sets_active_environment() {
        let config = HarnessConfig::default()
            .with_overrides_from(|key| (key == "CONVERGEFLOW_ENV").then(|| "kube".to_string()))
            .unwrap();

        let env = SetupOrchestrator::new("pilot_test")
            .with_config(&config)
            .require_environment(EnvironmentKind::Kube)
            .stage_on(EnvironmentKind::Kube, CountingStage::new("istio").publishing("istio"))
            .run()
            .await
            .unwrap();

        assert_eq!(env.kind(), EnvironmentKind::Kube);
        assert!(env.contains("istio"));
    }
}
