// tests/service_lifecycle.rs

mod common;
use crate::common::{init_tracing, test_registry, wait_for_state};

use std::time::Duration;

use procdag::errors::ProcdagError;
use procdag::types::{RestartPolicy, ServiceState, StatePhase};
use procdag_test_utils::builders::ServiceDraftBuilder;
use procdag_test_utils::fake_backend::{FakeLifecycle, FakeProcessBackend};

#[tokio::test]
async fn create_then_get_is_stopped_with_fresh_id() {
    init_tracing();
    let registry = test_registry(FakeProcessBackend::new());

    let a = registry
        .create(ServiceDraftBuilder::new("svc-a", "echo a").build())
        .await
        .unwrap();
    let b = registry
        .create(ServiceDraftBuilder::new("svc-b", "echo b").build())
        .await
        .unwrap();

    assert_ne!(a.definition.id, b.definition.id);
    let got = registry.snapshot(a.definition.id).unwrap();
    assert_eq!(got.runtime.state, ServiceState::Stopped);
    assert_eq!(got.runtime.phase, StatePhase::Observed);
    assert!(got.runtime.pid.is_none());
}

#[tokio::test]
async fn validation_collects_every_violated_field() {
    init_tracing();
    let registry = test_registry(FakeProcessBackend::new());

    let draft = ServiceDraftBuilder::new("", "")
        .env("API KEY", "x")
        .env("TOKEN", "one")
        .env("TOKEN", "two")
        .build();

    match registry.create(draft).await {
        Err(ProcdagError::Validation(problems)) => {
            assert!(problems.iter().any(|p| p.contains("name")));
            assert!(problems.iter().any(|p| p.contains("execCommand")));
            assert!(problems.iter().any(|p| p.contains("'API KEY'")));
            assert!(problems.iter().any(|p| p.contains("duplicate env key 'TOKEN'")));
        }
        other => panic!("expected validation error, got {other:?}"),
    }
}

#[tokio::test]
async fn duplicate_name_is_rejected() {
    init_tracing();
    let registry = test_registry(FakeProcessBackend::new());

    registry
        .create(ServiceDraftBuilder::new("web", "echo 1").build())
        .await
        .unwrap();

    let err = registry
        .create(ServiceDraftBuilder::new("web", "echo 2").build())
        .await
        .unwrap_err();
    assert!(matches!(err, ProcdagError::Validation(_)));
}

#[tokio::test]
async fn start_while_running_conflicts_and_leaves_state_unchanged() {
    init_tracing();
    let backend = FakeProcessBackend::new();
    backend.set_behaviour("web", FakeLifecycle::RunUntilStopped);
    let registry = test_registry(backend.clone());

    let entry = registry
        .create(ServiceDraftBuilder::new("web", "serve").build())
        .await
        .unwrap();
    let id = entry.definition.id;

    registry.start(id).await.unwrap();
    wait_for_state(&registry, id, ServiceState::Running).await;

    let err = registry.start(id).await.unwrap_err();
    assert!(matches!(err, ProcdagError::Conflict(_)));
    assert_eq!(
        registry.snapshot(id).unwrap().runtime.state,
        ServiceState::Running
    );
    assert_eq!(backend.launch_count("web"), 1);

    registry.stop(id).await.unwrap();
}

#[tokio::test]
async fn exit_code_in_valid_set_completes() {
    init_tracing();
    let backend = FakeProcessBackend::new();
    backend.set_behaviour(
        "job",
        FakeLifecycle::ExitWith {
            code: 3,
            delay: Duration::from_millis(5),
        },
    );
    let registry = test_registry(backend);

    let entry = registry
        .create(
            ServiceDraftBuilder::new("job", "run-batch")
                .valid_exit_codes(&[0, 3])
                .build(),
        )
        .await
        .unwrap();
    let id = entry.definition.id;

    registry.start(id).await.unwrap();
    wait_for_state(&registry, id, ServiceState::Completed).await;
    assert_eq!(registry.snapshot(id).unwrap().runtime.last_exit_code, Some(3));
}

#[tokio::test]
async fn exit_code_outside_valid_set_fails() {
    init_tracing();
    let backend = FakeProcessBackend::new();
    backend.set_behaviour(
        "job",
        FakeLifecycle::ExitWith {
            code: 3,
            delay: Duration::from_millis(5),
        },
    );
    let registry = test_registry(backend);

    let entry = registry
        .create(ServiceDraftBuilder::new("job", "run-batch").build())
        .await
        .unwrap();
    let id = entry.definition.id;

    registry.start(id).await.unwrap();
    wait_for_state(&registry, id, ServiceState::Failed).await;
    assert_eq!(registry.snapshot(id).unwrap().runtime.last_exit_code, Some(3));
}

#[tokio::test]
async fn stop_requires_running() {
    init_tracing();
    let registry = test_registry(FakeProcessBackend::new());

    let entry = registry
        .create(ServiceDraftBuilder::new("web", "serve").build())
        .await
        .unwrap();

    let err = registry.stop(entry.definition.id).await.unwrap_err();
    assert!(matches!(err, ProcdagError::Conflict(_)));
}

#[tokio::test]
async fn stop_returns_to_stopped_with_exit_observed() {
    init_tracing();
    let backend = FakeProcessBackend::new();
    backend.set_behaviour("web", FakeLifecycle::RunUntilStopped);
    let registry = test_registry(backend);

    let entry = registry
        .create(ServiceDraftBuilder::new("web", "serve").build())
        .await
        .unwrap();
    let id = entry.definition.id;

    registry.start(id).await.unwrap();
    wait_for_state(&registry, id, ServiceState::Running).await;

    let stopped = registry.stop(id).await.unwrap();
    assert_eq!(stopped.runtime.state, ServiceState::Stopped);
    assert!(stopped.runtime.pid.is_none());
}

#[tokio::test]
async fn restart_never_overlaps_processes() {
    init_tracing();
    let backend = FakeProcessBackend::new();
    backend.set_behaviour("web", FakeLifecycle::RunUntilStopped);
    let registry = test_registry(backend.clone());

    let entry = registry
        .create(ServiceDraftBuilder::new("web", "serve").build())
        .await
        .unwrap();
    let id = entry.definition.id;

    registry.start(id).await.unwrap();
    wait_for_state(&registry, id, ServiceState::Running).await;

    registry.restart(id).await.unwrap();
    registry.restart(id).await.unwrap();
    wait_for_state(&registry, id, ServiceState::Running).await;

    assert_eq!(backend.launch_count("web"), 3);
    assert!(!backend.overlap_detected(), "two processes ran at once");

    registry.stop(id).await.unwrap();
}

#[tokio::test]
async fn restart_from_stopped_just_starts() {
    init_tracing();
    let backend = FakeProcessBackend::new();
    backend.set_behaviour("web", FakeLifecycle::RunUntilStopped);
    let registry = test_registry(backend.clone());

    let entry = registry
        .create(ServiceDraftBuilder::new("web", "serve").build())
        .await
        .unwrap();
    let id = entry.definition.id;

    registry.restart(id).await.unwrap();
    wait_for_state(&registry, id, ServiceState::Running).await;
    assert_eq!(backend.launch_count("web"), 1);

    registry.stop(id).await.unwrap();
}

#[tokio::test]
async fn delete_running_conflicts_then_succeeds_after_stop() {
    init_tracing();
    let backend = FakeProcessBackend::new();
    backend.set_behaviour("web", FakeLifecycle::RunUntilStopped);
    let registry = test_registry(backend);

    let entry = registry
        .create(ServiceDraftBuilder::new("web", "serve").build())
        .await
        .unwrap();
    let id = entry.definition.id;

    registry.start(id).await.unwrap();
    wait_for_state(&registry, id, ServiceState::Running).await;

    let err = registry.delete(id).await.unwrap_err();
    assert!(matches!(err, ProcdagError::Conflict(_)));

    registry.stop(id).await.unwrap();
    registry.delete(id).await.unwrap();

    assert!(matches!(
        registry.snapshot(id),
        Err(ProcdagError::NotFound(_))
    ));
}

#[tokio::test]
async fn auto_start_runs_the_start_sequence_on_create() {
    init_tracing();
    let backend = FakeProcessBackend::new();
    backend.set_behaviour("web", FakeLifecycle::RunUntilStopped);
    let registry = test_registry(backend.clone());

    let entry = registry
        .create(
            ServiceDraftBuilder::new("web", "serve")
                .auto_start(true)
                .build(),
        )
        .await
        .unwrap();
    let id = entry.definition.id;

    assert_eq!(entry.runtime.state, ServiceState::Running);
    wait_for_state(&registry, id, ServiceState::Running).await;
    assert_eq!(backend.launch_count("web"), 1);

    registry.stop(id).await.unwrap();
}

#[tokio::test]
async fn phase_moves_from_requested_to_observed() {
    init_tracing();
    let backend = FakeProcessBackend::new();
    backend.set_behaviour("web", FakeLifecycle::RunUntilStopped);
    let registry = test_registry(backend);

    let entry = registry
        .create(ServiceDraftBuilder::new("web", "serve").build())
        .await
        .unwrap();
    let id = entry.definition.id;

    let started = registry.start(id).await.unwrap();
    assert_eq!(started.runtime.state, ServiceState::Running);

    // The backend confirms the pid shortly after.
    for _ in 0..200 {
        let rt = registry.snapshot(id).unwrap().runtime;
        if rt.pid.is_some() {
            assert_eq!(rt.phase, StatePhase::Observed);
            assert!(rt.started_at.is_some());
            registry.stop(id).await.unwrap();
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("pid was never observed");
}

#[tokio::test]
async fn launch_failure_surfaces_as_failed_with_error() {
    init_tracing();
    let backend = FakeProcessBackend::new();
    backend.set_behaviour(
        "web",
        FakeLifecycle::FailToLaunch {
            error: "no such binary".to_string(),
        },
    );
    let registry = test_registry(backend);

    let entry = registry
        .create(ServiceDraftBuilder::new("web", "serve").build())
        .await
        .unwrap();
    let id = entry.definition.id;

    registry.start(id).await.unwrap();
    wait_for_state(&registry, id, ServiceState::Failed).await;

    let rt = registry.snapshot(id).unwrap().runtime;
    assert!(rt.last_error.unwrap().contains("no such binary"));
}

#[tokio::test]
async fn timeout_reports_timeout_state() {
    init_tracing();
    let backend = FakeProcessBackend::new();
    backend.set_behaviour(
        "web",
        FakeLifecycle::TimeoutAfter {
            after: Duration::from_millis(20),
        },
    );
    let registry = test_registry(backend);

    let entry = registry
        .create(
            ServiceDraftBuilder::new("web", "serve")
                .timeout_seconds(1)
                .build(),
        )
        .await
        .unwrap();
    let id = entry.definition.id;

    registry.start(id).await.unwrap();
    wait_for_state(&registry, id, ServiceState::Timeout).await;
}

#[tokio::test]
async fn restart_policy_relaunches_up_to_retries() {
    init_tracing();
    let backend = FakeProcessBackend::new();
    backend.set_behaviour(
        "flaky",
        FakeLifecycle::ExitWith {
            code: 1,
            delay: Duration::from_millis(5),
        },
    );
    let registry = test_registry(backend.clone());

    let entry = registry
        .create(
            ServiceDraftBuilder::new("flaky", "crashy")
                .restart_policy(RestartPolicy::OnFailure, 2)
                .build(),
        )
        .await
        .unwrap();
    let id = entry.definition.id;

    registry.start(id).await.unwrap();

    // The state bounces FAILED -> RUNNING between attempts, so wait for the
    // launch count to settle rather than the first FAILED observation.
    for _ in 0..200 {
        let rt = registry.snapshot(id).unwrap().runtime;
        if backend.launch_count("flaky") == 3 && rt.state == ServiceState::Failed {
            assert_eq!(rt.restarts_attempted, 2);
            // No further relaunches once retries are exhausted.
            tokio::time::sleep(Duration::from_millis(30)).await;
            assert_eq!(backend.launch_count("flaky"), 3);
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!(
        "retries never settled (launches: {})",
        backend.launch_count("flaky")
    );
}

#[tokio::test]
async fn operator_stop_suppresses_restart_policy() {
    init_tracing();
    let backend = FakeProcessBackend::new();
    backend.set_behaviour("web", FakeLifecycle::RunUntilStopped);
    let registry = test_registry(backend.clone());

    let entry = registry
        .create(
            ServiceDraftBuilder::new("web", "serve")
                .restart_policy(RestartPolicy::Always, 5)
                .build(),
        )
        .await
        .unwrap();
    let id = entry.definition.id;

    registry.start(id).await.unwrap();
    wait_for_state(&registry, id, ServiceState::Running).await;
    registry.stop(id).await.unwrap();

    // Give any (incorrect) relaunch a moment to show up.
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(backend.launch_count("web"), 1);
    assert_eq!(
        registry.snapshot(id).unwrap().runtime.state,
        ServiceState::Stopped
    );
}

#[tokio::test]
async fn update_applies_on_next_restart() {
    init_tracing();
    let backend = FakeProcessBackend::new();
    backend.set_behaviour("old-name", FakeLifecycle::RunUntilStopped);
    backend.set_behaviour("new-name", FakeLifecycle::RunUntilStopped);
    let registry = test_registry(backend.clone());

    let entry = registry
        .create(ServiceDraftBuilder::new("old-name", "serve").build())
        .await
        .unwrap();
    let id = entry.definition.id;

    registry.start(id).await.unwrap();
    wait_for_state(&registry, id, ServiceState::Running).await;

    registry
        .update(id, ServiceDraftBuilder::new("new-name", "serve-v2").build())
        .await
        .unwrap();

    // The live process still runs under the old spec.
    assert_eq!(backend.launches(), vec!["old-name".to_string()]);

    registry.restart(id).await.unwrap();
    wait_for_state(&registry, id, ServiceState::Running).await;
    assert_eq!(
        backend.launches(),
        vec!["old-name".to_string(), "new-name".to_string()]
    );

    registry.stop(id).await.unwrap();
}

#[tokio::test]
async fn disabled_service_refuses_start() {
    init_tracing();
    let registry = test_registry(FakeProcessBackend::new());

    let entry = registry
        .create(
            ServiceDraftBuilder::new("web", "serve")
                .enabled(false)
                .build(),
        )
        .await
        .unwrap();

    let err = registry.start(entry.definition.id).await.unwrap_err();
    assert!(matches!(err, ProcdagError::Conflict(_)));
}

#[tokio::test]
async fn disable_while_running_conflicts() {
    init_tracing();
    let backend = FakeProcessBackend::new();
    backend.set_behaviour("web", FakeLifecycle::RunUntilStopped);
    let registry = test_registry(backend);

    let entry = registry
        .create(ServiceDraftBuilder::new("web", "serve").build())
        .await
        .unwrap();
    let id = entry.definition.id;

    registry.start(id).await.unwrap();
    wait_for_state(&registry, id, ServiceState::Running).await;

    let err = registry.set_enabled(id, false).await.unwrap_err();
    assert!(matches!(err, ProcdagError::Conflict(_)));

    registry.stop(id).await.unwrap();
    registry.set_enabled(id, false).await.unwrap();
    let err = registry.start(id).await.unwrap_err();
    assert!(matches!(err, ProcdagError::Conflict(_)));
}

#[tokio::test]
async fn metrics_samples_reach_the_runtime() {
    init_tracing();
    let backend = FakeProcessBackend::new();
    backend.set_behaviour("web", FakeLifecycle::RunUntilStopped);
    let registry = test_registry(backend);

    let entry = registry
        .create(ServiceDraftBuilder::new("web", "serve").build())
        .await
        .unwrap();
    let id = entry.definition.id;

    registry.start(id).await.unwrap();

    for _ in 0..200 {
        let rt = registry.snapshot(id).unwrap().runtime;
        if rt.metrics.contains_key("cpu") && rt.metrics.contains_key("memory") {
            registry.stop(id).await.unwrap();
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("no metrics sample was ever observed");
}
