mod common;

use common::*;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use vine_vision::orchestrator::INCONSISTENT_REJECTION_MESSAGE;
use vine_vision::{ClassificationOrchestrator, ClassifierState, DiseaseClass, Outcome, SequencerConfig, TransportError};

fn orchestrator_with(backend: Arc<ScriptedBackend>) -> (ClassificationOrchestrator, SharedSurface) {
    let orchestrator = ClassificationOrchestrator::new(backend, SequencerConfig::default());
    let surface = SharedSurface::new(400, 300);
    orchestrator.sequencer().attach_surface(Box::new(surface.clone()));
    (orchestrator, surface)
}

#[tokio::test(start_paused = true)]
async fn healthy_leaf_is_published_after_the_simulation() {
    let backend = Arc::new(ScriptedBackend::healthy());
    let (orchestrator, surface) = orchestrator_with(backend.clone());

    let started = Instant::now();
    let outcome = orchestrator.submit(jpeg_asset("leaf.jpg")).await;
    let elapsed = started.elapsed();

    assert_eq!(outcome, Outcome::Completed(ClassifierState::Done));
    // Nine dwells of four seconds after the first step.
    assert!(elapsed >= Duration::from_secs(36), "published too early: {elapsed:?}");
    assert!(elapsed < Duration::from_secs(37));

    let snapshot = orchestrator.snapshot();
    assert_eq!(snapshot.state, ClassifierState::Done);
    assert_eq!(snapshot.image.as_deref(), Some("leaf.jpg"));
    assert_eq!(snapshot.revealed_step, 10);
    assert_eq!(snapshot.verification.unwrap().grape_probability, 0.93);
    let result = snapshot.classification.unwrap();
    assert_eq!(result.disease, DiseaseClass::Healthy);
    assert_eq!(result.predicted_class(), "Healthy");
    assert_eq!(result.confidence, 0.97);
    assert_eq!(result.remote_info.description, "Hoja sana");
    assert_eq!(result.remote_info.treatment, "Mantener prácticas preventivas");
    assert_eq!(backend.verify_calls(), 1);
    assert_eq!(backend.classify_calls(), 1);

    // The last frame falls due on the same tick as the publication.
    tokio::time::sleep(Duration::from_millis(1)).await;
    assert_eq!(surface.frames_presented(), 10);
    assert_eq!(surface.last_presented_step(), Some(9));
    assert_eq!(surface.title().as_deref(), Some("Dropout"));
    assert!(orchestrator.sequencer().state().is_idle());
    assert_eq!(orchestrator.registry().active(), 0);
}

#[tokio::test(start_paused = true)]
async fn verifier_rejection_never_reaches_the_classifier() {
    let backend = Arc::new(ScriptedBackend::new(
        Ok(not_leaf()),
        Ok(classification("Healthy", &[("Healthy", 0.99)])),
    ));
    let (orchestrator, surface) = orchestrator_with(backend.clone());

    let outcome = orchestrator.submit(jpeg_asset("cat.jpg")).await;

    assert_eq!(outcome, Outcome::Completed(ClassifierState::Rejected));
    let snapshot = orchestrator.snapshot();
    assert_eq!(snapshot.verification.unwrap().message, "not a leaf");
    assert!(snapshot.classification.is_none());
    assert_eq!(backend.classify_calls(), 0);
    assert!(snapshot.simulation.is_idle());
    assert_eq!(surface.frames_presented(), 0);
}

#[tokio::test(start_paused = true)]
async fn low_confidence_classification_becomes_a_rejection() {
    let backend = Arc::new(ScriptedBackend::new(
        Ok(leaf(0.81)),
        Ok(classification(
            "Healthy",
            &[("Healthy", 0.40), ("Black Rot", 0.35), ("ESCA (Black measles)", 0.25)],
        )),
    ));
    let (orchestrator, surface) = orchestrator_with(backend.clone());

    let outcome = orchestrator.submit(jpeg_asset("blurry.jpg")).await;

    assert_eq!(outcome, Outcome::Completed(ClassifierState::Rejected));
    let snapshot = orchestrator.snapshot();
    let verification = snapshot.verification.unwrap();
    assert!(!verification.is_grape_leaf);
    assert_eq!(verification.grape_probability, 0.0);
    assert_eq!(verification.message, INCONSISTENT_REJECTION_MESSAGE);
    assert!(snapshot.classification.is_none());
    assert_eq!(backend.classify_calls(), 1);
    assert_eq!(surface.frames_presented(), 0);
}

#[tokio::test(start_paused = true)]
async fn verification_transport_failure_fails_the_run() {
    let backend = Arc::new(ScriptedBackend::new(
        Err(TransportError::Network("connection refused".to_string())),
        Ok(classification("Healthy", &[("Healthy", 0.99)])),
    ));
    let (orchestrator, _surface) = orchestrator_with(backend.clone());

    let outcome = orchestrator.submit(jpeg_asset("leaf.jpg")).await;

    assert_eq!(outcome, Outcome::Completed(ClassifierState::Failed));
    let failure = orchestrator.snapshot().failure.unwrap();
    assert!(failure.contains("verification"), "{failure}");
    assert!(failure.contains("connection refused"), "{failure}");
    assert_eq!(backend.classify_calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn classification_status_error_fails_the_run() {
    let backend = Arc::new(ScriptedBackend::new(
        Ok(leaf(0.9)),
        Err(TransportError::Status {
            status: 503,
            body: "waking up".to_string(),
        }),
    ));
    let (orchestrator, surface) = orchestrator_with(backend);

    let outcome = orchestrator.submit(jpeg_asset("leaf.jpg")).await;

    assert_eq!(outcome, Outcome::Completed(ClassifierState::Failed));
    let snapshot = orchestrator.snapshot();
    assert!(snapshot.failure.unwrap().contains("503"));
    assert!(snapshot.verification.is_some());
    assert_eq!(surface.frames_presented(), 0);
}

#[tokio::test(start_paused = true)]
async fn unknown_disease_label_fails_the_run() {
    let backend = Arc::new(ScriptedBackend::new(
        Ok(leaf(0.9)),
        Ok(classification("Powdery Mildew", &[("Powdery Mildew", 0.9)])),
    ));
    let (orchestrator, surface) = orchestrator_with(backend);

    let outcome = orchestrator.submit(jpeg_asset("leaf.jpg")).await;

    assert_eq!(outcome, Outcome::Completed(ClassifierState::Failed));
    assert!(orchestrator.snapshot().failure.unwrap().contains("Powdery Mildew"));
    assert_eq!(surface.frames_presented(), 0);
}

#[tokio::test(start_paused = true)]
async fn reset_before_verification_discards_the_response() {
    let (backend, gate) = ScriptedBackend::healthy().gated();
    let backend = Arc::new(backend);
    let (orchestrator, _surface) = orchestrator_with(backend.clone());

    let run = {
        let orchestrator = orchestrator.clone();
        tokio::spawn(async move { orchestrator.submit(jpeg_asset("leaf.jpg")).await })
    };
    settle_until(|| backend.verify_calls() == 1).await;
    assert_eq!(orchestrator.state(), ClassifierState::Verifying);

    orchestrator.reset_all();
    gate.notify_waiters();

    assert_eq!(run.await.unwrap(), Outcome::Superseded);
    let snapshot = orchestrator.snapshot();
    assert_eq!(snapshot.state, ClassifierState::Idle);
    assert!(snapshot.verification.is_none());
    assert!(snapshot.image.is_none());
    assert_eq!(backend.classify_calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn reset_during_the_delay_gate_stops_everything() {
    let backend = Arc::new(ScriptedBackend::healthy());
    let (orchestrator, surface) = orchestrator_with(backend);

    let run = {
        let orchestrator = orchestrator.clone();
        tokio::spawn(async move { orchestrator.submit(jpeg_asset("leaf.jpg")).await })
    };

    // Steps 0, 1 and 2 render at 0s, 4s and 8s.
    tokio::time::sleep(Duration::from_secs(10)).await;
    let snapshot = orchestrator.snapshot();
    assert_eq!(snapshot.state, ClassifierState::Classifying);
    assert_eq!(snapshot.simulation.current_step(), Some(2));
    assert_eq!(snapshot.revealed_step, 3);
    assert_eq!(surface.frames_presented(), 3);

    orchestrator.reset_all();
    assert_eq!(run.await.unwrap(), Outcome::Superseded);

    tokio::time::sleep(Duration::from_secs(60)).await;
    let snapshot = orchestrator.snapshot();
    assert_eq!(snapshot.state, ClassifierState::Idle);
    assert_eq!(snapshot.revealed_step, 0);
    assert!(snapshot.classification.is_none());
    assert!(snapshot.simulation.is_idle());
    assert_eq!(snapshot.simulation.step_index(), -1);
    assert_eq!(orchestrator.registry().active(), 0);
    assert_eq!(surface.frames_presented(), 3);
    assert_eq!(surface.pixel(0, 0), image::Rgba([0, 0, 0, 0]));
}

#[tokio::test(start_paused = true)]
async fn newer_submission_supersedes_older_one() {
    let (backend, gate) = ScriptedBackend::healthy().gated();
    let backend = Arc::new(backend);
    let (orchestrator, _surface) = orchestrator_with(backend.clone());

    let first = {
        let orchestrator = orchestrator.clone();
        tokio::spawn(async move { orchestrator.submit(jpeg_asset("first.jpg")).await })
    };
    settle_until(|| backend.verify_calls() == 1).await;

    let second = {
        let orchestrator = orchestrator.clone();
        tokio::spawn(async move { orchestrator.submit(jpeg_asset("second.jpg")).await })
    };
    settle_until(|| backend.verify_calls() == 2).await;
    gate.notify_waiters();

    assert_eq!(first.await.unwrap(), Outcome::Superseded);
    assert_eq!(second.await.unwrap(), Outcome::Completed(ClassifierState::Done));

    let snapshot = orchestrator.snapshot();
    assert_eq!(snapshot.generation, 2);
    assert_eq!(snapshot.image.as_deref(), Some("second.jpg"));
    assert_eq!(backend.classify_calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn undecodable_image_still_completes() {
    let backend = Arc::new(ScriptedBackend::healthy());
    let (orchestrator, surface) = orchestrator_with(backend);

    let outcome = orchestrator.submit(corrupt_asset()).await;
    assert_eq!(outcome, Outcome::Completed(ClassifierState::Done));

    tokio::time::sleep(Duration::from_millis(1)).await;
    assert_eq!(surface.frames_presented(), 10);
    assert!(orchestrator.snapshot().simulation.snapshot().is_none());
}

#[tokio::test(start_paused = true)]
async fn resubmitting_after_a_terminal_state_starts_fresh() {
    let backend = Arc::new(ScriptedBackend::new(
        Ok(not_leaf()),
        Ok(classification("Healthy", &[("Healthy", 0.99)])),
    ));
    let (orchestrator, _surface) = orchestrator_with(backend.clone());

    assert_eq!(
        orchestrator.submit(jpeg_asset("a.jpg")).await,
        Outcome::Completed(ClassifierState::Rejected)
    );
    assert_eq!(
        orchestrator.submit(jpeg_asset("b.jpg")).await,
        Outcome::Completed(ClassifierState::Rejected)
    );

    let snapshot = orchestrator.snapshot();
    assert_eq!(snapshot.generation, 2);
    assert_eq!(snapshot.image.as_deref(), Some("b.jpg"));
    assert_eq!(backend.verify_calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn stale_transport_failure_is_not_logged_as_an_error() {
    let errors = ErrorCounter::default();
    let _guard = errors.install();

    let (backend, gate) = ScriptedBackend::new(
        Err(TransportError::Network("connection reset".to_string())),
        Ok(classification("Healthy", &[("Healthy", 0.99)])),
    )
    .gated();
    let backend = Arc::new(backend);
    let (orchestrator, _surface) = orchestrator_with(backend.clone());

    let run = {
        let orchestrator = orchestrator.clone();
        tokio::spawn(async move { orchestrator.submit(jpeg_asset("leaf.jpg")).await })
    };
    settle_until(|| backend.verify_calls() == 1).await;
    orchestrator.reset_all();
    gate.notify_waiters();

    assert_eq!(run.await.unwrap(), Outcome::Superseded);
    let snapshot = orchestrator.snapshot();
    assert_eq!(snapshot.state, ClassifierState::Idle);
    assert!(snapshot.failure.is_none());
    assert_eq!(errors.count(), 0);

    // The same failure on a current run is still reported.
    gate.notify_one();
    let outcome = orchestrator.submit(jpeg_asset("leaf.jpg")).await;
    assert_eq!(outcome, Outcome::Completed(ClassifierState::Failed));
    assert_eq!(errors.count(), 1);
}
