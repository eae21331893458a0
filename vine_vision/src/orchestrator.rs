// THEORY:
// The `ClassificationOrchestrator` runs one submitted image through the two
// remote services and, on success, drives the visual simulation while holding
// the final result back until the simulation has played out.
//
// Key architectural principles:
// 1.  **Generation Guard**: Every `submit` and `reset_all` bumps a generation
//     counter. Each continuation of a run compares the generation it started with
//     against the current one before touching shared state, so a response that
//     arrives after a reset or a newer submission is dropped on the floor.
// 2.  **Verify Before Classify**: Classification is only requested once the
//     verifier has said "grape leaf". A rejection never reaches the classifier.
// 3.  **Consistency Check**: A classification in which no class clears 0.5 is
//     treated as a rejection, not as a low-confidence diagnosis.
// 4.  **Delay Gate**: The result is published only after sleeping through the
//     dwell of every step after the first, via the shared `TimerRegistry`. A
//     reset cancels those sleeps along with the sequencer's own timers.
// 5.  **One Owner per Timer Chain**: Only `submit` and `reset_all` call the
//     registry's `cancel_all`. The sequencer never does.

use crate::asset::ImageAsset;
use crate::backend::{ClassificationResponse, InferenceBackend, RemoteDiseaseInfo, VerificationResult};
use crate::core_modules::raster::raster::Raster;
use crate::core_modules::sequencer::{SequencerConfig, SimulationState, StageSequencer};
use crate::core_modules::timer_registry::TimerRegistry;
use crate::disease::{DiseaseClass, DiseaseInfo};
use crate::error::TransportError;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// A class must clear this probability for a classification to count.
pub const CONSISTENCY_THRESHOLD: f64 = 0.5;

/// Message used when the classifier's output contradicts the verifier.
pub const INCONSISTENT_REJECTION_MESSAGE: &str = "The image does not appear to be a grape leaf";

/// Where a classification run stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ClassifierState {
    /// Nothing submitted, or reset.
    Idle,
    /// Waiting on the verification service.
    Verifying,
    /// Not a grape leaf. Terminal.
    Rejected,
    /// Waiting on the classifier or the delay gate.
    Classifying,
    /// Result published. Terminal.
    Done,
    /// A service call failed. Terminal.
    Failed,
}

impl ClassifierState {
    pub fn is_terminal(self) -> bool {
        matches!(self, ClassifierState::Rejected | ClassifierState::Done | ClassifierState::Failed)
    }

    /// Whether a run may move from `self` to `next`.
    pub fn can_transition_to(self, next: ClassifierState) -> bool {
        use ClassifierState::*;
        match (self, next) {
            // Reset and resubmission are always allowed.
            (_, Idle) | (_, Verifying) => true,
            (Verifying, Rejected | Classifying | Failed) => true,
            (Classifying, Rejected | Done | Failed) => true,
            _ => false,
        }
    }
}

/// A published diagnosis.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassificationResult {
    pub disease: DiseaseClass,
    pub confidence: f64,
    pub all_predictions: HashMap<String, f64>,
    pub info: &'static DiseaseInfo,
    /// Description and advice as the classification service sent them.
    pub remote_info: RemoteDiseaseInfo,
}

impl ClassificationResult {
    pub fn predicted_class(&self) -> &'static str {
        self.disease.label()
    }
}

/// What `submit` ended with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The run reached a terminal state.
    Completed(ClassifierState),
    /// A reset or a newer submission took over before the run finished.
    Superseded,
}

/// A point-in-time copy of everything the orchestrator exposes.
#[derive(Debug, Clone)]
pub struct ClassifierSnapshot {
    pub state: ClassifierState,
    pub generation: u64,
    /// Name of the image in the current run.
    pub image: Option<String>,
    pub verification: Option<VerificationResult>,
    pub classification: Option<ClassificationResult>,
    /// Failure message when `state` is `Failed`.
    pub failure: Option<String>,
    /// How many simulation steps the delay gate has let through.
    pub revealed_step: usize,
    pub simulation: SimulationState,
}

struct RunRecord {
    state: ClassifierState,
    generation: u64,
    image: Option<ImageAsset>,
    verification: Option<VerificationResult>,
    classification: Option<ClassificationResult>,
    failure: Option<String>,
    revealed_step: usize,
}

impl RunRecord {
    fn new() -> Self {
        Self {
            state: ClassifierState::Idle,
            generation: 0,
            image: None,
            verification: None,
            classification: None,
            failure: None,
            revealed_step: 0,
        }
    }

    fn transition_to(&mut self, next: ClassifierState) {
        if !self.state.can_transition_to(next) {
            tracing::warn!(from = ?self.state, to = ?next, "Ignoring illegal state transition");
            return;
        }
        tracing::info!(generation = self.generation, from = ?self.state, to = ?next, "Classifier state change");
        self.state = next;
    }

    /// Starts a new generation with every result field cleared.
    fn restart(&mut self, image: Option<ImageAsset>, state: ClassifierState) -> u64 {
        self.generation += 1;
        self.image = image;
        self.verification = None;
        self.classification = None;
        self.failure = None;
        self.revealed_step = 0;
        self.transition_to(state);
        self.generation
    }
}

struct OrchestratorInner {
    backend: Arc<dyn InferenceBackend>,
    registry: TimerRegistry,
    sequencer: StageSequencer,
    record: Mutex<RunRecord>,
}

/// Cloneable handle to the classification workflow.
#[derive(Clone)]
pub struct ClassificationOrchestrator {
    inner: Arc<OrchestratorInner>,
}

impl ClassificationOrchestrator {
    pub fn new(backend: Arc<dyn InferenceBackend>, config: SequencerConfig) -> Self {
        let registry = TimerRegistry::new();
        let sequencer = StageSequencer::new(registry.clone(), config);
        Self {
            inner: Arc::new(OrchestratorInner {
                backend,
                registry,
                sequencer,
                record: Mutex::new(RunRecord::new()),
            }),
        }
    }

    fn record(&self) -> MutexGuard<'_, RunRecord> {
        self.inner.record.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// The simulation driver, for attaching a surface or pausing.
    pub fn sequencer(&self) -> &StageSequencer {
        &self.inner.sequencer
    }

    pub fn registry(&self) -> &TimerRegistry {
        &self.inner.registry
    }

    pub fn state(&self) -> ClassifierState {
        self.record().state
    }

    pub fn snapshot(&self) -> ClassifierSnapshot {
        let record = self.record();
        ClassifierSnapshot {
            state: record.state,
            generation: record.generation,
            image: record.image.as_ref().map(|image| image.name().to_string()),
            verification: record.verification.clone(),
            classification: record.classification.clone(),
            failure: record.failure.clone(),
            revealed_step: record.revealed_step,
            simulation: self.inner.sequencer.state(),
        }
    }

    /// Cancels everything in flight and returns to `Idle`.
    pub fn reset_all(&self) {
        let mut record = self.record();
        let cancelled = self.inner.registry.cancel_all();
        self.inner.sequencer.cancel_all();
        let generation = record.restart(None, ClassifierState::Idle);
        tracing::info!(generation, cancelled, "Classifier reset");
    }

    /// Runs `image` through verification, classification and the delay gate.
    ///
    /// Any run already in progress is superseded.
    pub async fn submit(&self, image: ImageAsset) -> Outcome {
        // --- 1. Take over ---
        let generation = {
            let mut record = self.record();
            self.inner.registry.cancel_all();
            self.inner.sequencer.cancel_all();
            record.restart(Some(image.clone()), ClassifierState::Verifying)
        };
        tracing::info!(generation, image = image.name(), "Verifying image");

        // --- 2. Verify ---
        let verification = match self.inner.backend.verify(&image).await {
            Ok(verification) => verification,
            Err(e) => return self.fail(generation, "verification", e),
        };

        if !verification.is_grape_leaf {
            tracing::info!(
                generation,
                probability = verification.grape_probability,
                "Verifier rejected the image"
            );
            return self.settle(generation, |record| {
                record.verification = Some(verification);
                record.transition_to(ClassifierState::Rejected);
            });
        }

        let accepted = self.apply(generation, |record| {
            record.verification = Some(verification);
            record.transition_to(ClassifierState::Classifying);
        });
        if !accepted {
            return Outcome::Superseded;
        }

        // --- 3. Classify ---
        let response = match self.inner.backend.classify(&image).await {
            Ok(response) => response,
            Err(e) => return self.fail(generation, "classification", e),
        };

        // --- 4. Consistency check ---
        if !is_consistent(&response) {
            tracing::info!(generation, "No class above threshold; treating as rejection");
            return self.settle(generation, |record| {
                record.verification = Some(VerificationResult {
                    is_grape_leaf: false,
                    grape_probability: 0.0,
                    message: INCONSISTENT_REJECTION_MESSAGE.to_string(),
                });
                record.transition_to(ClassifierState::Rejected);
            });
        }

        let result = match ClassificationResult::try_from(response) {
            Ok(result) => result,
            Err(e) => {
                return self.settle(generation, |record| {
                    tracing::warn!(generation, error = %e, "Classification returned an unknown class");
                    record.failure = Some(e.to_string());
                    record.transition_to(ClassifierState::Failed);
                });
            }
        };

        // --- 5. Start the simulation ---
        let source = match image.decode() {
            Ok(raster) => Some(raster),
            Err(e) => {
                tracing::warn!(generation, error = %e, "Could not decode image; simulating without a picture");
                None
            }
        };
        if !self.start_simulation(generation, source) {
            return Outcome::Superseded;
        }

        // --- 6. Delay gate ---
        let dwells: Vec<Duration> = self.inner.sequencer.steps().iter().skip(1).map(|step| step.dwell).collect();
        for (index, dwell) in dwells.into_iter().enumerate() {
            if self.inner.registry.sleep(dwell).await.is_err() {
                tracing::debug!(generation, "Delay gate cancelled");
                return Outcome::Superseded;
            }
            // Sleeping through step `index + 1` reveals it.
            if !self.apply(generation, |record| record.revealed_step = index + 2) {
                return Outcome::Superseded;
            }
        }

        // --- 7. Publish ---
        tracing::info!(
            generation,
            class = result.predicted_class(),
            confidence = result.confidence,
            "Classification complete"
        );
        self.settle(generation, |record| {
            record.classification = Some(result);
            record.transition_to(ClassifierState::Done);
        })
    }

    /// Runs `update` if `generation` is still current.
    fn apply<F>(&self, generation: u64, update: F) -> bool
    where
        F: FnOnce(&mut RunRecord),
    {
        let mut record = self.record();
        if record.generation != generation {
            tracing::debug!(generation, current = record.generation, "Discarding result from a superseded run");
            return false;
        }
        update(&mut record);
        true
    }

    /// Like `apply`, for the update that ends a run.
    fn settle<F>(&self, generation: u64, update: F) -> Outcome
    where
        F: FnOnce(&mut RunRecord),
    {
        let mut final_state = None;
        let applied = self.apply(generation, |record| {
            update(record);
            final_state = Some(record.state);
        });
        match final_state {
            Some(state) if applied => Outcome::Completed(state),
            _ => Outcome::Superseded,
        }
    }

    fn fail(&self, generation: u64, stage: &str, error: TransportError) -> Outcome {
        // Logged only once the run is known to be current.
        self.settle(generation, |record| {
            tracing::error!(generation, stage, error = %error, "Inference request failed");
            record.failure = Some(format!("Error during {stage}: {error}"));
            record.transition_to(ClassifierState::Failed);
        })
    }

    fn start_simulation(&self, generation: u64, source: Option<Raster>) -> bool {
        // Checked and started under one lock so a reset cannot slip in between.
        let mut record = self.record();
        if record.generation != generation {
            return false;
        }
        record.revealed_step = 1;
        self.inner.sequencer.start(source);
        true
    }
}

fn is_consistent(response: &ClassificationResponse) -> bool {
    response.all_predictions.values().any(|probability| *probability > CONSISTENCY_THRESHOLD)
}

impl TryFrom<ClassificationResponse> for ClassificationResult {
    type Error = crate::error::VineError;

    fn try_from(response: ClassificationResponse) -> Result<Self, Self::Error> {
        let disease = DiseaseClass::from_label(&response.predicted_class)?;
        Ok(Self {
            disease,
            confidence: response.confidence,
            all_predictions: response.all_predictions,
            info: disease.info(),
            remote_info: response.disease_info,
        })
    }
}
