// THEORY:
// This file is the main entry point for the `vine_vision` library crate.
//
// The public face of the crate is the `ClassificationOrchestrator`: hand it an
// `ImageAsset` and it verifies the image, classifies it and plays the visual
// simulation, publishing the diagnosis only once the animation has run its
// course. The simulation machinery (`core_modules`) is public so a host can
// attach its own `DrawingSurface`, pause the sequencer or inspect its state, but
// most consumers only need the re-exports below.

pub mod asset;
pub mod backend;
pub mod config;
pub mod core_modules;
pub mod disease;
pub mod error;
pub mod orchestrator;

pub use asset::ImageAsset;
pub use backend::{ClassificationResponse, Endpoints, HttpBackend, InferenceBackend, VerificationResult};
pub use config::ClassifierConfig;
pub use core_modules::sequencer::{SequencerConfig, SimulationState, StageSequencer};
pub use core_modules::surface::{DrawingSurface, RasterSurface};
pub use disease::{DiseaseClass, DiseaseInfo, Severity};
pub use error::{Result, TransportError, VineError};
pub use orchestrator::{ClassificationOrchestrator, ClassificationResult, ClassifierSnapshot, ClassifierState, Outcome};
