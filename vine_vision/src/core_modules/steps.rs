// THEORY:
// The `steps` module holds the fixed script of the simulation: ten
// pseudo-processing steps, in order, each with a title, a caption and a dwell
// time. The table is static and shared read-only by every run. What each step
// *does* to the picture is described by `StepKind`, derived from the step's
// position so the renderer can match on it exhaustively.

use crate::core_modules::raster::raster::Channel;
use std::time::Duration;

/// Dwell time of every step unless overridden by configuration.
pub const DEFAULT_DWELL: Duration = Duration::from_millis(4000);

/// An immutable record describing one step of the simulation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepDescriptor {
    pub name: &'static str,
    pub description: &'static str,
    /// How long the step stays on screen before the next one is shown.
    pub dwell: Duration,
}

pub const STEP_COUNT: usize = 10;

pub static PROCESSING_STEPS: [StepDescriptor; STEP_COUNT] = [
    StepDescriptor { name: "Preprocessing", description: "Resizing to 128x128 pixels", dwell: DEFAULT_DWELL },
    StepDescriptor { name: "Conv2D Layer #1", description: "Applying convolutional filters", dwell: DEFAULT_DWELL },
    StepDescriptor { name: "MaxPooling #1", description: "Reducing dimensionality", dwell: DEFAULT_DWELL },
    StepDescriptor { name: "Conv2D Layer #2", description: "Extracting advanced features", dwell: DEFAULT_DWELL },
    StepDescriptor { name: "MaxPooling #2", description: "Compressing information", dwell: DEFAULT_DWELL },
    StepDescriptor { name: "Conv2D Layer #3", description: "High-level features", dwell: DEFAULT_DWELL },
    StepDescriptor { name: "MaxPooling #3", description: "Final reduction", dwell: DEFAULT_DWELL },
    StepDescriptor { name: "Flatten", description: "Converting to a 1D vector", dwell: DEFAULT_DWELL },
    StepDescriptor { name: "Dense Layer", description: "Dense neural processing", dwell: DEFAULT_DWELL },
    StepDescriptor { name: "Dropout", description: "Overfitting regularization", dwell: DEFAULT_DWELL },
];

/// The visual effect a step has on the working snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepKind {
    /// Resize the source image onto the square working snapshot.
    Preprocess,
    /// Emphasise one colour channel of the snapshot.
    Convolve(Channel),
    /// Halve the snapshot down to `size` x `size`.
    Pool { size: u32 },
    /// Synthetic bar vector, independent of the snapshot.
    Flatten,
    /// Synthetic node graph.
    Dense,
    /// Node graph with highlighted dropped nodes.
    Dropout,
}

impl StepKind {
    /// Maps a step index onto its effect. Returns `None` past the end of the table.
    pub fn for_step(step: usize) -> Option<StepKind> {
        let kind = match step {
            0 => StepKind::Preprocess,
            1 => StepKind::Convolve(Channel::Red),
            2 => StepKind::Pool { size: 64 },
            3 => StepKind::Convolve(Channel::Green),
            4 => StepKind::Pool { size: 32 },
            5 => StepKind::Convolve(Channel::Blue),
            6 => StepKind::Pool { size: 16 },
            7 => StepKind::Flatten,
            8 => StepKind::Dense,
            9 => StepKind::Dropout,
            _ => return None,
        };
        Some(kind)
    }

    /// Whether this step operates on the working snapshot.
    pub fn needs_snapshot(self) -> bool {
        matches!(self, StepKind::Convolve(_) | StepKind::Pool { .. })
    }
}

/// A step table with every dwell replaced, used when configuration overrides timing.
pub fn steps_with_dwell(dwell: Duration) -> Vec<StepDescriptor> {
    PROCESSING_STEPS
        .iter()
        .map(|step| StepDescriptor { dwell, ..step.clone() })
        .collect()
}
