// THEORY:
// The `StageSequencer` drives the decorative simulation. It walks the fixed step
// table one step at a time, transforms the working snapshot, renders a frame and
// schedules the next step after the current step's dwell time.
//
// Key architectural principles:
// 1.  **Explicit State**: Everything the simulation knows lives in one
//     `SimulationState` value with named transitions (`begin`, `enter`, `park`,
//     `finish`, `cancel`). `enter` refuses anything but the next step, so the step
//     index can only climb by one or drop back to idle.
// 2.  **Single Timer Chain**: There is never more than one pending transition.
//     Each rendered step schedules exactly one successor through the shared
//     `TimerRegistry`; the last step schedules nothing and goes idle.
// 3.  **Run Tokens**: Every `begin` and `cancel` bumps the run counter. A timer
//     callback carries the run it was scheduled for and is ignored if the
//     sequencer has moved on, even if it slipped past cancellation.
// 4.  **Never Abort the Chain**: A step that needs a snapshot it does not have
//     (the source failed to decode, say) renders without a picture and moves on.
// 5.  **Injected Surface**: The sequencer draws through an optional
//     `DrawingSurface`. If none is attached when a run starts, the start is retried
//     once after a short delay before the run is abandoned.

use crate::core_modules::raster::raster::{self, Raster};
use crate::core_modules::renderer::{self, Visual, BAR_COUNT, DROPPED_NODES};
use crate::core_modules::steps::{StepDescriptor, StepKind, PROCESSING_STEPS};
use crate::core_modules::surface::DrawingSurface;
use crate::core_modules::timer_registry::{TimerId, TimerRegistry};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use thiserror::Error;

/// Delay before the one retry when no surface is attached at start.
pub const SURFACE_RETRY_DELAY: Duration = Duration::from_millis(100);

/// A transition the state machine refused.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("cannot enter step {requested} from step {current:?}")]
    OutOfOrder { current: Option<usize>, requested: usize },
}

/// The observable state of the simulation.
#[derive(Debug, Clone, PartialEq)]
pub struct SimulationState {
    /// The step currently on screen; `None` while idle.
    current_step: Option<usize>,
    paused: bool,
    /// The working raster, absent until step 0 renders (or if the source was missing).
    snapshot: Option<Raster>,
    /// Dimensions of the working raster.
    dimensions: (u32, u32),
    /// A step whose timer fired while paused.
    parked: Option<usize>,
    /// Incremented on every `begin` and `cancel`.
    run: u64,
}

impl Default for SimulationState {
    fn default() -> Self {
        Self {
            current_step: None,
            paused: false,
            snapshot: None,
            dimensions: (raster::PREPROCESS_SIZE, raster::PREPROCESS_SIZE),
            parked: None,
            run: 0,
        }
    }
}

impl SimulationState {
    /// The step index with -1 meaning idle.
    pub fn step_index(&self) -> i32 {
        self.current_step.map_or(-1, |step| step as i32)
    }

    pub fn current_step(&self) -> Option<usize> {
        self.current_step
    }

    pub fn is_idle(&self) -> bool {
        self.current_step.is_none()
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn snapshot(&self) -> Option<&Raster> {
        self.snapshot.as_ref()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.dimensions
    }

    pub fn run(&self) -> u64 {
        self.run
    }

    /// Starts a new run and returns its token. Discards the previous snapshot.
    fn begin(&mut self) -> u64 {
        self.run += 1;
        self.current_step = None;
        self.paused = false;
        self.parked = None;
        self.snapshot = None;
        self.dimensions = (raster::PREPROCESS_SIZE, raster::PREPROCESS_SIZE);
        self.run
    }

    /// Moves onto `step`, which must be 0 from idle or exactly one past the current step.
    fn enter(&mut self, step: usize) -> Result<(), TransitionError> {
        let allowed = match self.current_step {
            None => step == 0,
            Some(current) => step == current + 1,
        };
        if !allowed {
            return Err(TransitionError::OutOfOrder {
                current: self.current_step,
                requested: step,
            });
        }
        self.current_step = Some(step);
        Ok(())
    }

    fn park(&mut self, step: usize) {
        self.parked = Some(step);
    }

    fn pause(&mut self) {
        self.paused = true;
    }

    /// Clears the paused flag and hands back any step that was parked meanwhile.
    fn resume(&mut self) -> Option<usize> {
        self.paused = false;
        self.parked.take()
    }

    fn finish(&mut self) {
        self.current_step = None;
        self.parked = None;
    }

    /// Invalidates the current run and returns to idle.
    fn cancel(&mut self) {
        self.run += 1;
        self.current_step = None;
        self.paused = false;
        self.parked = None;
        self.snapshot = None;
        self.dimensions = (raster::PREPROCESS_SIZE, raster::PREPROCESS_SIZE);
    }
}

/// Construction parameters for a `StageSequencer`.
#[derive(Debug, Clone)]
pub struct SequencerConfig {
    pub steps: Vec<StepDescriptor>,
    pub surface_retry_delay: Duration,
    /// Seed for the random bar heights and dropout positions.
    pub seed: u64,
}

impl Default for SequencerConfig {
    fn default() -> Self {
        Self {
            steps: PROCESSING_STEPS.to_vec(),
            surface_retry_delay: SURFACE_RETRY_DELAY,
            seed: 0x5eed,
        }
    }
}

struct SequencerCore {
    state: SimulationState,
    /// The image the current run was started with.
    source: Option<Raster>,
    /// The single outstanding transition (or surface retry), if any.
    pending: Option<TimerId>,
    rng: StdRng,
}

struct SequencerInner {
    steps: Vec<StepDescriptor>,
    retry_delay: Duration,
    registry: TimerRegistry,
    core: Mutex<SequencerCore>,
    surface: Mutex<Option<Box<dyn DrawingSurface>>>,
}

/// A cloneable handle to the simulation driver.
#[derive(Clone)]
pub struct StageSequencer {
    inner: Arc<SequencerInner>,
}

impl StageSequencer {
    pub fn new(registry: TimerRegistry, config: SequencerConfig) -> Self {
        let core = SequencerCore {
            state: SimulationState::default(),
            source: None,
            pending: None,
            rng: StdRng::seed_from_u64(config.seed),
        };
        Self {
            inner: Arc::new(SequencerInner {
                steps: config.steps,
                retry_delay: config.surface_retry_delay,
                registry,
                core: Mutex::new(core),
                surface: Mutex::new(None),
            }),
        }
    }

    fn core(&self) -> MutexGuard<'_, SequencerCore> {
        self.inner.core.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn surface(&self) -> MutexGuard<'_, Option<Box<dyn DrawingSurface>>> {
        self.inner.surface.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn steps(&self) -> &[StepDescriptor] {
        &self.inner.steps
    }

    /// Attaches the drawing target. Replaces any previous one.
    pub fn attach_surface(&self, surface: Box<dyn DrawingSurface>) {
        *self.surface() = Some(surface);
    }

    /// Detaches and returns the drawing target.
    pub fn detach_surface(&self) -> Option<Box<dyn DrawingSurface>> {
        self.surface().take()
    }

    pub fn has_surface(&self) -> bool {
        self.surface().is_some()
    }

    /// A copy of the current simulation state.
    pub fn state(&self) -> SimulationState {
        self.core().state.clone()
    }

    /// Begins a new run at step 0, abandoning any run in progress.
    pub fn start(&self, source: Option<Raster>) {
        let run = {
            let mut core = self.core();
            if let Some(id) = core.pending.take() {
                self.inner.registry.cancel(id);
            }
            core.source = source;
            core.state.begin()
        };
        tracing::debug!(run, "Starting simulation");
        self.launch(run, false);
    }

    fn launch(&self, run: u64, is_retry: bool) {
        if self.has_surface() {
            self.execute_step(run, 0);
            return;
        }

        let mut core = self.core();
        if core.state.run != run {
            return;
        }
        if is_retry {
            tracing::warn!(run, "Drawing surface still unavailable; abandoning simulation run");
            core.state.finish();
            core.pending = None;
            return;
        }

        tracing::debug!(run, delay = ?self.inner.retry_delay, "Drawing surface not ready; retrying once");
        let sequencer = self.clone();
        let id = self.inner.registry.schedule(self.inner.retry_delay, move || {
            sequencer.launch(run, true);
        });
        core.pending = Some(id);
    }

    /// Renders `step` for `run` and schedules its successor.
    fn execute_step(&self, run: u64, step: usize) {
        let mut core = self.core();
        if core.state.run != run {
            tracing::debug!(run, step, "Ignoring transition from a superseded run");
            return;
        }
        core.pending = None;

        if core.state.paused {
            tracing::debug!(step, "Simulation paused; parking step");
            core.state.park(step);
            return;
        }

        if let Err(e) = core.state.enter(step) {
            tracing::warn!(error = %e, "Refusing out-of-order step");
            return;
        }

        let Some(descriptor) = self.inner.steps.get(step).cloned() else {
            core.state.finish();
            return;
        };
        let visual = Self::advance_snapshot(&mut core, step);

        {
            let mut surface = self.surface();
            match surface.as_mut() {
                Some(surface) => renderer::render_frame(surface.as_mut(), step, &descriptor, &visual),
                None => tracing::debug!(step, "No surface attached; skipping frame"),
            }
        }
        tracing::debug!(step, name = descriptor.name, "Rendered simulation step");

        if step + 1 < self.inner.steps.len() {
            let sequencer = self.clone();
            let id = self.inner.registry.schedule(descriptor.dwell, move || {
                sequencer.execute_step(run, step + 1);
            });
            core.pending = Some(id);
        } else {
            core.state.finish();
            tracing::debug!(run, "Simulation complete");
        }
    }

    /// Applies the step's transform to the working snapshot and picks what to draw.
    fn advance_snapshot(core: &mut SequencerCore, step: usize) -> Visual {
        let Some(kind) = StepKind::for_step(step) else {
            return Visual::Empty;
        };

        if kind.needs_snapshot() && core.state.snapshot.is_none() {
            tracing::debug!(step, "No snapshot available; skipping visual");
            return Visual::Empty;
        }

        match kind {
            StepKind::Preprocess => match core.source.as_ref() {
                Some(source) => {
                    let working = raster::preprocess(source);
                    core.state.dimensions = working.dimensions();
                    core.state.snapshot = Some(working.clone());
                    Visual::Raster(working)
                }
                None => Visual::Empty,
            },
            StepKind::Convolve(channel) => {
                let Some(current) = core.state.snapshot.as_ref() else {
                    return Visual::Empty;
                };
                let filtered = raster::channel_attenuate(current, channel);
                core.state.snapshot = Some(filtered.clone());
                Visual::Raster(filtered)
            }
            StepKind::Pool { size } => {
                let Some(current) = core.state.snapshot.as_ref() else {
                    return Visual::Empty;
                };
                let pooled = raster::downsample(current, size, size);
                core.state.dimensions = pooled.dimensions();
                core.state.snapshot = Some(pooled.clone());
                Visual::Raster(pooled)
            }
            StepKind::Flatten => {
                let heights: Vec<f32> = (0..BAR_COUNT).map(|_| core.rng.gen_range(10.0..50.0)).collect();
                Visual::Bars(heights)
            }
            StepKind::Dense => Visual::Graph { dropped: Vec::new() },
            StepKind::Dropout => {
                let dropped: Vec<f32> = (0..DROPPED_NODES).map(|_| core.rng.gen_range(0.0..160.0)).collect();
                Visual::Graph { dropped }
            }
        }
    }

    /// Holds the chain at the next transition.
    pub fn pause(&self) {
        self.core().state.pause();
    }

    /// Releases a paused chain, rendering any step that came due meanwhile.
    pub fn resume(&self) {
        let (run, parked) = {
            let mut core = self.core();
            let parked = core.state.resume();
            (core.state.run, parked)
        };
        if let Some(step) = parked {
            self.execute_step(run, step);
        }
    }

    /// Halts every scheduled transition, wipes the surface and returns to idle.
    pub fn cancel_all(&self) {
        {
            let mut core = self.core();
            if let Some(id) = core.pending.take() {
                self.inner.registry.cancel(id);
            }
            core.state.cancel();
            core.source = None;
        }
        if let Some(surface) = self.surface().as_mut() {
            surface.clear();
        }
    }
}
