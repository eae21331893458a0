pub mod raster;
pub mod renderer;
pub mod sequencer;
pub mod steps;
pub mod surface;
pub mod timer_registry;
