//! Matching and dispatch engine.
//!
//! A [`Fleet`] activates drones in waves. Every drone is driven by a
//! [`DroneAgent`] whose steps run on the [`StepScheduler`]: search with an
//! expanding radius, claim optimistically, travel, deliver, then loop or
//! retire. Waves settle on a [`WaveBarrier`].

mod agent;
mod backlog;
mod barrier;
mod context;
mod fleet;
mod matching;
mod scheduler;
mod state_machine;
mod wave;

pub use agent::*;
pub use backlog::*;
pub use barrier::*;
pub use context::*;
pub use fleet::*;
pub use matching::*;
pub use scheduler::*;
pub use state_machine::*;
pub use wave::*;

#[cfg(test)]
mod wave_test;
