use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::time::Duration;

use tracing::debug;

use super::DroneEvent;
use super::WaveBarrier;
use crate::Drone;
use crate::DroneId;
use crate::Entity;
use crate::RetirementPolicy;
use crate::WaveError;

/// What a wave asks of the fleet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaveSpec {
    /// Fleet size after growth
    pub total_drones: usize,
    /// Drones `1..=example_count` run as slowed-down, candidate-marking examples
    pub example_count: usize,
    pub max_trips_per_drone: u32,
    /// Length of one pacing tick
    pub tick_delay: Duration,
}

impl WaveSpec {
    pub fn new(
        total_drones: usize,
        example_count: usize,
        max_trips_per_drone: u32,
        tick_delay: Duration,
    ) -> Self {
        Self {
            total_drones,
            example_count,
            max_trips_per_drone,
            tick_delay,
        }
    }

    /// Checks the wave request against a fleet that currently has `fleet_size`
    /// drones. Fleets never shrink, so examples are counted against the
    /// larger of the two sizes.
    pub fn validate(
        &self,
        fleet_size: usize,
    ) -> Result<(), WaveError> {
        if self.max_trips_per_drone == 0 {
            return Err(WaveError::InvalidSpec("max_trips_per_drone must be > 0".into()));
        }
        let wave_size = self.total_drones.max(fleet_size);
        if self.example_count > wave_size {
            return Err(WaveError::InvalidSpec(format!(
                "example_count {} exceeds the {} drones of the wave",
                self.example_count, wave_size
            )));
        }
        Ok(())
    }
}

/// State shared by the drones of one wave.
pub struct WaveContext {
    pub number: u64,
    pub spec: WaveSpec,
    pub policy: RetirementPolicy,
    pub barrier: WaveBarrier,
    /// Lowest participant id; leads the cutoff together with the examples
    lead: Option<DroneId>,
    lead_finished: AtomicBool,
}

impl WaveContext {
    pub fn new(
        number: u64,
        spec: WaveSpec,
        policy: RetirementPolicy,
        participants: impl IntoIterator<Item = DroneId>,
    ) -> Self {
        let barrier = WaveBarrier::new(participants);
        Self {
            number,
            spec,
            policy,
            lead: barrier.outstanding().first().copied(),
            barrier,
            lead_finished: AtomicBool::new(false),
        }
    }

    pub fn lead_finished(&self) -> bool {
        self.lead_finished.load(Ordering::Acquire)
    }

    /// Decides, at Done, whether `drone` goes back to Ready or off duty.
    pub fn decide_at_done(
        &self,
        drone: &Drone,
    ) -> DroneEvent {
        if !drone.retire_requested() {
            return DroneEvent::Continue;
        }

        match self.policy {
            RetirementPolicy::Quota => DroneEvent::Retire,
            RetirementPolicy::LeadCutoff => {
                if self.is_lead(drone) && !self.lead_finished.swap(true, Ordering::AcqRel) {
                    debug!(
                        "wave {}: lead drone {} finished, others may retire",
                        self.number,
                        drone.id()
                    );
                }
                if self.lead_finished() {
                    DroneEvent::Retire
                } else {
                    DroneEvent::Continue
                }
            }
        }
    }

    /// Example drones and the first drone of the wave end it for everyone
    /// else.
    fn is_lead(
        &self,
        drone: &Drone,
    ) -> bool {
        drone.is_example() || self.lead == Some(drone.id())
    }
}
