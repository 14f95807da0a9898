use std::sync::Arc;

use tracing::debug;
use tracing::trace;

use crate::count_in_state;
use crate::BacklogConfig;
use crate::Entity;
use crate::EntityStore;
use crate::FleetMetrics;
use crate::Job;
use crate::JobState;
use crate::LocationSampler;
use crate::StoreResult;
use crate::Tracked;

/// Keeps enough Waiting jobs around for the fleet to stay busy.
pub struct BacklogPolicy<'a> {
    config: &'a BacklogConfig,
    jobs: &'a dyn EntityStore<Job>,
    sampler: &'a LocationSampler,
    metrics: &'a FleetMetrics,
}

impl<'a> BacklogPolicy<'a> {
    pub fn new(
        config: &'a BacklogConfig,
        jobs: &'a dyn EntityStore<Job>,
        sampler: &'a LocationSampler,
        metrics: &'a FleetMetrics,
    ) -> Self {
        Self {
            config,
            jobs,
            sampler,
            metrics,
        }
    }

    /// Waiting jobs wanted for a fleet of `fleet_size` drones.
    pub fn target(&self, fleet_size: usize) -> usize {
        // absorbs representation error: 100 drones at 1.1 want 110 jobs, not 111
        let overcommitted = (fleet_size as f64 * self.config.overcommit_factor - 1e-9).ceil() as usize;
        overcommitted.max(self.config.floor)
    }

    /// Creates jobs until the Waiting count reaches the target. Returns the
    /// number of jobs created.
    pub fn replenish(
        &self,
        fleet_size: usize,
    ) -> StoreResult<usize> {
        let waiting = count_in_state(self.jobs, JobState::Waiting)?;
        let target = self.target(fleet_size);
        let missing = target.saturating_sub(waiting);

        for _ in 0..missing {
            let job = self.jobs.create(Job::new(self.sampler.random(), self.sampler.random()))?;
            let cell = Tracked::new(job);
            cell.write().change_state_and_put(self.jobs, JobState::Init, JobState::Waiting)?;
            self.metrics.jobs_created.inc();
        }

        debug!(
            "backlog: {} waiting, target {}, created {}",
            waiting, target, missing
        );
        Ok(missing)
    }

    /// Moves up to `slots` OnHold jobs back to Waiting, one per slot.
    /// Returns how many were promoted.
    pub fn promote_on_hold(
        &self,
        slots: usize,
    ) -> StoreResult<usize> {
        if slots == 0 {
            return Ok(0);
        }

        let mut promoted = 0;
        let held = self
            .jobs
            .scan_all(Arc::new(|j: &Job| j.state() == JobState::OnHold))?;
        for job in held {
            if promoted == slots {
                break;
            }
            let cell = Tracked::new(job?);
            let outcome = cell
                .write()
                .change_state_and_put(self.jobs, JobState::OnHold, JobState::Waiting);
            match outcome {
                Ok(()) => {
                    promoted += 1;
                    self.metrics.promotions.inc();
                }
                Err(e) if e.is_conflict() => trace!("promotion of job {} lost: {}", cell.id(), e),
                Err(e) => return Err(e),
            }
        }
        Ok(promoted)
    }
}
