//! Expanding-radius search and optimistic claiming.

use std::collections::BTreeSet;

use tracing::debug;
use tracing::trace;
use tracing::warn;

use crate::constants::CANDIDATE_CLEAR_RETRIES;
use crate::DroneId;
use crate::Entity;
use crate::EntityStore;
use crate::FleetMetrics;
use crate::Job;
use crate::JobId;
use crate::JobState;
use crate::Location;
use crate::MatchingConfig;
use crate::StoreError;
use crate::Tracked;

/// Per-drone search progress carried between search attempts.
#[derive(Debug, Clone)]
pub struct SearchState {
    radius: f64,
    /// Whether the next attempt continues a failed search (and widens)
    widening: bool,
    failed_attempts: u32,
    /// Jobs this drone marked as candidates since its last claim
    marked: BTreeSet<JobId>,
}

impl SearchState {
    pub fn new(config: &MatchingConfig) -> Self {
        Self {
            radius: config.min_radius,
            widening: false,
            failed_attempts: 0,
            marked: BTreeSet::new(),
        }
    }

    pub fn radius(&self) -> f64 {
        self.radius
    }

    pub fn failed_attempts(&self) -> u32 {
        self.failed_attempts
    }

    pub fn marked(&self) -> impl Iterator<Item = &JobId> {
        self.marked.iter()
    }

    /// Radius for the next attempt: the minimum after a claim, otherwise the
    /// previous radius enlarged and capped.
    fn advance_radius(
        &mut self,
        config: &MatchingConfig,
    ) -> f64 {
        self.radius = if self.widening {
            (self.radius * config.enlargement_factor).min(config.max_radius)
        } else {
            config.min_radius
        };
        self.radius
    }
}

/// What one search attempt produced.
pub enum SearchOutcome {
    Claimed(Tracked<Job>),
    NotFound,
}

pub struct Matcher<'a> {
    jobs: &'a dyn EntityStore<Job>,
    config: &'a MatchingConfig,
    metrics: &'a FleetMetrics,
}

impl<'a> Matcher<'a> {
    pub fn new(
        jobs: &'a dyn EntityStore<Job>,
        config: &'a MatchingConfig,
        metrics: &'a FleetMetrics,
    ) -> Self {
        Self { jobs, config, metrics }
    }

    /// Runs one search attempt for a drone standing at `position`.
    ///
    /// Conflicts move on to the next candidate; a store fault counts as an
    /// attempt with no candidates. Neither is surfaced to the caller.
    pub fn search(
        &self,
        search: &mut SearchState,
        drone_id: DroneId,
        position: Location,
        mark_candidates: bool,
    ) -> SearchOutcome {
        let radius = search.advance_radius(self.config);

        let mut candidates = self.query(position, radius);
        if mark_candidates {
            for job in candidates.iter_mut() {
                self.mark(job, search);
            }
        }

        // stable: equal distances keep id order from the scan
        candidates.sort_by(|a, b| {
            position
                .distance_to(&a.origin())
                .total_cmp(&position.distance_to(&b.origin()))
        });

        for job in candidates {
            if job.origin() == position {
                // zero-length pickup leg, e.g. the job this drone just delivered
                continue;
            }

            let job_id = job.id();
            let cell = Tracked::new(job);
            self.metrics.claim_attempts.inc();
            let claimed = cell.write().claim_and_put(self.jobs, drone_id);
            match claimed {
                Ok(()) => {
                    self.metrics.claim_successes.inc();
                    debug!("drone {} claimed job {} at radius {:.3}", drone_id, job_id, radius);
                    search.widening = false;
                    search.failed_attempts = 0;
                    search.radius = self.config.min_radius;
                    return SearchOutcome::Claimed(cell);
                }
                Err(e) if e.is_conflict() => {
                    self.metrics.claim_conflicts.inc();
                    trace!("drone {} lost job {}: {}", drone_id, job_id, e);
                }
                Err(e) => {
                    self.metrics.store_faults.inc();
                    warn!("drone {} failed to claim job {}: {}", drone_id, job_id, e);
                }
            }
        }

        search.widening = true;
        search.failed_attempts += 1;
        SearchOutcome::NotFound
    }

    /// Clears the candidate mark on every job this drone marked. Jobs that
    /// left Waiting meanwhile are already clear.
    pub fn clear_candidates(
        &self,
        search: &mut SearchState,
    ) {
        for job_id in std::mem::take(&mut search.marked) {
            self.clear_candidate(job_id);
        }
    }

    fn query(
        &self,
        position: Location,
        radius: f64,
    ) -> Vec<Job> {
        self.metrics.job_queries.inc();
        let iter = match self.jobs.proximity_query(position, radius, JobState::Waiting) {
            Ok(iter) => iter,
            Err(e) => {
                self.metrics.store_faults.inc();
                warn!("job query at {} r={:.3} failed: {}", position, radius, e);
                return Vec::new();
            }
        };

        let mut found = Vec::new();
        for item in iter {
            match item {
                Ok(job) => found.push(job),
                Err(e) => {
                    self.metrics.store_faults.inc();
                    warn!("skipping unreadable job during query: {}", e);
                }
            }
        }
        self.metrics.job_query_results.inc_by(found.len() as u64);
        found
    }

    /// Marks `job` as a candidate and adopts the version the mark produced,
    /// so a following claim from this copy is not rejected by the mark.
    fn mark(
        &self,
        job: &mut Job,
        search: &mut SearchState,
    ) {
        if job.is_candidate() {
            return;
        }
        let cell = Tracked::new(job.clone());
        let marked = cell.write().set_candidate_and_put(self.jobs, true);
        match marked {
            Ok(()) => {
                search.marked.insert(job.id());
                *job = cell.snapshot();
            }
            Err(e) => trace!("could not mark job {} as candidate: {}", job.id(), e),
        }
    }

    fn clear_candidate(
        &self,
        job_id: JobId,
    ) {
        for _ in 0..CANDIDATE_CLEAR_RETRIES {
            let job = match self.jobs.get(job_id) {
                Ok(job) => job,
                Err(StoreError::NotFound { .. }) => return,
                Err(e) => {
                    warn!("could not read job {} to clear candidate: {}", job_id, e);
                    return;
                }
            };
            if !job.is_candidate() {
                return;
            }
            let cell = Tracked::new(job);
            let cleared = cell.write().set_candidate_and_put(self.jobs, false);
            match cleared {
                Ok(()) => return,
                Err(e) if e.is_conflict() => continue,
                Err(e) => {
                    warn!("could not clear candidate on job {}: {}", job_id, e);
                    return;
                }
            }
        }
        debug!("gave up clearing candidate on job {}", job_id);
    }
}
