use serde::Deserialize;
use serde::Serialize;

use super::DroneId;
use super::Entity;
use super::EntityId;
use super::JobId;
use super::Location;
use super::WriteScope;
use crate::EntityStore;
use crate::StoreError;
use crate::StoreResult;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JobState {
    /// Constructed, not yet offered
    Init,
    Waiting,
    InProcess,
    /// Parked after an exceptional release, waiting for promotion
    OnHold,
}

impl JobState {
    pub fn can_transition_to(
        self,
        to: JobState,
    ) -> bool {
        use JobState::*;
        matches!(
            (self, to),
            (Init, Waiting) | (Waiting, InProcess) | (InProcess, Waiting) | (InProcess, OnHold) | (OnHold, Waiting)
        )
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Job {
    id: JobId,
    state: JobState,
    origin: Location,
    destination: Location,
    location: Location,
    previous_location: Location,
    drone_id: Option<DroneId>,
    candidate: bool,
    version: u64,
    picked_up_at: Option<u64>,
    delivered_at: Option<u64>,
}

impl Job {
    pub fn new(
        origin: Location,
        destination: Location,
    ) -> Self {
        Self {
            id: 0,
            state: JobState::Init,
            origin,
            destination,
            location: origin,
            previous_location: origin,
            drone_id: None,
            candidate: false,
            version: 0,
            picked_up_at: None,
            delivered_at: None,
        }
    }

    pub fn origin(&self) -> Location {
        self.origin
    }

    pub fn destination(&self) -> Location {
        self.destination
    }

    /// Current position; follows the drone while the job is being delivered.
    pub fn location(&self) -> Location {
        self.location
    }

    pub fn previous_location(&self) -> Location {
        self.previous_location
    }

    pub fn drone_id(&self) -> Option<DroneId> {
        self.drone_id
    }

    pub fn is_candidate(&self) -> bool {
        self.candidate
    }

    pub fn picked_up_at(&self) -> Option<u64> {
        self.picked_up_at
    }

    pub fn delivered_at(&self) -> Option<u64> {
        self.delivered_at
    }
}

impl Entity for Job {
    type State = JobState;

    const KIND: &'static str = "job";

    fn id(&self) -> EntityId {
        self.id
    }

    fn version(&self) -> u64 {
        self.version
    }

    fn state(&self) -> JobState {
        self.state
    }

    fn anchor(&self) -> Location {
        self.origin
    }

    fn assign_id(
        &mut self,
        id: EntityId,
    ) {
        self.id = id;
    }

    fn set_version(
        &mut self,
        version: u64,
    ) {
        self.version = version;
    }
}

impl WriteScope<'_, Job> {
    /// Persists the transition `from -> to`.
    ///
    /// Fails as a conflict when the local state is not `from`; the local
    /// version ties it to the persisted state, so a stale copy is caught by
    /// the store as well. Leaving `Waiting` clears the candidate mark in the
    /// same write.
    ///
    /// # Panics
    /// When `from -> to` is not an edge of the job state machine.
    pub fn change_state_and_put(
        &mut self,
        store: &dyn EntityStore<Job>,
        from: JobState,
        to: JobState,
    ) -> StoreResult<()> {
        self.transition_and_put(store, from, to, |_| {})
    }

    /// Claims a Waiting job for `drone_id`.
    pub fn claim_and_put(
        &mut self,
        store: &dyn EntityStore<Job>,
        drone_id: DroneId,
    ) -> StoreResult<()> {
        self.transition_and_put(store, JobState::Waiting, JobState::InProcess, |job| {
            job.drone_id = Some(drone_id);
        })
    }

    /// Hands a delivered job back: its destination becomes the new origin
    /// and `next_destination` the new destination.
    pub fn release_and_put(
        &mut self,
        store: &dyn EntityStore<Job>,
        next_destination: Location,
        hold: bool,
    ) -> StoreResult<()> {
        let to = if hold { JobState::OnHold } else { JobState::Waiting };
        self.transition_and_put(store, JobState::InProcess, to, |job| {
            job.origin = job.destination;
            job.previous_location = job.location;
            job.location = job.origin;
            job.destination = next_destination;
        })
    }

    /// Returns a job whose drone stopped before delivering it. The job is
    /// offered again from wherever it was left.
    pub fn abandon_and_put(
        &mut self,
        store: &dyn EntityStore<Job>,
    ) -> StoreResult<()> {
        self.transition_and_put(store, JobState::InProcess, JobState::Waiting, |job| {
            job.origin = job.location;
            job.previous_location = job.location;
        })
    }

    /// Writes the advisory candidate mark. Only Waiting jobs can be marked.
    pub fn set_candidate_and_put(
        &mut self,
        store: &dyn EntityStore<Job>,
        candidate: bool,
    ) -> StoreResult<()> {
        if candidate && self.state != JobState::Waiting {
            return Err(self.stale_state());
        }
        self.modify_and_put(store, |job| job.candidate = candidate)
    }

    pub fn move_to_and_put(
        &mut self,
        store: &dyn EntityStore<Job>,
        location: Location,
    ) -> StoreResult<()> {
        self.modify_and_put(store, |job| {
            job.previous_location = job.location;
            job.location = location;
        })
    }

    pub fn stamp_pickup_and_put(
        &mut self,
        store: &dyn EntityStore<Job>,
        now_ms: u64,
    ) -> StoreResult<()> {
        self.modify_and_put(store, |job| {
            job.picked_up_at = Some(now_ms);
            job.delivered_at = None;
        })
    }

    pub fn stamp_delivery_and_put(
        &mut self,
        store: &dyn EntityStore<Job>,
        now_ms: u64,
    ) -> StoreResult<()> {
        self.modify_and_put(store, |job| job.delivered_at = Some(now_ms))
    }

    fn transition_and_put(
        &mut self,
        store: &dyn EntityStore<Job>,
        from: JobState,
        to: JobState,
        update: impl FnOnce(&mut Job),
    ) -> StoreResult<()> {
        assert!(
            from.can_transition_to(to),
            "illegal job transition {from:?} -> {to:?} for job {}",
            self.id
        );
        if self.state != from {
            return Err(self.stale_state());
        }
        self.modify_and_put(store, |job| {
            job.state = to;
            if to != JobState::Waiting {
                job.candidate = false;
            }
            if to != JobState::InProcess {
                job.drone_id = None;
            }
            update(job);
        })
    }

    fn stale_state(&self) -> StoreError {
        StoreError::Conflict {
            kind: Job::KIND,
            id: self.id,
            expected: self.version,
            actual: None,
        }
    }
}
