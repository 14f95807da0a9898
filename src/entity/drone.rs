use serde::Deserialize;
use serde::Serialize;

use super::DroneId;
use super::Entity;
use super::EntityId;
use super::JobId;
use super::Location;
use super::WriteScope;
use crate::EntityStore;
use crate::StoreResult;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DroneState {
    Init,
    Ready,
    GotAJob,
    Departing,
    EnRoute,
    ArrivedAtJob,
    Delivering,
    Delivered,
    Done,
    OffDuty,
}

impl DroneState {
    /// States in which the drone owns a claimed job.
    pub fn holds_job(self) -> bool {
        use DroneState::*;
        matches!(
            self,
            GotAJob | Departing | EnRoute | ArrivedAtJob | Delivering | Delivered | Done
        )
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Drone {
    id: DroneId,
    state: DroneState,
    location: Location,
    job_id: Option<JobId>,
    trips: u32,
    retire_requested: bool,
    example: bool,
    radius: f64,
    version: u64,
}

impl Drone {
    pub fn new(location: Location) -> Self {
        Self {
            id: 0,
            state: DroneState::Init,
            location,
            job_id: None,
            trips: 0,
            retire_requested: false,
            example: false,
            radius: 0.0,
            version: 0,
        }
    }

    pub fn location(&self) -> Location {
        self.location
    }

    pub fn job_id(&self) -> Option<JobId> {
        self.job_id
    }

    /// Deliveries completed since the drone was last activated.
    pub fn trips(&self) -> u32 {
        self.trips
    }

    pub fn retire_requested(&self) -> bool {
        self.retire_requested
    }

    pub fn is_example(&self) -> bool {
        self.example
    }

    /// Radius of the most recent search.
    pub fn radius(&self) -> f64 {
        self.radius
    }
}

impl Entity for Drone {
    type State = DroneState;

    const KIND: &'static str = "drone";

    fn id(&self) -> EntityId {
        self.id
    }

    fn version(&self) -> u64 {
        self.version
    }

    fn state(&self) -> DroneState {
        self.state
    }

    fn anchor(&self) -> Location {
        self.location
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

// Drones have a single writer (their agent, or the coordinator while the
// drone is inactive), so changes are staged locally and persisted together
// with the next state change.
impl WriteScope<'_, Drone> {
    /// Persists the drone in state `to`, together with all staged changes.
    ///
    /// # Panics
    /// When the staged job assignment does not match `to`.
    pub fn set_state_and_put(
        &mut self,
        store: &dyn EntityStore<Drone>,
        to: DroneState,
    ) -> StoreResult<()> {
        assert_eq!(
            to.holds_job(),
            self.job_id.is_some(),
            "drone {} entering {to:?} with job {:?}",
            self.id,
            self.job_id
        );
        self.modify_and_put(store, |drone| drone.state = to)
    }

    /// Takes a drone whose steps stopped mid-wave off duty and drops its job
    /// reference. Drones that are idle already are left untouched. Returns
    /// whether a write happened.
    pub fn stand_down_and_put(
        &mut self,
        store: &dyn EntityStore<Drone>,
    ) -> StoreResult<bool> {
        let idle = matches!(self.state, DroneState::Init | DroneState::OffDuty);
        if idle && self.job_id.is_none() {
            return Ok(false);
        }
        let to = if self.state == DroneState::Init {
            DroneState::Init
        } else {
            DroneState::OffDuty
        };
        self.modify_and_put(store, |drone| {
            drone.job_id = None;
            drone.state = to;
        })?;
        Ok(true)
    }

    /// Moves the local copy to `to` without persisting it, for when the
    /// store keeps rejecting the write and the agent has to go on.
    pub(crate) fn stage_state(
        &mut self,
        to: DroneState,
    ) {
        self.record_mut().state = to;
    }

    pub fn set_example_and_put(
        &mut self,
        store: &dyn EntityStore<Drone>,
        example: bool,
    ) -> StoreResult<()> {
        self.modify_and_put(store, |drone| drone.example = example)
    }

    pub fn stage_job(
        &mut self,
        job_id: Option<JobId>,
    ) {
        self.record_mut().job_id = job_id;
    }

    pub fn stage_location(
        &mut self,
        location: Location,
    ) {
        self.record_mut().location = location;
    }

    pub fn stage_radius(
        &mut self,
        radius: f64,
    ) {
        self.record_mut().radius = radius;
    }

    pub fn stage_reset_trips(&mut self) {
        let drone = self.record_mut();
        drone.trips = 0;
        drone.retire_requested = false;
    }

    /// Counts one delivery and requests retirement once `max_trips` is
    /// reached. Returns whether retirement is requested.
    pub fn stage_trip_completed(
        &mut self,
        max_trips: u32,
    ) -> bool {
        let drone = self.record_mut();
        drone.trips += 1;
        if drone.trips >= max_trips {
            drone.retire_requested = true;
        }
        drone.retire_requested
    }
}
