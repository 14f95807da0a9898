//! Drone lifecycle as a pure transition function.
//!
//! The agent computes an event from the world (claim outcome, motion
//! progress, retirement decision), asks [`transition`] for the next state
//! and the effects to perform, and performs them itself.

use crate::constants::ARRIVED_TICKS;
use crate::constants::DELIVERED_TICKS;
use crate::constants::DEPARTING_TICKS;
use crate::constants::GOT_A_JOB_TICKS;
use crate::constants::INIT_TICKS;
use crate::constants::SEARCH_RETRY_TICKS;
use crate::DroneState;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DroneEvent {
    /// Activation by a wave (from Init or OffDuty)
    Start,
    Claimed,
    NotFound,
    /// A timed pause elapsed
    Tick,
    Moved,
    Arrived,
    /// Keep delivering
    Continue,
    Retire,
}

/// How the agent continues after a step.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Pace {
    /// Run the next step right away, on the same worker
    Immediate,
    /// Reschedule after this many ticks
    Delay(u32),
    /// Reschedule after one motion interval
    Motion,
    /// Stop until the next activation
    Park,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Effect {
    ResetTrips,
    /// Clear the candidate mark of every job marked during the search
    ClearCandidates,
    AttachJob,
    /// Restart the acceleration ramp for a new leg
    StartLeg,
    StampPickup,
    /// Count the delivery and request retirement once the quota is reached
    CompleteTrip,
    /// Hand the job back to the pool with fresh coordinates
    ReleaseJob,
    SignalBarrier,
    Deactivate,
    Schedule(Pace),
}

impl Effect {
    /// Effects performed only once the new drone state is persisted.
    pub fn after_commit(self) -> bool {
        matches!(self, Effect::SignalBarrier | Effect::Deactivate | Effect::Schedule(_))
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Transition {
    pub next: DroneState,
    pub effects: Vec<Effect>,
}

impl Transition {
    /// The pace this transition ends with.
    pub fn pace(&self) -> Pace {
        self.effects
            .iter()
            .find_map(|e| match e {
                Effect::Schedule(pace) => Some(*pace),
                _ => None,
            })
            .unwrap_or(Pace::Park)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
#[error("illegal drone transition: {event:?} in state {state:?}")]
pub struct IllegalTransition {
    pub state: DroneState,
    pub event: DroneEvent,
}

pub fn transition(
    state: DroneState,
    event: DroneEvent,
) -> Result<Transition, IllegalTransition> {
    use DroneEvent as Ev;
    use DroneState::*;
    use Effect::*;

    let (next, effects) = match (state, event) {
        (Init, Ev::Start) => (Ready, vec![ResetTrips, Schedule(Pace::Delay(INIT_TICKS))]),
        (OffDuty, Ev::Start) => (Init, vec![Schedule(Pace::Immediate)]),

        (Ready, Ev::Claimed) => (
            GotAJob,
            vec![ClearCandidates, AttachJob, Schedule(Pace::Delay(GOT_A_JOB_TICKS))],
        ),
        (Ready, Ev::NotFound) => (Ready, vec![Schedule(Pace::Delay(SEARCH_RETRY_TICKS))]),

        (GotAJob, Ev::Tick) => (Departing, vec![Schedule(Pace::Delay(DEPARTING_TICKS))]),
        (Departing, Ev::Tick) => (EnRoute, vec![StartLeg, Schedule(Pace::Immediate)]),

        (EnRoute, Ev::Moved) => (EnRoute, vec![Schedule(Pace::Motion)]),
        (EnRoute, Ev::Arrived) => (
            ArrivedAtJob,
            vec![StampPickup, Schedule(Pace::Delay(ARRIVED_TICKS))],
        ),

        (ArrivedAtJob, Ev::Tick) => (Delivering, vec![StartLeg, Schedule(Pace::Immediate)]),

        (Delivering, Ev::Moved) => (Delivering, vec![Schedule(Pace::Motion)]),
        (Delivering, Ev::Arrived) => (
            Delivered,
            vec![CompleteTrip, Schedule(Pace::Delay(DELIVERED_TICKS))],
        ),

        (Delivered, Ev::Tick) => (Done, vec![Schedule(Pace::Immediate)]),

        (Done, Ev::Continue) => (Ready, vec![ReleaseJob, Schedule(Pace::Immediate)]),
        (Done, Ev::Retire) => (
            OffDuty,
            vec![ReleaseJob, Deactivate, SignalBarrier, Schedule(Pace::Park)],
        ),

        (state, event) => return Err(IllegalTransition { state, event }),
    };

    Ok(Transition { next, effects })
}
