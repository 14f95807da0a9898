//! Drives one drone through its lifecycle, one short step at a time.

use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::debug;
use tracing::error;
use tracing::trace;
use tracing::warn;

use super::transition;
use super::DroneEvent;
use super::Effect;
use super::FleetContext;
use super::Matcher;
use super::Pace;
use super::SearchOutcome;
use super::SearchState;
use super::Transition;
use super::WaveContext;
use crate::constants::MOTION_TICKS;
use crate::constants::OWNER_WRITE_RETRIES;
use crate::utils::time::now_millis;
use crate::Drone;
use crate::DroneId;
use crate::DroneState;
use crate::Entity;
use crate::EntityStore;
use crate::Job;
use crate::Location;
use crate::StoreResult;
use crate::Tracked;
use crate::WriteScope;

pub struct DroneAgent {
    id: DroneId,
    drone: Tracked<Drone>,
    runtime: Mutex<AgentRuntime>,
    active: AtomicBool,
}

/// Step-to-step memory of an agent. Locked for the whole duration of a
/// step, so steps of one drone never overlap.
struct AgentRuntime {
    search: SearchState,
    job: Option<Tracked<Job>>,
    /// Position on the acceleration ramp of the current leg
    speed_step: u32,
    wave: Option<Arc<WaveContext>>,
}

impl DroneAgent {
    pub(crate) fn new(
        drone: Drone,
        ctx: &FleetContext,
    ) -> Self {
        Self {
            id: drone.id(),
            drone: Tracked::new(drone),
            runtime: Mutex::new(AgentRuntime {
                search: SearchState::new(&ctx.config.matching),
                job: None,
                speed_step: 0,
                wave: None,
            }),
            active: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> DroneId {
        self.id
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    pub fn snapshot(&self) -> Drone {
        self.drone.snapshot()
    }

    /// Sets the example flag. Only called while the drone is inactive.
    pub(crate) fn set_example(
        &self,
        store: &dyn EntityStore<Drone>,
        example: bool,
    ) -> StoreResult<()> {
        let mut scope = self.drone.write();
        if scope.is_example() == example {
            return Ok(());
        }
        scope.set_example_and_put(store, example)
    }

    /// Joins `wave` and submits the first step. Returns `false` when the
    /// drone is already running or the scheduler refused the step.
    pub(crate) fn activate(
        self: &Arc<Self>,
        ctx: &Arc<FleetContext>,
        wave: Arc<WaveContext>,
    ) -> bool {
        if self.active.swap(true, Ordering::AcqRel) {
            return false;
        }
        self.runtime.lock().wave = Some(wave);

        let agent = self.clone();
        let step_ctx = ctx.clone();
        if !ctx.scheduler.submit(move || drive(agent, step_ctx)) {
            self.runtime.lock().wave = None;
            self.active.store(false, Ordering::Release);
            return false;
        }
        true
    }

    /// Leaves the current wave without finishing it, after the scheduler
    /// stopped running steps: the held job goes back to the pool, marks are
    /// cleared and the drone goes off duty.
    ///
    /// A job that cannot be handed back here stays InProcess in the store and
    /// is released when the fleet is next opened.
    pub(crate) fn stand_down(
        &self,
        ctx: &FleetContext,
    ) -> StoreResult<()> {
        let mut rt = self.runtime.lock();
        if let Some(job) = rt.job.take() {
            let mut scope = job.write();
            match scope.abandon_and_put(ctx.stores.jobs.as_ref()) {
                Ok(()) => debug!("drone {} handed back job {}", self.id, scope.id()),
                Err(e) => warn!("drone {} could not hand back job {}: {}", self.id, scope.id(), e),
            }
        }
        Matcher::new(ctx.stores.jobs.as_ref(), &ctx.config.matching, &ctx.metrics)
            .clear_candidates(&mut rt.search);
        rt.search = SearchState::new(&ctx.config.matching);
        rt.speed_step = 0;
        rt.wave = None;

        let drones = ctx.stores.drones.as_ref();
        let mut scope = self.drone.write();
        if let Err(e) = scope.stand_down_and_put(drones) {
            if !e.is_conflict() {
                return Err(e);
            }
            scope.adopt_version(drones)?;
            scope.stand_down_and_put(drones)?;
        }
        self.active.store(false, Ordering::Release);
        Ok(())
    }

    /// Runs steps until one asks for a delay (returned) or parks the drone.
    fn run_until_suspended(
        &self,
        ctx: &FleetContext,
    ) -> Option<Duration> {
        let mut rt = self.runtime.lock();
        loop {
            let state = self.drone.blocking_read(|d| d.state());
            let event = self.next_event(state, &mut rt, ctx);
            let transition =
                transition(state, event).unwrap_or_else(|e| panic!("drone {}: {}", self.id, e));
            trace!("drone {}: {:?} --{:?}--> {:?}", self.id, state, event, transition.next);

            match self.apply(transition, &mut rt, ctx) {
                Pace::Immediate => continue,
                Pace::Delay(ticks) => return Some(self.pace_delay(ticks, &rt, ctx)),
                Pace::Motion => return Some(self.pace_delay(MOTION_TICKS, &rt, ctx)),
                Pace::Park => return None,
            }
        }
    }

    fn next_event(
        &self,
        state: DroneState,
        rt: &mut AgentRuntime,
        ctx: &FleetContext,
    ) -> DroneEvent {
        match state {
            DroneState::Init | DroneState::OffDuty => DroneEvent::Start,
            DroneState::Ready => self.search(rt, ctx),
            DroneState::GotAJob
            | DroneState::Departing
            | DroneState::ArrivedAtJob
            | DroneState::Delivered => DroneEvent::Tick,
            DroneState::EnRoute => {
                let pickup = self.held_job(rt, state).blocking_read(|j| j.origin());
                self.advance(pickup, false, rt, ctx)
            }
            DroneState::Delivering => {
                let drop_off = self.held_job(rt, state).blocking_read(|j| j.destination());
                self.advance(drop_off, true, rt, ctx)
            }
            DroneState::Done => match &rt.wave {
                Some(wave) => self.drone.blocking_read(|d| wave.decide_at_done(d)),
                None => DroneEvent::Retire,
            },
        }
    }

    fn search(
        &self,
        rt: &mut AgentRuntime,
        ctx: &FleetContext,
    ) -> DroneEvent {
        let (position, example) = self.drone.blocking_read(|d| (d.location(), d.is_example()));
        let mark = ctx.config.matching.candidate_marking.applies_to(example);
        let matcher = Matcher::new(ctx.stores.jobs.as_ref(), &ctx.config.matching, &ctx.metrics);

        match matcher.search(&mut rt.search, self.id, position, mark) {
            SearchOutcome::Claimed(job) => {
                rt.job = Some(job);
                DroneEvent::Claimed
            }
            SearchOutcome::NotFound => {
                trace!(
                    "drone {} found nothing within {:.3} ({} misses)",
                    self.id,
                    rt.search.radius(),
                    rt.search.failed_attempts()
                );
                DroneEvent::NotFound
            }
        }
    }

    /// Moves one motion step towards `target`, accelerating over the first
    /// steps of the leg. A carried job moves along.
    fn advance(
        &self,
        target: Location,
        carry_job: bool,
        rt: &mut AgentRuntime,
        ctx: &FleetContext,
    ) -> DroneEvent {
        let motion = &ctx.config.motion;
        rt.speed_step = (rt.speed_step + 1).min(motion.speed_steps);
        let step = motion.step_distance * f64::from(rt.speed_step) / f64::from(motion.speed_steps);

        let next = {
            let mut scope = self.drone.write();
            let next = scope.location().part_way(step, &target);
            scope.stage_location(next);
            next
        };

        if carry_job {
            self.update_job(rt, ctx, |job, store| job.move_to_and_put(store, next));
        }

        if next == target {
            DroneEvent::Arrived
        } else {
            DroneEvent::Moved
        }
    }

    /// Performs the effects of `transition` around persisting the new state.
    fn apply(
        &self,
        transition: Transition,
        rt: &mut AgentRuntime,
        ctx: &FleetContext,
    ) -> Pace {
        let Transition { next, effects } = transition;

        {
            let mut scope = self.drone.write();
            for effect in effects.iter().copied().filter(|e| !e.after_commit()) {
                match effect {
                    Effect::ResetTrips => scope.stage_reset_trips(),
                    Effect::ClearCandidates => {
                        Matcher::new(ctx.stores.jobs.as_ref(), &ctx.config.matching, &ctx.metrics)
                            .clear_candidates(&mut rt.search);
                    }
                    Effect::AttachJob => scope.stage_job(rt.job.as_ref().map(|j| j.id())),
                    Effect::StartLeg => rt.speed_step = 0,
                    Effect::StampPickup => {
                        let now = now_millis();
                        self.update_job(rt, ctx, |job, store| job.stamp_pickup_and_put(store, now));
                    }
                    Effect::CompleteTrip => {
                        let max_trips = rt.wave.as_ref().map_or(u32::MAX, |w| w.spec.max_trips_per_drone);
                        if scope.stage_trip_completed(max_trips) {
                            debug!("drone {} reached {} trips", self.id, scope.trips());
                        }
                        ctx.metrics.deliveries.inc();
                        let now = now_millis();
                        self.update_job(rt, ctx, |job, store| job.stamp_delivery_and_put(store, now));
                    }
                    Effect::ReleaseJob => {
                        self.release_job(rt, ctx);
                        scope.stage_job(None);
                    }
                    Effect::SignalBarrier | Effect::Deactivate | Effect::Schedule(_) => {}
                }
            }
            scope.stage_radius(rt.search.radius());
            self.persist(&mut scope, next, ctx);
        }

        let mut pace = Pace::Park;
        let mut retired_from = None;
        for effect in effects.into_iter().filter(|e| e.after_commit()) {
            match effect {
                Effect::Deactivate => {
                    retired_from = rt.wave.take();
                    self.active.store(false, Ordering::Release);
                }
                Effect::SignalBarrier => {
                    if let Some(wave) = retired_from.as_ref().or(rt.wave.as_ref()) {
                        debug!("drone {} off duty, signaling wave {}", self.id, wave.number);
                        wave.barrier.signal(self.id);
                    }
                }
                Effect::Schedule(p) => pace = p,
                _ => {}
            }
        }
        pace
    }

    /// Persists the drone in state `next`. The drone has a single writer, so
    /// a conflict only means the local version is stale; the write is
    /// retried on the persisted version. If the store keeps refusing, the
    /// local copy still moves on.
    fn persist(
        &self,
        scope: &mut WriteScope<'_, Drone>,
        next: DroneState,
        ctx: &FleetContext,
    ) {
        let store = ctx.stores.drones.as_ref();
        for _ in 0..OWNER_WRITE_RETRIES {
            match scope.set_state_and_put(store, next) {
                Ok(()) => return,
                Err(e) if e.is_conflict() => {
                    warn!("drone {}: {}; adopting persisted version", self.id, e);
                    if let Err(e) = scope.adopt_version(store) {
                        error!("drone {} could not re-read its record: {}", self.id, e);
                        break;
                    }
                }
                Err(e) => {
                    error!("drone {} could not persist {:?}: {}", self.id, next, e);
                    break;
                }
            }
        }
        scope.stage_state(next);
    }

    /// Hands the held job back with fresh coordinates, to Waiting or, by
    /// chance, OnHold.
    fn release_job(
        &self,
        rt: &mut AgentRuntime,
        ctx: &FleetContext,
    ) {
        let next_destination = ctx.sampler.random();
        let hold = ctx.sampler.chance(ctx.config.backlog.hold_probability);
        self.update_job(rt, ctx, |job, store| {
            job.release_and_put(store, next_destination, hold)
        });
        if hold {
            ctx.metrics.holds.inc();
        }
        rt.job = None;
    }

    /// Applies an owner write to the held job, retrying on a stale version.
    fn update_job(
        &self,
        rt: &AgentRuntime,
        ctx: &FleetContext,
        op: impl Fn(&mut WriteScope<'_, Job>, &dyn EntityStore<Job>) -> StoreResult<()>,
    ) {
        let Some(job) = rt.job.as_ref() else {
            return;
        };
        let store = ctx.stores.jobs.as_ref();
        let mut scope = job.write();
        for _ in 0..OWNER_WRITE_RETRIES {
            match op(&mut scope, store) {
                Ok(()) => return,
                Err(e) if e.is_conflict() => {
                    if let Err(e) = scope.adopt_version(store) {
                        warn!("drone {} lost track of job {}: {}", self.id, scope.id(), e);
                        return;
                    }
                }
                Err(e) => {
                    warn!("drone {} could not update job {}: {}", self.id, scope.id(), e);
                    return;
                }
            }
        }
        warn!("drone {} gave up updating job {}", self.id, scope.id());
    }

    fn held_job<'r>(
        &self,
        rt: &'r AgentRuntime,
        state: DroneState,
    ) -> &'r Tracked<Job> {
        match rt.job.as_ref() {
            Some(job) => job,
            None => panic!("drone {} is {:?} without a job", self.id, state),
        }
    }

    fn pace_delay(
        &self,
        ticks: u32,
        rt: &AgentRuntime,
        ctx: &FleetContext,
    ) -> Duration {
        let tick = rt.wave.as_ref().map_or(Duration::ZERO, |w| w.spec.tick_delay);
        let slowdown = if self.drone.blocking_read(|d| d.is_example()) {
            ctx.config.motion.example_slowdown
        } else {
            1
        };
        tick.saturating_mul(ticks.saturating_mul(slowdown))
    }
}

/// Runs the agent until it suspends, then resubmits it after the requested
/// delay.
pub(crate) fn drive(
    agent: Arc<DroneAgent>,
    ctx: Arc<FleetContext>,
) {
    let Some(delay) = agent.run_until_suspended(&ctx) else {
        return;
    };

    let scheduler = ctx.scheduler.clone();
    let id = agent.id;
    if !scheduler.submit_after(delay, move || drive(agent, ctx)) {
        debug!("drone {} stopped: scheduler is shutting down", id);
    }
}
