use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwapOption;
use dashmap::DashMap;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::debug;
use tracing::info;
use tracing::warn;

use super::BacklogPolicy;
use super::DroneAgent;
use super::FleetContext;
use super::StepScheduler;
use super::WaveContext;
use super::WaveSpec;
use crate::collect_sorted;
use crate::spawn_metering_reporter;
use crate::Drone;
use crate::DroneId;
use crate::Entity;
use crate::EntityIter;
use crate::Error;
use crate::FleetConfig;
use crate::FleetMetrics;
use crate::FleetStores;
use crate::Job;
use crate::JobState;
use crate::MeteringSnapshot;
use crate::Result;
use crate::Tracked;
use crate::WaveError;

/// Outcome of one settled wave.
#[derive(Debug, Clone)]
pub struct WaveReport {
    pub wave: u64,
    /// Drones that ran in the wave, in id order
    pub participants: Vec<DroneId>,
    pub drones_created: usize,
    pub jobs_created: usize,
    pub jobs_promoted: usize,
    pub elapsed: Duration,
}

/// Coordinates the drones of one fleet: grows the fleet, keeps the job
/// backlog, runs waves and exposes read-only views for observers.
pub struct Fleet {
    ctx: Arc<FleetContext>,
    agents: DashMap<DroneId, Arc<DroneAgent>>,
    current_wave: ArcSwapOption<WaveContext>,
    wave_seq: AtomicU64,
    /// One wave at a time
    wave_lock: tokio::sync::Mutex<()>,
}

impl Fleet {
    /// Builds the fleet over `stores`, adopting the drones they already
    /// hold. Drones and jobs left mid-delivery by an earlier run are taken
    /// off duty and handed back to the pool.
    pub fn new(
        config: FleetConfig,
        stores: FleetStores,
        scheduler: StepScheduler,
    ) -> Result<Self> {
        let fleet = Self {
            ctx: Arc::new(FleetContext::new(config, stores, scheduler)),
            agents: DashMap::new(),
            current_wave: ArcSwapOption::empty(),
            wave_seq: AtomicU64::new(0),
            wave_lock: tokio::sync::Mutex::new(()),
        };
        fleet.adopt_stored_drones()?;
        Ok(fleet)
    }

    pub fn config(&self) -> &FleetConfig {
        &self.ctx.config
    }

    pub fn stores(&self) -> &FleetStores {
        &self.ctx.stores
    }

    pub fn size(&self) -> usize {
        self.agents.len()
    }

    /// Grows the fleet to `spec.total_drones`, tops up the job backlog,
    /// activates every inactive drone and resolves once all of them went off
    /// duty.
    pub async fn activate_wave(
        &self,
        spec: WaveSpec,
    ) -> Result<WaveReport> {
        let _wave_guard = self.wave_lock.lock().await;
        spec.validate(self.agents.len())?;
        if self.ctx.scheduler.is_shutting_down() {
            return Err(WaveError::ShuttingDown.into());
        }

        let started = Instant::now();
        let existing = self.agents.len();
        let drones_created = self.grow(spec.total_drones)?;

        let backlog = BacklogPolicy::new(
            &self.ctx.config.backlog,
            self.ctx.stores.jobs.as_ref(),
            &self.ctx.sampler,
            &self.ctx.metrics,
        );
        let jobs_promoted = backlog.promote_on_hold(existing)?;
        let jobs_created = backlog.replenish(self.agents.len())?;

        self.assign_examples(spec.example_count)?;

        let participants: Vec<Arc<DroneAgent>> = self
            .sorted_agents()
            .into_iter()
            .filter(|a| !a.is_active())
            .collect();
        let participant_ids: Vec<DroneId> = participants.iter().map(|a| a.id()).collect();

        let number = self.wave_seq.fetch_add(1, Ordering::SeqCst) + 1;
        let wave = Arc::new(WaveContext::new(
            number,
            spec,
            self.ctx.config.wave.retirement_policy,
            participant_ids.iter().copied(),
        ));
        self.current_wave.store(Some(wave.clone()));
        info!(
            "wave {}: {} drones ({} new, {} examples), {} jobs created, {} promoted",
            number,
            participant_ids.len(),
            drones_created,
            spec.example_count,
            jobs_created,
            jobs_promoted
        );

        for agent in &participants {
            if !agent.activate(&self.ctx, wave.clone()) {
                warn!("wave {}: drone {} could not be activated", number, agent.id());
                self.current_wave.store(None);
                return Err(WaveError::ShuttingDown.into());
            }
        }

        let shutdown = self.ctx.scheduler.shutdown_token();
        let settled = async {
            if self.ctx.config.wave.barrier_diagnostics {
                wave.barrier
                    .wait_with_diagnostics(self.ctx.config.wave.diagnostics_interval())
                    .await
            } else {
                wave.barrier.wait().await
            }
        };
        tokio::select! {
            _ = settled => {}
            _ = shutdown.cancelled() => {
                warn!("wave {} interrupted by shutdown, outstanding: {:?}", number, wave.barrier.outstanding());
                self.current_wave.store(None);
                return Err(WaveError::ShuttingDown.into());
            }
        }

        self.assign_examples(0)?;
        self.current_wave.store(None);

        let report = WaveReport {
            wave: number,
            participants: participant_ids,
            drones_created,
            jobs_created,
            jobs_promoted,
            elapsed: started.elapsed(),
        };
        info!("wave {} settled in {:?}", number, report.elapsed);
        Ok(report)
    }

    /// Lazy view of the persisted drones.
    pub fn drones(&self) -> Result<EntityIter<Drone>> {
        Ok(self.ctx.stores.drones.scan_all(Arc::new(|_: &Drone| true))?)
    }

    /// Lazy view of the persisted jobs.
    pub fn jobs(&self) -> Result<EntityIter<Job>> {
        Ok(self.ctx.stores.jobs.scan_all(Arc::new(|_: &Job| true))?)
    }

    pub fn drones_snapshot(&self) -> Result<Vec<Drone>> {
        Ok(collect_sorted(self.drones()?)?)
    }

    pub fn jobs_snapshot(&self) -> Result<Vec<Job>> {
        Ok(collect_sorted(self.jobs()?)?)
    }

    pub fn metrics(&self) -> MeteringSnapshot {
        self.ctx.metrics.snapshot()
    }

    pub fn metrics_registry(&self) -> Arc<FleetMetrics> {
        self.ctx.metrics.clone()
    }

    /// Number of the running wave, if any.
    pub fn current_wave(&self) -> Option<u64> {
        self.current_wave.load_full().map(|w| w.number)
    }

    /// Drones the running wave is still waiting for.
    pub fn outstanding(&self) -> Vec<DroneId> {
        self.current_wave
            .load_full()
            .map(|w| w.barrier.outstanding())
            .unwrap_or_default()
    }

    /// Starts the metering reporter when it is enabled in the config.
    pub fn start_metering(&self) -> Option<JoinHandle<()>> {
        let monitoring = &self.ctx.config.monitoring;
        if !monitoring.metering_enabled {
            return None;
        }
        Some(spawn_metering_reporter(
            self.ctx.metrics.clone(),
            monitoring.metering_interval(),
            self.ctx.scheduler.shutdown_token(),
        ))
    }

    /// Forgets every drone and purges both stores.
    pub fn clear(&self) -> Result<()> {
        let _wave_guard = self
            .wave_lock
            .try_lock()
            .map_err(|_| Error::Fatal("cannot clear the fleet while a wave is running".into()))?;
        self.agents.clear();
        self.ctx.stores.clear()?;
        Ok(())
    }

    /// Stops scheduling and waits for running steps to finish. Drones cut
    /// off mid-wave then hand their jobs back and go off duty.
    pub async fn shutdown(&self) {
        self.ctx.scheduler.shutdown().await;

        for agent in self.sorted_agents() {
            if let Err(e) = agent.stand_down(&self.ctx) {
                warn!("drone {} could not stand down: {}", agent.id(), e);
            }
        }
        match self.release_orphaned_jobs() {
            Ok(0) => {}
            Ok(released) => info!("released {} jobs left in process by shutdown", released),
            Err(e) => warn!("could not release jobs left in process: {}", e),
        }
    }

    /// Adopts every persisted drone as an inactive member of the fleet.
    fn adopt_stored_drones(&self) -> Result<()> {
        for drone in self.drones_snapshot()? {
            let agent = Arc::new(DroneAgent::new(drone, &self.ctx));
            agent.stand_down(&self.ctx)?;
            self.agents.insert(agent.id(), agent);
        }
        let released = self.release_orphaned_jobs()?;
        if !self.agents.is_empty() {
            info!(
                "adopted {} stored drones, released {} orphaned jobs",
                self.agents.len(),
                released
            );
        }
        Ok(())
    }

    /// Hands back InProcess jobs whose drone is not running. Returns how many
    /// were released.
    fn release_orphaned_jobs(&self) -> Result<usize> {
        let jobs = self.ctx.stores.jobs.as_ref();
        let in_process = collect_sorted(jobs.scan_all(Arc::new(|j: &Job| j.state() == JobState::InProcess))?)?;

        let mut released = 0;
        for job in in_process {
            let owner_running = job
                .drone_id()
                .and_then(|id| self.agents.get(&id))
                .is_some_and(|agent| agent.is_active());
            if owner_running {
                continue;
            }

            let cell = Tracked::new(job);
            let outcome = cell.write().abandon_and_put(jobs);
            match outcome {
                Ok(()) => released += 1,
                Err(e) if e.is_conflict() => debug!("orphaned job {} moved on: {}", cell.id(), e),
                Err(e) => return Err(e.into()),
            }
        }
        Ok(released)
    }

    fn sorted_agents(&self) -> Vec<Arc<DroneAgent>> {
        let mut agents: Vec<Arc<DroneAgent>> = self.agents.iter().map(|a| a.value().clone()).collect();
        agents.sort_by_key(|a| a.id());
        agents
    }

    fn grow(
        &self,
        total_drones: usize,
    ) -> Result<usize> {
        let mut created = 0;
        while self.agents.len() < total_drones {
            let drone = self.ctx.stores.drones.create(Drone::new(self.ctx.sampler.random()))?;
            let agent = Arc::new(DroneAgent::new(drone, &self.ctx));
            self.agents.insert(agent.id(), agent);
            created += 1;
        }
        Ok(created)
    }

    /// Flags the first `example_count` drones of the fleet, in id order, as
    /// examples and clears the flag on every other inactive drone.
    fn assign_examples(
        &self,
        example_count: usize,
    ) -> Result<()> {
        for (position, agent) in self.sorted_agents().iter().enumerate() {
            if agent.is_active() {
                continue;
            }
            agent.set_example(self.ctx.stores.drones.as_ref(), position < example_count)?;
        }
        Ok(())
    }
}
