#![allow(dead_code)]

use std::time::Duration;

use drone_dispatch::count_in_state;
use drone_dispatch::DroneState;
use drone_dispatch::Entity;
use drone_dispatch::Fleet;
use drone_dispatch::FleetConfig;
use drone_dispatch::FleetStores;
use drone_dispatch::JobState;
use drone_dispatch::RetirementPolicy;
use drone_dispatch::StepScheduler;
use drone_dispatch::WaveReport;
use drone_dispatch::WaveSpec;

/// Upper bound for one wave with a zero tick delay.
pub const WAVE_TIMEOUT: Duration = Duration::from_secs(60);

pub fn test_config(policy: RetirementPolicy) -> FleetConfig {
    let mut config = FleetConfig::default();
    config.wave.retirement_policy = policy;
    config.motion.seed = Some(42);
    // shorter legs keep the waves quick
    config.motion.step_distance = 0.05;
    config
}

pub fn memory_fleet(config: FleetConfig) -> Fleet {
    Fleet::new(config, FleetStores::in_memory(), StepScheduler::current()).unwrap()
}

pub fn spec(
    total_drones: usize,
    example_count: usize,
    max_trips: u32,
) -> WaveSpec {
    WaveSpec::new(total_drones, example_count, max_trips, Duration::ZERO)
}

pub async fn settle(
    fleet: &Fleet,
    spec: WaveSpec,
) -> WaveReport {
    tokio::time::timeout(WAVE_TIMEOUT, fleet.activate_wave(spec))
        .await
        .expect("wave did not settle in time")
        .expect("wave failed")
}

/// Checks the state a settled wave must leave behind.
pub fn assert_settled(fleet: &Fleet) {
    assert_eq!(fleet.current_wave(), None);
    assert!(fleet.outstanding().is_empty());

    for drone in fleet.drones_snapshot().unwrap() {
        assert_eq!(drone.state(), DroneState::OffDuty, "drone {}", drone.id());
        assert_eq!(drone.job_id(), None, "drone {}", drone.id());
        assert!(!drone.is_example(), "drone {}", drone.id());
    }

    let jobs = fleet.jobs_snapshot().unwrap();
    for job in &jobs {
        assert_ne!(job.state(), JobState::InProcess, "job {}", job.id());
        assert_eq!(job.drone_id(), None, "job {}", job.id());
        assert!(!job.is_candidate(), "job {}", job.id());
    }
    assert_eq!(
        count_in_state(fleet.stores().jobs.as_ref(), JobState::Init).unwrap(),
        0
    );
}
