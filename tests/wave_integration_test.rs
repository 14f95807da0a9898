mod common;

use std::collections::BTreeSet;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use common::*;
use drone_dispatch::count_in_state;
use drone_dispatch::CandidateMarking;
use drone_dispatch::DroneState;
use drone_dispatch::Entity;
use drone_dispatch::EntityStore;
use drone_dispatch::Error;
use drone_dispatch::FleetStores;
use drone_dispatch::Job;
use drone_dispatch::JobState;
use drone_dispatch::RetirementPolicy;
use drone_dispatch::WaveError;
use drone_dispatch::WaveSpec;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn quota_wave_should_deliver_exact_trips_and_settle() {
    let fleet = memory_fleet(test_config(RetirementPolicy::Quota));

    let report = settle(&fleet, spec(3, 1, 2)).await;

    assert_eq!(report.wave, 1);
    assert_eq!(report.drones_created, 3);
    assert_eq!(report.participants, vec![1, 2, 3]);
    assert!(report.jobs_created >= 20);

    let drones = fleet.drones_snapshot().unwrap();
    assert_eq!(drones.len(), 3);
    for drone in &drones {
        assert_eq!(drone.trips(), 2, "drone {}", drone.id());
    }
    assert_settled(&fleet);

    // every job is back in the pool, none was lost or duplicated
    let waiting = count_in_state(fleet.stores().jobs.as_ref(), JobState::Waiting).unwrap();
    assert_eq!(waiting, report.jobs_created);
    assert!(waiting >= 20);

    let metrics = fleet.metrics();
    assert_eq!(metrics.deliveries, 6);
    assert_eq!(metrics.claim_successes, 6);
    assert_eq!(metrics.jobs_created, report.jobs_created as u64);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn lead_cutoff_wave_should_let_drones_exceed_the_quota() {
    let fleet = memory_fleet(test_config(RetirementPolicy::LeadCutoff));

    settle(&fleet, spec(5, 1, 2)).await;

    for drone in fleet.drones_snapshot().unwrap() {
        assert!(drone.trips() >= 2, "drone {} made {} trips", drone.id(), drone.trips());
    }
    assert_settled(&fleet);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn repeated_waves_should_reactivate_and_grow_the_fleet() {
    let fleet = memory_fleet(test_config(RetirementPolicy::Quota));

    let first = settle(&fleet, spec(2, 1, 1)).await;
    let second = settle(&fleet, spec(4, 0, 2)).await;
    let third = settle(&fleet, spec(4, 2, 1)).await;

    assert_eq!((first.wave, second.wave, third.wave), (1, 2, 3));
    assert_eq!(second.drones_created, 2);
    assert_eq!(second.participants, vec![1, 2, 3, 4]);
    assert_eq!(third.drones_created, 0);
    assert_eq!(third.participants.len(), 4);

    // trips restart with every activation
    for drone in fleet.drones_snapshot().unwrap() {
        assert_eq!(drone.trips(), 1, "drone {}", drone.id());
    }
    assert_eq!(fleet.metrics().deliveries, 2 + 8 + 4);
    assert_settled(&fleet);
}

/// Scans the job store until `stop` is set and returns the number of scans
/// and of jobs seen in an inconsistent state.
fn watch_job_records(
    stores: FleetStores,
    stop: Arc<AtomicBool>,
) -> thread::JoinHandle<(usize, Vec<String>)> {
    thread::spawn(move || {
        let mut scans = 0;
        let mut violations = Vec::new();
        while !stop.load(Ordering::Acquire) {
            let scan = stores.jobs.scan_all(Arc::new(|_: &Job| true)).unwrap();
            for job in scan {
                let job = job.unwrap();
                let owned = job.state() == JobState::InProcess;
                if owned != job.drone_id().is_some() {
                    violations.push(format!("job {} {:?} owned by {:?}", job.id(), job.state(), job.drone_id()));
                }
                if job.is_candidate() && job.state() != JobState::Waiting {
                    violations.push(format!("job {} marked while {:?}", job.id(), job.state()));
                }
            }
            scans += 1;
        }
        (scans, violations)
    })
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn swarm_should_keep_job_ownership_consistent_while_running() {
    let mut config = test_config(RetirementPolicy::Quota);
    // a small, dense pool forces claim races; every drone marks candidates
    config.backlog.floor = 0;
    config.backlog.overcommit_factor = 1.0;
    config.matching.candidate_marking = CandidateMarking::All;
    let fleet = memory_fleet(config);

    let stop = Arc::new(AtomicBool::new(false));
    let watcher = watch_job_records(fleet.stores().clone(), stop.clone());
    let report = settle(&fleet, spec(12, 2, 3)).await;
    stop.store(true, Ordering::Release);
    let (scans, violations) = watcher.join().unwrap();

    assert!(scans > 0);
    assert!(violations.is_empty(), "{violations:#?}");
    assert_eq!(report.jobs_created, 12);
    let metrics = fleet.metrics();
    assert_eq!(metrics.deliveries, 36);
    assert_eq!(metrics.claim_successes, 36);
    assert_eq!(fleet.jobs_snapshot().unwrap().len(), 12);
    assert_settled(&fleet);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn held_jobs_should_be_promoted_by_the_next_wave() {
    let mut config = test_config(RetirementPolicy::Quota);
    config.backlog.hold_probability = 1.0;
    config.backlog.floor = 10;
    let fleet = memory_fleet(config);

    settle(&fleet, spec(2, 0, 1)).await;
    let jobs = fleet.stores().jobs.as_ref();
    assert_eq!(count_in_state(jobs, JobState::OnHold).unwrap(), 2);
    assert_eq!(fleet.metrics().holds, 2);

    let report = settle(&fleet, spec(2, 0, 1)).await;

    assert_eq!(report.jobs_promoted, 2);
    // the two jobs delivered this wave were parked again
    assert_eq!(count_in_state(jobs, JobState::OnHold).unwrap(), 2);
    assert_settled(&fleet);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn invalid_wave_should_be_rejected_before_any_work() {
    let fleet = memory_fleet(test_config(RetirementPolicy::Quota));

    let err = fleet.activate_wave(spec(1, 2, 1)).await.unwrap_err();

    assert!(matches!(err, Error::Wave(WaveError::InvalidSpec(_))));
    assert_eq!(fleet.size(), 0);
    assert!(fleet.jobs_snapshot().unwrap().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn shutdown_should_interrupt_a_running_wave() {
    let fleet = Arc::new(memory_fleet(test_config(RetirementPolicy::Quota)));

    // long ticks keep the drones busy well past the shutdown
    let slow = WaveSpec::new(3, 0, 5, Duration::from_secs(3600));
    let running = {
        let fleet = fleet.clone();
        tokio::spawn(async move { fleet.activate_wave(slow).await })
    };

    while fleet.current_wave().is_none() {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    let outstanding: BTreeSet<u64> = fleet.outstanding().into_iter().collect();
    assert_eq!(outstanding, BTreeSet::from([1, 2, 3]));

    fleet.shutdown().await;
    let result = tokio::time::timeout(WAVE_TIMEOUT, running).await.unwrap().unwrap();

    assert!(matches!(result, Err(Error::Wave(WaveError::ShuttingDown))));
    assert_eq!(fleet.current_wave(), None);
    for drone in fleet.drones_snapshot().unwrap() {
        // the long tick keeps every drone short of Ready
        assert_eq!(drone.state(), DroneState::Init, "drone {}", drone.id());
        assert_eq!(drone.job_id(), None, "drone {}", drone.id());
    }
    let jobs = fleet.stores().jobs.as_ref();
    assert_eq!(count_in_state(jobs, JobState::InProcess).unwrap(), 0);
    assert!(matches!(
        fleet.activate_wave(spec(3, 0, 1)).await,
        Err(Error::Wave(WaveError::ShuttingDown))
    ));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn smaller_wave_should_accept_examples_up_to_the_fleet_size() {
    let fleet = memory_fleet(test_config(RetirementPolicy::LeadCutoff));
    settle(&fleet, spec(3, 0, 1)).await;

    let report = settle(&fleet, spec(1, 3, 1)).await;

    assert_eq!(report.drones_created, 0);
    assert_eq!(report.participants, vec![1, 2, 3]);
    assert_settled(&fleet);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn clear_should_reset_fleet_and_stores() {
    let fleet = memory_fleet(test_config(RetirementPolicy::Quota));
    settle(&fleet, spec(2, 0, 1)).await;

    fleet.clear().unwrap();

    assert_eq!(fleet.size(), 0);
    assert!(fleet.drones_snapshot().unwrap().is_empty());
    assert!(fleet.jobs_snapshot().unwrap().is_empty());

    let report = settle(&fleet, spec(1, 0, 1)).await;
    assert_eq!(report.participants, vec![1]);
    assert_eq!(fleet.drones_snapshot().unwrap()[0].id(), 1);
}
