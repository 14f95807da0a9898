use std::time::Duration;

use super::*;
use crate::Drone;
use crate::Entity;
use crate::EntityStore;
use crate::Location;
use crate::MemStore;
use crate::RetirementPolicy;
use crate::Tracked;
use crate::WaveError;

fn spec(max_trips: u32) -> WaveSpec {
    WaveSpec::new(3, 1, max_trips, Duration::from_millis(1))
}

/// A drone that has (or has not) reached its trip quota.
fn drone(
    store: &MemStore<Drone>,
    quota_reached: bool,
    example: bool,
) -> Drone {
    let cell = Tracked::new(store.create(Drone::new(Location::CENTER)).unwrap());
    let mut scope = cell.write();
    if quota_reached {
        assert!(scope.stage_trip_completed(1));
    }
    scope.set_example_and_put(store, example).unwrap();
    drop(scope);
    cell.snapshot()
}

#[test]
fn validate_should_reject_empty_quota_and_too_many_examples() {
    assert!(spec(2).validate(0).is_ok());
    assert!(matches!(spec(0).validate(0), Err(WaveError::InvalidSpec(_))));

    let too_many = WaveSpec::new(2, 3, 1, Duration::ZERO);
    assert!(matches!(too_many.validate(0), Err(WaveError::InvalidSpec(_))));
    assert!(matches!(too_many.validate(2), Err(WaveError::InvalidSpec(_))));
}

#[test]
fn validate_should_count_examples_against_the_existing_fleet() {
    // the fleet never shrinks, so a small target still runs every drone
    let small_target = WaveSpec::new(1, 3, 1, Duration::ZERO);

    assert!(small_target.validate(1).is_err());
    assert!(small_target.validate(3).is_ok());
    assert!(small_target.validate(5).is_ok());
}

#[test]
fn quota_policy_should_retire_each_drone_on_its_own() {
    let store = MemStore::<Drone>::new();
    let wave = WaveContext::new(1, spec(1), RetirementPolicy::Quota, [1, 2]);

    let lead = drone(&store, false, true);
    let other = drone(&store, true, false);

    assert_eq!(wave.decide_at_done(&lead), DroneEvent::Continue);
    assert_eq!(wave.decide_at_done(&other), DroneEvent::Retire);
    assert!(!wave.lead_finished());
}

#[test]
fn lead_cutoff_should_hold_others_until_the_lead_finishes() {
    let store = MemStore::<Drone>::new();
    let wave = WaveContext::new(4, spec(1), RetirementPolicy::LeadCutoff, [1, 2, 3]);

    // id 1 leads even without the example flag
    let lead = drone(&store, true, false);
    let done = drone(&store, true, false);
    let busy = drone(&store, false, false);

    assert_eq!(wave.decide_at_done(&done), DroneEvent::Continue);
    assert!(!wave.lead_finished());

    assert_eq!(wave.decide_at_done(&lead), DroneEvent::Retire);
    assert!(wave.lead_finished());

    assert_eq!(wave.decide_at_done(&done), DroneEvent::Retire);
    // the quota still applies after the cutoff
    assert_eq!(wave.decide_at_done(&busy), DroneEvent::Continue);
}

#[test]
fn example_drones_should_lead_the_cutoff() {
    let store = MemStore::<Drone>::new();
    let wave = WaveContext::new(1, spec(1), RetirementPolicy::LeadCutoff, [1, 2]);

    let _first = drone(&store, false, false);
    let example = drone(&store, true, true);

    assert_eq!(wave.decide_at_done(&example), DroneEvent::Retire);
    assert!(wave.lead_finished());
}

#[test]
fn lowest_participant_should_lead_when_ids_do_not_start_at_one() {
    let store = MemStore::<Drone>::new();
    // ids 1 and 2 belong to drones that are not in this wave
    drone(&store, false, false);
    drone(&store, false, false);
    let lead = drone(&store, true, false);
    let other = drone(&store, true, false);
    let wave = WaveContext::new(2, spec(1), RetirementPolicy::LeadCutoff, [other.id(), lead.id()]);

    assert_eq!(wave.decide_at_done(&other), DroneEvent::Continue);
    assert_eq!(wave.decide_at_done(&lead), DroneEvent::Retire);
    assert!(wave.lead_finished());
    assert_eq!(wave.decide_at_done(&other), DroneEvent::Retire);
}
