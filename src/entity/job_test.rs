use super::*;
use crate::EntityStore;
use crate::MemStore;
use crate::StoreError;

fn persisted_job(store: &MemStore<Job>) -> Tracked<Job> {
    let job = store
        .create(Job::new(Location::new(0.1, 0.2), Location::new(-0.3, 0.0)))
        .unwrap();
    Tracked::new(job)
}

#[test]
fn state_graph_should_only_allow_known_edges() {
    use JobState::*;

    assert!(Init.can_transition_to(Waiting));
    assert!(Waiting.can_transition_to(InProcess));
    assert!(InProcess.can_transition_to(Waiting));
    assert!(InProcess.can_transition_to(OnHold));
    assert!(OnHold.can_transition_to(Waiting));

    assert!(!Init.can_transition_to(InProcess));
    assert!(!Waiting.can_transition_to(OnHold));
    assert!(!OnHold.can_transition_to(InProcess));
    assert!(!Waiting.can_transition_to(Waiting));
}

#[test]
fn claim_should_set_owner_and_clear_candidate_mark() {
    let store = MemStore::<Job>::new();
    let cell = persisted_job(&store);

    {
        let mut job = cell.write();
        job.change_state_and_put(&store, JobState::Init, JobState::Waiting).unwrap();
        job.set_candidate_and_put(&store, true).unwrap();
        assert!(job.is_candidate());
        job.claim_and_put(&store, 9).unwrap();
    }

    let persisted = store.get(cell.id()).unwrap();
    assert_eq!(persisted.state(), JobState::InProcess);
    assert_eq!(persisted.drone_id(), Some(9));
    assert!(!persisted.is_candidate());
    assert_eq!(persisted.version(), 4);
    assert_eq!(cell.snapshot(), persisted);
}

#[test]
fn stale_copy_should_conflict_and_leave_both_sides_untouched() {
    let store = MemStore::<Job>::new();
    let cell = persisted_job(&store);
    cell.write()
        .change_state_and_put(&store, JobState::Init, JobState::Waiting)
        .unwrap();

    let stale = Tracked::new(cell.snapshot());
    cell.write().claim_and_put(&store, 1).unwrap();

    let before = stale.snapshot();
    let err = stale.write().claim_and_put(&store, 2).unwrap_err();

    assert!(matches!(err, StoreError::Conflict { actual: Some(3), .. }));
    assert_eq!(stale.snapshot(), before);
    assert_eq!(store.get(cell.id()).unwrap().drone_id(), Some(1));
}

#[test]
fn local_state_mismatch_should_conflict_without_writing() {
    let store = MemStore::<Job>::new();
    let cell = persisted_job(&store);

    let err = cell.write().claim_and_put(&store, 1).unwrap_err();

    assert!(err.is_conflict());
    assert_eq!(store.get(cell.id()).unwrap().version(), 1);
}

#[test]
#[should_panic(expected = "illegal job transition")]
fn illegal_edge_should_panic() {
    let store = MemStore::<Job>::new();
    let cell = persisted_job(&store);

    let _ = cell
        .write()
        .change_state_and_put(&store, JobState::Init, JobState::OnHold);
}

#[test]
fn candidate_mark_should_require_waiting() {
    let store = MemStore::<Job>::new();
    let cell = persisted_job(&store);

    assert!(cell.write().set_candidate_and_put(&store, true).is_err());
    // clearing is always allowed
    cell.write().set_candidate_and_put(&store, false).unwrap();
}

#[test]
fn release_should_roll_coordinates_forward() {
    let store = MemStore::<Job>::new();
    let cell = persisted_job(&store);
    let next = Location::new(0.25, 0.25);

    {
        let mut job = cell.write();
        job.change_state_and_put(&store, JobState::Init, JobState::Waiting).unwrap();
        job.claim_and_put(&store, 4).unwrap();
        job.move_to_and_put(&store, Location::new(-0.3, 0.0)).unwrap();
        job.release_and_put(&store, next, false).unwrap();
    }

    let job = store.get(cell.id()).unwrap();
    assert_eq!(job.state(), JobState::Waiting);
    assert_eq!(job.origin(), Location::new(-0.3, 0.0));
    assert_eq!(job.location(), job.origin());
    assert_eq!(job.destination(), next);
    assert_eq!(job.drone_id(), None);
}

#[test]
fn release_with_hold_should_park_the_job() {
    let store = MemStore::<Job>::new();
    let cell = persisted_job(&store);

    {
        let mut job = cell.write();
        job.change_state_and_put(&store, JobState::Init, JobState::Waiting).unwrap();
        job.claim_and_put(&store, 4).unwrap();
        job.stamp_pickup_and_put(&store, 100).unwrap();
        job.stamp_delivery_and_put(&store, 250).unwrap();
        job.release_and_put(&store, Location::CENTER, true).unwrap();
    }

    let job = store.get(cell.id()).unwrap();
    assert_eq!(job.state(), JobState::OnHold);
    assert_eq!(job.picked_up_at(), Some(100));
    assert_eq!(job.delivered_at(), Some(250));

    cell.write()
        .change_state_and_put(&store, JobState::OnHold, JobState::Waiting)
        .unwrap();
    assert_eq!(store.get(cell.id()).unwrap().state(), JobState::Waiting);
}

#[test]
fn abandon_should_offer_the_job_from_where_it_was_left() {
    let store = MemStore::<Job>::new();
    let cell = persisted_job(&store);
    let dropped_at = Location::new(-0.1, 0.1);

    {
        let mut job = cell.write();
        job.change_state_and_put(&store, JobState::Init, JobState::Waiting).unwrap();
        job.claim_and_put(&store, 6).unwrap();
        job.move_to_and_put(&store, dropped_at).unwrap();
        job.abandon_and_put(&store).unwrap();
    }

    let job = store.get(cell.id()).unwrap();
    assert_eq!(job.state(), JobState::Waiting);
    assert_eq!(job.drone_id(), None);
    assert_eq!(job.origin(), dropped_at);
    assert_eq!(job.destination(), Location::new(-0.3, 0.0));

    // only a job in process can be abandoned
    assert!(cell.write().abandon_and_put(&store).unwrap_err().is_conflict());
}
