use tempfile::TempDir;

use super::SledStore;
use crate::constants::DRONE_TREE;
use crate::constants::JOB_TREE;
use crate::init_sled_fleet_db;
use crate::storage::store_test::waiting_job;
use crate::storage::store_test::StoreBuilder;
use crate::storage::store_test::StoreTestSuite;
use crate::Entity;
use crate::EntityStore;
use crate::FleetStores;
use crate::Job;
use crate::JobState;
use crate::Location;

struct SledStoreBuilder {
    db: sled::Db,
    _dir: TempDir,
}

impl SledStoreBuilder {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let db = init_sled_fleet_db(dir.path().join("fleet")).unwrap();
        Self { db, _dir: dir }
    }
}

impl StoreBuilder for SledStoreBuilder {
    fn build(&self) -> FleetStores {
        let stores = FleetStores::sled(&self.db).unwrap();
        stores.clear().unwrap();
        stores
    }
}

#[test]
fn sled_store_passes_conformance_suite() {
    StoreTestSuite::run_all_tests(SledStoreBuilder::new());
}

#[test]
fn records_and_sequence_survive_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("fleet");

    let job_id = {
        let db = init_sled_fleet_db(&path).unwrap();
        let store = SledStore::<Job>::open(&db, JOB_TREE).unwrap();
        let job = waiting_job(&store, Location::new(0.1, 0.2), Location::new(-0.1, 0.0));
        store.flush().unwrap();
        job.id()
    };

    let db = init_sled_fleet_db(&path).unwrap();
    let store = SledStore::<Job>::open(&db, JOB_TREE).unwrap();
    let job = store.get(job_id).unwrap();
    assert_eq!(job.state(), JobState::Waiting);
    assert_eq!(job.origin(), Location::new(0.1, 0.2));
    assert_eq!(job.version(), 2);

    let next = store.create(Job::new(Location::CENTER, Location::CENTER)).unwrap();
    assert_eq!(next.id(), job_id + 1);
}

#[test]
fn trees_keep_separate_sequences() {
    let builder = SledStoreBuilder::new();
    let jobs = SledStore::<Job>::open(&builder.db, JOB_TREE).unwrap();
    let drones = SledStore::<crate::Drone>::open(&builder.db, DRONE_TREE).unwrap();

    jobs.create(Job::new(Location::CENTER, Location::CENTER)).unwrap();
    jobs.create(Job::new(Location::CENTER, Location::CENTER)).unwrap();
    let drone = drones.create(crate::Drone::new(Location::CENTER)).unwrap();
    assert_eq!(drone.id(), 1);
}
