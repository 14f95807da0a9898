/// Ids handed out by a freshly cleared store start here.
pub const FIRST_ID: u64 = 1;

/// Version of a record right after `create`.
pub const INITIAL_VERSION: u64 = 1;

/// Prefix for environment overrides, e.g. `FLEET__BACKLOG__FLOOR=40`.
pub const ENV_PREFIX: &str = "FLEET";
pub const CONFIG_PATH_ENV: &str = "FLEET_CONFIG_PATH";

// Step delays, in ticks of the wave's tick_delay.
pub const INIT_TICKS: u32 = 10;
pub const SEARCH_RETRY_TICKS: u32 = 5;
pub const GOT_A_JOB_TICKS: u32 = 10;
pub const DEPARTING_TICKS: u32 = 10;
pub const ARRIVED_TICKS: u32 = 5;
pub const DELIVERED_TICKS: u32 = 5;
pub const MOTION_TICKS: u32 = 1;

/// Attempts to clear a candidate mark before giving up on it.
pub const CANDIDATE_CLEAR_RETRIES: usize = 3;

/// Attempts to persist an owner-written record after a version conflict.
pub const OWNER_WRITE_RETRIES: usize = 2;

// sled layout
pub const DRONE_TREE: &str = "drones";
pub const JOB_TREE: &str = "jobs";
pub const META_TREE: &str = "meta";
