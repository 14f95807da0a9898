//! # drone-dispatch
//!
//! A concurrent matching and dispatch engine. A fleet of drones searches a
//! shared pool of jobs, claims them with optimistic, version-checked writes
//! and delivers them, wave after wave.
//!
//! The store offers nothing but compare-and-swap on record versions; every
//! coordination guarantee (one owner per job, one writer per record copy,
//! a wave settling only when all its drones are off duty) is built on top
//! of that.
//!
//! ```no_run
//! use std::time::Duration;
//!
//! use drone_dispatch::Fleet;
//! use drone_dispatch::FleetConfig;
//! use drone_dispatch::FleetStores;
//! use drone_dispatch::StepScheduler;
//! use drone_dispatch::WaveSpec;
//!
//! # async fn run() -> drone_dispatch::Result<()> {
//! let config = FleetConfig::new()?.validate()?;
//! let stores = FleetStores::open(&config.storage)?;
//! let fleet = Fleet::new(config, stores, StepScheduler::current())?;
//!
//! let report = fleet
//!     .activate_wave(WaveSpec::new(10, 1, 3, Duration::from_millis(5)))
//!     .await?;
//! println!("wave {} settled in {:?}", report.wave, report.elapsed);
//! fleet.shutdown().await;
//! # Ok(())
//! # }
//! ```

mod config;
mod core;
mod entity;
mod errors;
mod metrics;
mod storage;

pub mod constants;
pub mod utils;

pub use config::*;
pub use self::core::*;
pub use entity::*;
pub use errors::*;
pub use metrics::*;
pub use storage::*;
