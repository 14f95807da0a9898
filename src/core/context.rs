use std::sync::Arc;

use super::StepScheduler;
use crate::FleetConfig;
use crate::FleetMetrics;
use crate::FleetStores;
use crate::LocationSampler;

/// Everything a drone step needs besides its own state.
pub struct FleetContext {
    pub config: FleetConfig,
    pub stores: FleetStores,
    pub metrics: Arc<FleetMetrics>,
    pub sampler: LocationSampler,
    pub scheduler: StepScheduler,
}

impl FleetContext {
    pub fn new(
        config: FleetConfig,
        stores: FleetStores,
        scheduler: StepScheduler,
    ) -> Self {
        let sampler = LocationSampler::from_config(&config.motion);
        Self {
            config,
            stores,
            metrics: Arc::new(FleetMetrics::new()),
            sampler,
            scheduler,
        }
    }
}
