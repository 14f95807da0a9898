use std::collections::BTreeSet;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::info;
use tracing::warn;

use crate::DroneId;
use crate::WaveError;

/// Countdown barrier over a known set of participating drones.
///
/// Each participant signals exactly once. Waiters are woken when the
/// outstanding set becomes empty; the set itself stays inspectable for
/// diagnostics.
pub struct WaveBarrier {
    outstanding: Mutex<BTreeSet<DroneId>>,
    remaining: watch::Sender<usize>,
}

impl WaveBarrier {
    pub fn new(participants: impl IntoIterator<Item = DroneId>) -> Self {
        let outstanding: BTreeSet<DroneId> = participants.into_iter().collect();
        let (remaining, _) = watch::channel(outstanding.len());
        Self {
            outstanding: Mutex::new(outstanding),
            remaining,
        }
    }

    /// Records that `drone_id` has retired.
    ///
    /// # Panics
    /// When `drone_id` is not an outstanding participant, i.e. it signals a
    /// second time or never belonged to this wave.
    pub fn signal(
        &self,
        drone_id: DroneId,
    ) {
        let mut outstanding = self.outstanding.lock();
        assert!(
            outstanding.remove(&drone_id),
            "drone {drone_id} signaled a wave barrier it is not outstanding in"
        );
        // published under the lock so counts never go backwards
        self.remaining.send_replace(outstanding.len());
    }

    pub fn remaining(&self) -> usize {
        *self.remaining.borrow()
    }

    /// Participants that have not signaled yet, in id order.
    pub fn outstanding(&self) -> Vec<DroneId> {
        self.outstanding.lock().iter().copied().collect()
    }

    pub async fn wait(&self) {
        let mut rx = self.remaining.subscribe();
        // the sender lives in self, so the channel cannot close while waiting
        let _ = rx.wait_for(|remaining| *remaining == 0).await;
    }

    /// Like [`WaveBarrier::wait`], but gives up after `timeout` and reports
    /// who is still outstanding.
    pub async fn wait_timeout(
        &self,
        timeout: Duration,
    ) -> Result<(), WaveError> {
        match tokio::time::timeout(timeout, self.wait()).await {
            Ok(()) => Ok(()),
            Err(_) => Err(WaveError::BarrierStall {
                outstanding: self.outstanding(),
            }),
        }
    }

    /// Waits for the barrier, logging the outstanding participants every
    /// `interval`.
    pub async fn wait_with_diagnostics(
        &self,
        interval: Duration,
    ) {
        loop {
            match self.wait_timeout(interval).await {
                Ok(()) => {
                    info!("wave barrier released");
                    return;
                }
                Err(e) => warn!("{}", e),
            }
        }
    }
}
