// Periodic reclamation of leases whose holders stopped renewing

use crate::node::NameNodeHandle;
use crate::prelude::*;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Background task that asks the node to expire stale leases on a fixed
/// interval. Expiry goes through the same command channel as client requests,
/// so it is journaled and ordered like any other mutation.
#[derive(Debug)]
pub struct LeaseMonitor {
    task: JoinHandle<()>,
}

impl LeaseMonitor {
    pub fn spawn(handle: NameNodeHandle, interval: Duration) -> Self {
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // the first tick completes immediately
            ticker.tick().await;
            loop {
                ticker.tick().await;
                match handle.expire_leases().await {
                    Ok(0) => {}
                    Ok(n) => info!(expired = n, "lease monitor reclaimed leases"),
                    Err(Error::ShuttingDown) => break,
                    Err(e) => warn!(error = %e, "lease monitor sweep failed"),
                }
            }
            debug!("lease monitor stopped");
        });
        Self { task }
    }

    pub fn stop(&self) {
        self.task.abort();
    }
}

impl Drop for LeaseMonitor {
    fn drop(&mut self) {
        self.task.abort();
    }
}
