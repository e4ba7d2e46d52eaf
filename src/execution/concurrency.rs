//! Concurrency groups - one active run per key
//!
//! Every run acquires the lane of its group before its first stage. A newer
//! run for the same key cancels the active one (when `cancel_in_progress` is
//! on) and takes the lane once the active run has released it. A run still
//! waiting for the lane when an even newer run arrives is superseded without
//! ever starting, so at most one run waits per group.

use crate::core::ConcurrencyKey;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use thiserror::Error;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use uuid::Uuid;

/// A run gave up its claim on the lane before getting it
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("run {run_id} superseded in concurrency group {group}")]
pub struct Superseded {
    pub run_id: Uuid,
    pub group: ConcurrencyKey,
}

struct ActiveLane {
    run_id: Uuid,
    token: CancellationToken,
}

struct GroupSlot {
    active: Option<ActiveLane>,
    /// Ticket of the newest run that asked for the lane
    latest_ticket: u64,
    /// Bumped whenever the lane is released or a newer run arrives
    changed: watch::Sender<u64>,
}

impl GroupSlot {
    fn new() -> Self {
        let (changed, _) = watch::channel(0);
        Self {
            active: None,
            latest_ticket: 0,
            changed,
        }
    }
}

type Groups = Arc<Mutex<HashMap<ConcurrencyKey, GroupSlot>>>;

fn lock(groups: &Groups) -> MutexGuard<'_, HashMap<ConcurrencyKey, GroupSlot>> {
    groups.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Hands out per-group lanes
#[derive(Clone, Default)]
pub struct ConcurrencyController {
    groups: Groups,
}

impl ConcurrencyController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for the lane of `group`
    ///
    /// `token` is the run's own cancellation token: the controller cancels it
    /// when a newer run of the group arrives while this one holds the lane.
    /// Cancelling it while waiting gives up the claim.
    pub async fn acquire(
        &self,
        group: &ConcurrencyKey,
        run_id: Uuid,
        token: &CancellationToken,
        cancel_in_progress: bool,
    ) -> Result<LaneGuard, Superseded> {
        let ticket = {
            let mut groups = lock(&self.groups);
            let slot = groups.entry(group.clone()).or_insert_with(GroupSlot::new);
            slot.latest_ticket += 1;
            slot.changed.send_replace(slot.latest_ticket);
            slot.latest_ticket
        };
        let superseded = || Superseded {
            run_id,
            group: group.clone(),
        };

        loop {
            let mut changed = {
                let mut groups = lock(&self.groups);
                let slot = groups.entry(group.clone()).or_insert_with(GroupSlot::new);

                if slot.latest_ticket != ticket || token.is_cancelled() {
                    debug!("Run {} gave up waiting for {}", run_id, group);
                    return Err(superseded());
                }

                if slot.active.is_none() {
                    slot.active = Some(ActiveLane {
                        run_id,
                        token: token.clone(),
                    });
                    debug!("Run {} acquired lane {}", run_id, group);
                    return Ok(LaneGuard {
                        groups: self.groups.clone(),
                        group: group.clone(),
                        run_id,
                    });
                }

                if let Some(active) = &slot.active {
                    if cancel_in_progress && !active.token.is_cancelled() {
                        info!(
                            "Cancelling run {} in {}: superseded by {}",
                            active.run_id, group, run_id
                        );
                        active.token.cancel();
                    } else {
                        debug!("Run {} waiting for {} in {}", run_id, active.run_id, group);
                    }
                }

                slot.changed.subscribe()
            };

            tokio::select! {
                _ = token.cancelled() => {}
                _ = changed.changed() => {}
            }
        }
    }

    /// Run currently holding the lane of `group`
    pub fn active_run(&self, group: &ConcurrencyKey) -> Option<Uuid> {
        lock(&self.groups)
            .get(group)
            .and_then(|slot| slot.active.as_ref().map(|a| a.run_id))
    }
}

/// Held for as long as a run occupies its lane; dropping releases it
pub struct LaneGuard {
    groups: Groups,
    group: ConcurrencyKey,
    run_id: Uuid,
}

impl Drop for LaneGuard {
    fn drop(&mut self) {
        let mut groups = lock(&self.groups);
        if let Some(slot) = groups.get_mut(&self.group) {
            if slot.active.as_ref().is_some_and(|a| a.run_id == self.run_id) {
                slot.active = None;
                debug!("Run {} released lane {}", self.run_id, self.group);
            }
            slot.changed.send_replace(slot.latest_ticket);
        }
    }
}
