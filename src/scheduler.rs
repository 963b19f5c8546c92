//! Lifecycle scheduler.
//!
//! Holds no durable state. Every scan re-derives the work from the store:
//! reservations past their deadline fire in the scan, those due before the
//! next scan get one deferred task each, keyed by reservation id. A restart
//! loses the armed tasks and the first scan re-arms them.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, TimeDelta, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use ulid::Ulid;

use crate::engine::{Engine, EngineError};
use crate::lifecycle::{Status, TransitionOutcome};
use crate::model::Reservation;
use crate::observability;

/// What one reconciliation scan did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanReport {
    /// Overdue transitions applied inside the scan.
    pub fired: usize,
    /// Overdue reservations whose status had already moved.
    pub skipped: usize,
    /// Deferred tasks armed or re-armed.
    pub armed: usize,
    /// Reservations already armed for the same deadline.
    pub already_armed: usize,
    /// Overdue transitions that failed; the next scan retries them.
    pub failed: usize,
}

impl ScanReport {
    pub fn is_idle(&self) -> bool {
        *self == Self::default()
    }
}

/// Work derived from one listing of the store.
#[derive(Debug, Default)]
pub struct ScanPlan {
    /// Deadline at or before now; fire immediately.
    pub overdue: Vec<(Reservation, DateTime<Utc>)>,
    /// Deadline after now; arm a deferred task.
    pub upcoming: Vec<(Reservation, DateTime<Utc>)>,
}

/// Split deadline-carrying reservations into overdue and upcoming work.
pub fn plan_scan(candidates: Vec<Reservation>, now: DateTime<Utc>) -> ScanPlan {
    let mut plan = ScanPlan::default();
    for reservation in candidates {
        let Some(deadline) = reservation.deadline() else {
            continue;
        };
        if deadline <= now {
            plan.overdue.push((reservation, deadline));
        } else {
            plan.upcoming.push((reservation, deadline));
        }
    }
    plan
}

struct ArmedTask {
    deadline: DateTime<Utc>,
    handle: JoinHandle<()>,
}

enum FireResult {
    Applied,
    Skipped,
    Failed,
}

pub struct Scheduler {
    engine: Arc<Engine>,
    scan_interval: Duration,
    armed: Arc<DashMap<Ulid, ArmedTask>>,
    shutdown: CancellationToken,
}

impl Scheduler {
    pub fn new(engine: Arc<Engine>, scan_interval: Duration) -> Self {
        Self {
            engine,
            scan_interval,
            armed: Arc::new(DashMap::new()),
            shutdown: CancellationToken::new(),
        }
    }

    /// Spawn the scan loop: one scan now, then one per interval until
    /// [`Scheduler::shutdown`].
    pub fn start(self: &Arc<Self>) -> JoinHandle<()> {
        let scheduler = Arc::clone(self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(scheduler.scan_interval);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = interval.tick() => {}
                    _ = scheduler.shutdown.cancelled() => break,
                }
                match scheduler.run_scan().await {
                    Ok(report) if report.is_idle() => debug!("scan: nothing due"),
                    Ok(report) => info!(
                        "scan: fired={} skipped={} armed={} already_armed={} failed={}",
                        report.fired,
                        report.skipped,
                        report.armed,
                        report.already_armed,
                        report.failed
                    ),
                    Err(e) => warn!("reconciliation scan failed: {e}"),
                }
            }
            scheduler.disarm_all();
            info!("scheduler stopped");
        })
    }

    /// One reconciliation pass over reservations due before the next scan.
    pub async fn run_scan(&self) -> Result<ScanReport, EngineError> {
        let started = Instant::now();
        let now = self.engine.clock().now();
        let horizon = TimeDelta::from_std(self.scan_interval)
            .ok()
            .and_then(|d| now.checked_add_signed(d))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);

        let candidates = self
            .engine
            .store()
            .list_by_deadline(&Status::WITH_DEADLINE, horizon)
            .await?;
        let plan = plan_scan(candidates, now);
        let mut report = ScanReport::default();

        for (reservation, deadline) in plan.overdue {
            if let Some((_, stale)) = self.armed.remove(&reservation.id) {
                stale.handle.abort();
            }
            debug!(
                "reservation {} overdue by {}s",
                reservation.id,
                (now - deadline).num_seconds()
            );
            match fire(&self.engine, &reservation).await {
                FireResult::Applied => report.fired += 1,
                FireResult::Skipped => report.skipped += 1,
                FireResult::Failed => report.failed += 1,
            }
        }

        for (reservation, deadline) in plan.upcoming {
            let id = reservation.id;
            match self.armed.entry(id) {
                Entry::Occupied(mut entry) => {
                    let task = entry.get();
                    if task.deadline == deadline && !task.handle.is_finished() {
                        report.already_armed += 1;
                        continue;
                    }
                    task.handle.abort();
                    debug!("re-arming reservation {id} for {deadline}");
                    entry.insert(self.arm(reservation, deadline, now));
                }
                Entry::Vacant(entry) => {
                    entry.insert(self.arm(reservation, deadline, now));
                }
            }
            report.armed += 1;
        }

        metrics::histogram!(observability::SCAN_DURATION_SECONDS)
            .record(started.elapsed().as_secs_f64());
        metrics::gauge!(observability::ARMED_TASKS).set(self.armed.len() as f64);
        Ok(report)
    }

    fn arm(&self, reservation: Reservation, deadline: DateTime<Utc>, now: DateTime<Utc>) -> ArmedTask {
        let delay = (deadline - now).to_std().unwrap_or(Duration::ZERO);
        let engine = Arc::clone(&self.engine);
        let armed = Arc::clone(&self.armed);
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            // Only the wait is abortable. Once the fire starts it runs to
            // completion so a store commit is never cut between log and memory.
            tokio::spawn(async move {
                let id = reservation.id;
                fire_deferred(&engine, reservation, deadline).await;
                armed.remove_if(&id, |_, task| task.deadline == deadline);
                metrics::gauge!(observability::ARMED_TASKS).set(armed.len() as f64);
            });
        });
        ArmedTask { deadline, handle }
    }

    /// Deferred tasks waiting for their deadline or still firing.
    pub fn armed_count(&self) -> usize {
        self.armed.len()
    }

    /// Stop the scan loop and abort every armed task.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
        self.disarm_all();
    }

    fn disarm_all(&self) {
        self.armed.retain(|_, task| {
            task.handle.abort();
            false
        });
        metrics::gauge!(observability::ARMED_TASKS).set(0.0);
    }
}

/// Re-read the reservation and fire only if it still sits in the status and
/// deadline it was armed for.
async fn fire_deferred(engine: &Engine, armed: Reservation, deadline: DateTime<Utc>) {
    let current = match engine.get_reservation(armed.id).await {
        Ok(r) => r,
        Err(e) => {
            debug!("deferred fire for {} skipped: {e}", armed.id);
            return;
        }
    };
    if current.status != armed.status || current.deadline() != Some(deadline) {
        debug!(
            "reservation {} moved to {} before its deadline, nothing to do",
            current.id, current.status
        );
        return;
    }
    fire(engine, &current).await;
}

async fn fire(engine: &Engine, snapshot: &Reservation) -> FireResult {
    match engine.advance_on_deadline(snapshot).await {
        Ok(TransitionOutcome::Applied { .. }) => FireResult::Applied,
        Ok(TransitionOutcome::AlreadyAdvanced { .. }) => FireResult::Skipped,
        Err(e) => {
            warn!(
                "deadline transition for reservation {} failed, retrying next scan: {e}",
                snapshot.id
            );
            metrics::counter!(observability::SCHEDULED_FAILURES_TOTAL).increment(1);
            FireResult::Failed
        }
    }
}
