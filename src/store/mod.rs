mod mutations;
mod queries;
pub mod schedule;
mod writer;

pub use schedule::BuildingSchedule;

use std::collections::HashMap;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tokio::sync::{Mutex, RwLock, mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use ulid::Ulid;

use crate::engine::EngineError;
use crate::lifecycle::{GuardedTransition, Status, TransitionOutcome};
use crate::model::*;
use crate::notify::NotifyHub;
use crate::wal::{Replayed, Wal};

use writer::{WalRequest, run_writer};

/// Persistence contract the engine relies on. Every mutation is a single
/// atomic conditional update against the stored record.
#[async_trait]
pub trait ReservationStore: Send + Sync {
    /// Insert a new reservation. Re-checks overlap on the building at commit.
    async fn create(&self, reservation: Reservation) -> Result<(), EngineError>;

    /// Rewrite building/window/company name if the stored status is still `expected`.
    async fn update_details(
        &self,
        id: Ulid,
        expected: Status,
        update: DetailsUpdate,
    ) -> Result<Reservation, EngineError>;

    /// Compare-and-set status change.
    async fn transition(&self, guarded: GuardedTransition) -> Result<TransitionOutcome, EngineError>;

    async fn get(&self, id: Ulid) -> Result<Option<Reservation>, EngineError>;

    /// Reservations in `statuses` whose current deadline is at or before `before`.
    async fn list_by_deadline(
        &self,
        statuses: &[Status],
        before: DateTime<Utc>,
    ) -> Result<Vec<Reservation>, EngineError>;

    /// Schedule entries on `building_id` whose window overlaps `span`.
    async fn overlapping(&self, building_id: Ulid, span: DateSpan) -> Result<Vec<Occupancy>, EngineError>;

    async fn list_for_tenant(&self, tenant_id: Ulid) -> Result<Vec<Reservation>, EngineError>;

    async fn count_active_for_user(&self, tenant_id: Ulid) -> Result<usize, EngineError>;

    async fn count_active_for_building(&self, building_id: Ulid) -> Result<usize, EngineError>;

    /// Administrative removal, outside the state machine.
    async fn delete(&self, id: Ulid) -> Result<Reservation, EngineError>;
}

pub type SharedReservation = Arc<Mutex<Reservation>>;
pub type SharedSchedule = Arc<RwLock<BuildingSchedule>>;

/// WAL-backed in-memory reservation store.
pub struct Store {
    reservations: DashMap<Ulid, SharedReservation>,
    schedules: DashMap<Ulid, SharedSchedule>,
    /// Tenant → reservation ids.
    by_tenant: DashMap<Ulid, Vec<Ulid>>,
    wal_tx: mpsc::Sender<WalRequest>,
    /// Mutations hold this shared across WAL append + apply; compaction
    /// holds it exclusively so its snapshot can't miss a committed event.
    commit_gate: RwLock<()>,
    pub notify: Arc<NotifyHub>,
}

/// Fold the WAL into the latest state of every live reservation.
fn replay_reservations(events: &[Event]) -> HashMap<Ulid, Reservation> {
    let mut state: HashMap<Ulid, Reservation> = HashMap::new();
    for event in events {
        match event {
            Event::ReservationCreated { reservation } => {
                state.insert(reservation.id, reservation.clone());
            }
            Event::DetailsUpdated {
                id,
                building_id,
                span,
                duration_months,
                company_name,
                at,
            } => {
                if let Some(r) = state.get_mut(id) {
                    r.building_id = *building_id;
                    r.span = *span;
                    r.duration_months = *duration_months;
                    r.company_name = company_name.clone();
                    r.updated_at = *at;
                }
            }
            Event::StatusChanged {
                id,
                to,
                payment_deadline,
                at,
                ..
            } => {
                if let Some(r) = state.get_mut(id) {
                    r.status = *to;
                    r.payment_deadline = *payment_deadline;
                    r.updated_at = *at;
                }
            }
            Event::ReservationDeleted { id, .. } => {
                state.remove(id);
            }
        }
    }
    state
}

impl Store {
    pub fn open(wal_path: PathBuf, notify: Arc<NotifyHub>) -> io::Result<Self> {
        let Replayed { events, valid_len } = Wal::replay(&wal_path)?;
        let dropped = Wal::truncate_tail(&wal_path, valid_len)?;
        if dropped > 0 {
            warn!("discarded {dropped} bytes of torn WAL tail after {} events", events.len());
        }
        let wal = Wal::open(&wal_path)?;
        let (wal_tx, wal_rx) = mpsc::channel(4096);
        tokio::spawn(run_writer(wal, wal_rx));

        let store = Self {
            reservations: DashMap::new(),
            schedules: DashMap::new(),
            by_tenant: DashMap::new(),
            wal_tx,
            commit_gate: RwLock::new(()),
            notify,
        };

        let replayed = replay_reservations(&events);
        let count = replayed.len();
        let mut schedules: HashMap<Ulid, BuildingSchedule> = HashMap::new();
        for (id, reservation) in replayed {
            if reservation.is_occupying() {
                schedules
                    .entry(reservation.building_id)
                    .or_insert_with(|| BuildingSchedule::new(reservation.building_id))
                    .insert(reservation.occupancy());
            }
            store.by_tenant.entry(reservation.tenant_id).or_default().push(id);
            store.reservations.insert(id, Arc::new(Mutex::new(reservation)));
        }
        for (building_id, schedule) in schedules {
            store.schedules.insert(building_id, Arc::new(RwLock::new(schedule)));
        }
        if !events.is_empty() {
            info!("replayed {} WAL events into {count} reservations", events.len());
        }

        Ok(store)
    }

    async fn wal_request<T>(
        &self,
        request: impl FnOnce(oneshot::Sender<T>) -> WalRequest,
    ) -> Result<T, EngineError> {
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(request(tx))
            .await
            .map_err(|_| EngineError::WalError("log writer has stopped".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("log writer hung up".into()))
    }

    /// Durably log `event`. Returns once its batch is synced.
    async fn wal_append(&self, event: &Event) -> Result<(), EngineError> {
        let event = event.clone();
        self.wal_request(|done| WalRequest::Append { event, done })
            .await?
            .map_err(|e| EngineError::WalError(e.to_string()))
    }

    fn get_shared(&self, id: &Ulid) -> Option<SharedReservation> {
        self.reservations.get(id).map(|e| e.value().clone())
    }

    fn get_schedule(&self, building_id: &Ulid) -> Option<SharedSchedule> {
        self.schedules.get(building_id).map(|e| e.value().clone())
    }

    fn schedule_for(&self, building_id: Ulid) -> SharedSchedule {
        self.schedules
            .entry(building_id)
            .or_insert_with(|| Arc::new(RwLock::new(BuildingSchedule::new(building_id))))
            .value()
            .clone()
    }

    pub fn reservation_count(&self) -> usize {
        self.reservations.len()
    }

    /// Events logged since the WAL was opened or last compacted.
    pub async fn wal_appends_since_compact(&self) -> u64 {
        self.wal_request(|reply| WalRequest::AppendCount { reply })
            .await
            .unwrap_or(0)
    }

    /// Rewrite the WAL with one creation event per live reservation.
    pub async fn compact_wal(&self) -> Result<(), EngineError> {
        let _exclusive = self.commit_gate.write().await;

        let shared: Vec<SharedReservation> =
            self.reservations.iter().map(|e| e.value().clone()).collect();
        let mut events = Vec::with_capacity(shared.len());
        for r in shared {
            let reservation = r.lock().await.clone();
            events.push(Event::ReservationCreated { reservation });
        }

        self.wal_request(|done| WalRequest::Rewrite { events, done })
            .await?
            .map_err(|e| EngineError::WalError(e.to_string()))
    }
}

/// Background task that compacts the WAL once enough appends pile up.
pub async fn run_compactor(store: Arc<Store>, threshold: u64, shutdown: CancellationToken) {
    let mut interval = tokio::time::interval(Duration::from_secs(60));
    loop {
        tokio::select! {
            _ = interval.tick() => {}
            _ = shutdown.cancelled() => return,
        }
        store.notify.prune();
        let appends = store.wal_appends_since_compact().await;
        if appends < threshold {
            continue;
        }
        match store.compact_wal().await {
            Ok(()) => info!("compacted WAL after {appends} appends"),
            Err(e) => warn!("WAL compaction failed: {e}"),
        }
    }
}
