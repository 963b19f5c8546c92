use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ulid::Ulid;

use crate::engine::EngineError;
use crate::lifecycle::{GuardedTransition, Status, TransitionOutcome};
use crate::model::*;

use super::{ReservationStore, SharedReservation, Store};

impl Store {
    pub async fn snapshot(&self, id: Ulid) -> Option<Reservation> {
        let shared = self.get_shared(&id)?;
        let guard = shared.lock().await;
        Some(guard.clone())
    }

    /// Snapshot every reservation matching `keep`, ordered by id (creation order).
    async fn collect_where(&self, keep: impl Fn(&Reservation) -> bool) -> Vec<Reservation> {
        let shared: Vec<SharedReservation> =
            self.reservations.iter().map(|e| e.value().clone()).collect();
        let mut out = Vec::new();
        for r in shared {
            let guard = r.lock().await;
            if keep(&guard) {
                out.push(guard.clone());
            }
        }
        out.sort_by_key(|r| r.id);
        out
    }

    pub async fn due_before(&self, statuses: &[Status], before: DateTime<Utc>) -> Vec<Reservation> {
        let mut due = self
            .collect_where(|r| {
                statuses.contains(&r.status) && r.deadline().is_some_and(|d| d <= before)
            })
            .await;
        due.sort_by_key(|r| (r.deadline(), r.id));
        due
    }

    pub async fn occupancy(&self, building_id: Ulid, span: DateSpan) -> Vec<Occupancy> {
        let Some(schedule) = self.get_schedule(&building_id) else {
            return Vec::new();
        };
        let guard = schedule.read().await;
        guard.overlapping(&span).copied().collect()
    }

    pub async fn tenant_reservations(&self, tenant_id: Ulid) -> Vec<Reservation> {
        let ids: Vec<Ulid> = self
            .by_tenant
            .get(&tenant_id)
            .map(|e| e.value().clone())
            .unwrap_or_default();
        let mut out = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(r) = self.snapshot(id).await {
                out.push(r);
            }
        }
        out.sort_by_key(|r| r.id);
        out
    }

    pub async fn building_occupying_count(&self, building_id: Ulid) -> usize {
        match self.get_schedule(&building_id) {
            Some(schedule) => schedule.read().await.occupying_count(),
            None => 0,
        }
    }
}

#[async_trait]
impl ReservationStore for Store {
    async fn create(&self, reservation: Reservation) -> Result<(), EngineError> {
        self.insert_reservation(reservation).await
    }

    async fn update_details(
        &self,
        id: Ulid,
        expected: Status,
        update: DetailsUpdate,
    ) -> Result<Reservation, EngineError> {
        self.update_reservation_details(id, expected, update).await
    }

    async fn transition(&self, guarded: GuardedTransition) -> Result<TransitionOutcome, EngineError> {
        self.apply_transition(guarded).await
    }

    async fn get(&self, id: Ulid) -> Result<Option<Reservation>, EngineError> {
        Ok(self.snapshot(id).await)
    }

    async fn list_by_deadline(
        &self,
        statuses: &[Status],
        before: DateTime<Utc>,
    ) -> Result<Vec<Reservation>, EngineError> {
        Ok(self.due_before(statuses, before).await)
    }

    async fn overlapping(&self, building_id: Ulid, span: DateSpan) -> Result<Vec<Occupancy>, EngineError> {
        Ok(self.occupancy(building_id, span).await)
    }

    async fn list_for_tenant(&self, tenant_id: Ulid) -> Result<Vec<Reservation>, EngineError> {
        Ok(self.tenant_reservations(tenant_id).await)
    }

    async fn count_active_for_user(&self, tenant_id: Ulid) -> Result<usize, EngineError> {
        let reservations = self.tenant_reservations(tenant_id).await;
        Ok(reservations.iter().filter(|r| r.is_occupying()).count())
    }

    async fn count_active_for_building(&self, building_id: Ulid) -> Result<usize, EngineError> {
        Ok(self.building_occupying_count(building_id).await)
    }

    async fn delete(&self, id: Ulid) -> Result<Reservation, EngineError> {
        self.remove_reservation(id).await
    }
}
