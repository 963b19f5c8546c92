use std::sync::Arc;

use tokio::sync::{Mutex, OwnedRwLockWriteGuard};
use ulid::Ulid;

use crate::engine::EngineError;
use crate::engine::conflict::check_no_conflict;
use crate::lifecycle::{GuardedTransition, Status, TransitionOutcome};
use crate::limits::*;
use crate::model::*;

use super::{BuildingSchedule, Store};

impl Store {
    pub async fn insert_reservation(&self, reservation: Reservation) -> Result<(), EngineError> {
        let _gate = self.commit_gate.read().await;
        if self.reservations.contains_key(&reservation.id) {
            return Err(EngineError::AlreadyExists(reservation.id));
        }

        // Building write lock held from the overlap check through the insert,
        // so two racing creates can't both pass.
        let schedule = self.schedule_for(reservation.building_id);
        let mut guard = schedule.write().await;
        if reservation.is_occupying() {
            if guard.entries.len() >= MAX_RESERVATIONS_PER_BUILDING {
                return Err(EngineError::LimitExceeded("too many reservations on building"));
            }
            check_no_conflict(
                guard.building_id,
                guard.overlapping(&reservation.span),
                &reservation.span,
                None,
            )?;
        }

        let event = Event::ReservationCreated {
            reservation: reservation.clone(),
        };
        self.wal_append(&event).await?;

        if reservation.is_occupying() {
            guard.insert(reservation.occupancy());
        }
        self.by_tenant
            .entry(reservation.tenant_id)
            .or_default()
            .push(reservation.id);
        self.reservations
            .insert(reservation.id, Arc::new(Mutex::new(reservation)));
        drop(guard);

        self.notify.send(event.building_id(), &event);
        Ok(())
    }

    pub async fn update_reservation_details(
        &self,
        id: Ulid,
        expected: Status,
        update: DetailsUpdate,
    ) -> Result<Reservation, EngineError> {
        let _gate = self.commit_gate.read().await;
        let shared = self.get_shared(&id).ok_or(EngineError::NotFound(id))?;
        let mut current = shared.lock().await;
        if !self.reservations.contains_key(&id) {
            return Err(EngineError::NotFound(id));
        }
        if current.status != expected {
            return Err(EngineError::StatusChanged {
                id,
                expected,
                current: current.status,
            });
        }
        if current.status.is_terminal() {
            return Err(EngineError::AlreadyTerminal {
                id,
                status: current.status,
            });
        }

        let event = Event::DetailsUpdated {
            id,
            building_id: update.building_id,
            span: update.span,
            duration_months: update.duration_months,
            company_name: update.company_name.clone(),
            at: update.at,
        };

        let window_changed =
            update.building_id != current.building_id || update.span != current.span;
        if window_changed {
            let mut guards = self
                .lock_schedules(&[current.building_id, update.building_id])
                .await;
            let target = guards
                .iter()
                .find(|g| g.building_id == update.building_id)
                .ok_or_else(|| EngineError::StoreUnavailable("schedule lock missing".into()))?;
            if update.building_id != current.building_id
                && target.entries.len() >= MAX_RESERVATIONS_PER_BUILDING
            {
                return Err(EngineError::LimitExceeded("too many reservations on building"));
            }
            check_no_conflict(
                update.building_id,
                target.overlapping(&update.span),
                &update.span,
                Some(id),
            )?;

            self.wal_append(&event).await?;

            for guard in guards.iter_mut() {
                if guard.building_id == current.building_id {
                    guard.remove(id);
                }
            }
            for guard in guards.iter_mut() {
                if guard.building_id == update.building_id {
                    guard.insert(Occupancy {
                        id,
                        span: update.span,
                        status: current.status,
                    });
                }
            }
        } else {
            self.wal_append(&event).await?;
        }

        current.building_id = update.building_id;
        current.span = update.span;
        current.duration_months = update.duration_months;
        current.company_name = update.company_name;
        current.updated_at = update.at;
        let snapshot = current.clone();
        drop(current);

        self.notify.send(event.building_id(), &event);
        Ok(snapshot)
    }

    pub async fn apply_transition(
        &self,
        guarded: GuardedTransition,
    ) -> Result<TransitionOutcome, EngineError> {
        let id = guarded.id;
        let _gate = self.commit_gate.read().await;
        let shared = self.get_shared(&id).ok_or(EngineError::NotFound(id))?;
        let mut current = shared.lock().await;
        if !self.reservations.contains_key(&id) {
            return Err(EngineError::NotFound(id));
        }
        if current.status != guarded.expected {
            return Ok(TransitionOutcome::AlreadyAdvanced {
                current: current.status,
            });
        }

        let from = current.status;
        let to = guarded
            .transition
            .target(from)
            .ok_or(EngineError::IllegalTransition {
                id,
                from,
                transition: guarded.transition,
            })?;
        let payment_deadline = match to {
            Status::AwaitingPayment => Some(
                guarded
                    .payment_deadline
                    .ok_or(EngineError::InvalidInput("payment deadline required"))?,
            ),
            _ => None,
        };

        let event = Event::StatusChanged {
            id,
            building_id: current.building_id,
            from,
            to,
            payment_deadline,
            at: guarded.at,
        };

        let mut schedule = match self.get_schedule(&current.building_id) {
            Some(s) => Some(s.write_owned().await),
            None => None,
        };
        self.wal_append(&event).await?;

        current.status = to;
        current.payment_deadline = payment_deadline;
        current.updated_at = guarded.at;
        if let Some(guard) = schedule.as_mut() {
            if to.is_terminal() {
                guard.remove(id);
            } else {
                guard.set_status(id, to);
            }
        }
        drop(schedule);
        drop(current);

        self.notify.send(event.building_id(), &event);
        Ok(TransitionOutcome::Applied { from, to })
    }

    pub async fn remove_reservation(&self, id: Ulid) -> Result<Reservation, EngineError> {
        let _gate = self.commit_gate.read().await;
        let shared = self.get_shared(&id).ok_or(EngineError::NotFound(id))?;
        let current = shared.lock().await;
        if !self.reservations.contains_key(&id) {
            return Err(EngineError::NotFound(id));
        }

        let event = Event::ReservationDeleted {
            id,
            building_id: current.building_id,
        };
        let mut schedule = match self.get_schedule(&current.building_id) {
            Some(s) => Some(s.write_owned().await),
            None => None,
        };
        self.wal_append(&event).await?;

        if let Some(guard) = schedule.as_mut() {
            guard.remove(id);
        }
        if let Some(mut ids) = self.by_tenant.get_mut(&current.tenant_id) {
            ids.retain(|r| *r != id);
        }
        self.reservations.remove(&id);
        let snapshot = current.clone();
        drop(schedule);
        drop(current);

        self.notify.send(event.building_id(), &event);
        Ok(snapshot)
    }

    /// Acquire write locks on the given buildings in sorted order to prevent deadlocks.
    async fn lock_schedules(
        &self,
        building_ids: &[Ulid],
    ) -> Vec<OwnedRwLockWriteGuard<BuildingSchedule>> {
        let mut ids = building_ids.to_vec();
        ids.sort();
        ids.dedup();
        let mut guards = Vec::with_capacity(ids.len());
        for id in ids {
            guards.push(self.schedule_for(id).write_owned().await);
        }
        guards
    }
}
