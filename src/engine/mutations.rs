use chrono::NaiveDate;
use tracing::info;
use ulid::Ulid;

use crate::lifecycle::{Status, Transition, TransitionOutcome};
use crate::model::*;
use crate::observability;

use super::conflict::{validate_company_name, window_for};
use super::{Engine, EngineError};

impl Engine {
    /// Book `building_id` for `duration_months` calendar months from `start`.
    /// Nothing is written unless every check passes.
    pub async fn create_reservation(
        &self,
        tenant_id: Ulid,
        building_id: Ulid,
        start: NaiveDate,
        duration_months: u32,
        company_name: impl Into<String>,
    ) -> Result<Ulid, EngineError> {
        self.try_create(tenant_id, building_id, start, duration_months, company_name.into())
            .await
            .inspect_err(observability::record_rejection)
    }

    async fn try_create(
        &self,
        tenant_id: Ulid,
        building_id: Ulid,
        start: NaiveDate,
        duration_months: u32,
        company_name: String,
    ) -> Result<Ulid, EngineError> {
        validate_company_name(&company_name)?;
        let span = window_for(start, duration_months)?;

        let active = self.store.count_active_for_user(tenant_id).await?;
        if active >= self.config.max_active_per_tenant {
            return Err(EngineError::LimitExceeded("too many active reservations for tenant"));
        }

        self.validate_booking(building_id, span, None).await?;

        let now = self.clock.now();
        let status = Status::initial(self.config.auto_assign_payment);
        let payment_deadline =
            (status == Status::AwaitingPayment).then(|| now + self.config.payment_window);
        let reservation = Reservation {
            id: Ulid::new(),
            tenant_id,
            building_id,
            company_name,
            span,
            duration_months,
            status,
            payment_deadline,
            created_at: now,
            updated_at: now,
        };
        let id = reservation.id;
        self.store.create(reservation).await?;

        metrics::counter!(observability::RESERVATIONS_CREATED_TOTAL).increment(1);
        info!(
            "reservation {id} created for building {building_id} [{}, {}) in {status}",
            span.start, span.end
        );
        Ok(id)
    }

    /// Apply `patch`. A changed building or window is re-validated with the
    /// reservation itself excluded from the conflict set.
    pub async fn update_reservation(
        &self,
        id: Ulid,
        patch: ReservationPatch,
    ) -> Result<Reservation, EngineError> {
        self.try_update(id, patch)
            .await
            .inspect_err(observability::record_rejection)
    }

    async fn try_update(&self, id: Ulid, patch: ReservationPatch) -> Result<Reservation, EngineError> {
        let current = self.get_reservation(id).await?;
        if current.status.is_terminal() {
            return Err(EngineError::AlreadyTerminal {
                id,
                status: current.status,
            });
        }
        if patch.is_empty() {
            return Ok(current);
        }

        let building_id = patch.building_id.unwrap_or(current.building_id);
        let duration_months = patch.duration_months.unwrap_or(current.duration_months);
        let start = patch.start_date.unwrap_or(current.span.start);
        let span = window_for(start, duration_months)?;
        let company_name = match patch.company_name {
            Some(name) => {
                validate_company_name(&name)?;
                name
            }
            None => current.company_name.clone(),
        };

        if building_id != current.building_id || span != current.span {
            self.validate_booking(building_id, span, Some(id)).await?;
        }

        let updated = self
            .store
            .update_details(
                id,
                current.status,
                DetailsUpdate {
                    building_id,
                    span,
                    duration_months,
                    company_name,
                    at: self.clock.now(),
                },
            )
            .await?;

        metrics::counter!(observability::RESERVATIONS_UPDATED_TOTAL).increment(1);
        info!(
            "reservation {id} updated: building {building_id} [{}, {})",
            span.start, span.end
        );
        Ok(updated)
    }

    /// Tenant-initiated cancellation.
    pub async fn cancel_reservation(
        &self,
        tenant_id: Ulid,
        id: Ulid,
    ) -> Result<TransitionOutcome, EngineError> {
        let result = async {
            let current = self.get_reservation(id).await?;
            if current.tenant_id != tenant_id {
                return Err(EngineError::NoPermission {
                    reservation_id: id,
                    tenant_id,
                });
            }
            self.checked_transition(&current, Transition::Cancel).await
        }
        .await;
        result.inspect_err(observability::record_rejection)
    }

    /// PENDING -> AWAITING_PAYMENT, starting the payment window.
    pub async fn assign_payment(&self, id: Ulid) -> Result<TransitionOutcome, EngineError> {
        self.admin_transition(id, Transition::AssignPayment).await
    }

    /// AWAITING_PAYMENT -> ACTIVE.
    pub async fn confirm_payment(&self, id: Ulid) -> Result<TransitionOutcome, EngineError> {
        self.admin_transition(id, Transition::ConfirmPayment).await
    }

    pub async fn reject_reservation(&self, id: Ulid) -> Result<TransitionOutcome, EngineError> {
        self.admin_transition(id, Transition::Reject).await
    }

    /// Remove a reservation outright. Not a lifecycle transition; frees the
    /// window whatever the status.
    pub async fn delete_reservation(&self, id: Ulid) -> Result<Reservation, EngineError> {
        let removed = self.store.delete(id).await?;
        info!(
            "reservation {id} deleted from building {} (was {})",
            removed.building_id, removed.status
        );
        Ok(removed)
    }

    /// Fire the deadline transition for the status seen in `snapshot`.
    /// A snapshot without a deadline transition is reported as already
    /// advanced.
    pub async fn advance_on_deadline(
        &self,
        snapshot: &Reservation,
    ) -> Result<TransitionOutcome, EngineError> {
        match Transition::for_deadline(snapshot.status) {
            Some(transition) => self.apply_transition(snapshot, transition).await,
            None => Ok(TransitionOutcome::AlreadyAdvanced {
                current: snapshot.status,
            }),
        }
    }

    async fn admin_transition(
        &self,
        id: Ulid,
        transition: Transition,
    ) -> Result<TransitionOutcome, EngineError> {
        let current = self.get_reservation(id).await?;
        self.checked_transition(&current, transition)
            .await
            .inspect_err(observability::record_rejection)
    }

    async fn checked_transition(
        &self,
        current: &Reservation,
        transition: Transition,
    ) -> Result<TransitionOutcome, EngineError> {
        if current.status.is_terminal() {
            return Err(EngineError::AlreadyTerminal {
                id: current.id,
                status: current.status,
            });
        }
        self.apply_transition(current, transition).await
    }
}
