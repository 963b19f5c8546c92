mod availability;
pub(crate) mod conflict;
mod error;
mod mutations;
mod queries;

pub use availability::{merge_overlapping, subtract_windows};
pub use error::{EngineError, ErrorKind};

use std::sync::Arc;

use chrono::TimeDelta;
use tracing::{debug, info};

use crate::building::BuildingDirectory;
use crate::clock::Clock;
use crate::lifecycle::{GuardedTransition, Status, Transition, TransitionOutcome};
use crate::model::Reservation;
use crate::observability;
use crate::store::ReservationStore;

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// How long a tenant has to pay once a payment method is assigned.
    pub payment_window: TimeDelta,
    /// Create reservations directly in AWAITING_PAYMENT instead of PENDING.
    pub auto_assign_payment: bool,
    /// Occupying reservations a tenant may hold at once.
    pub max_active_per_tenant: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            payment_window: TimeDelta::hours(24),
            auto_assign_payment: true,
            max_active_per_tenant: 5,
        }
    }
}

/// Entry point for booking, update and cancellation requests. Validates
/// against the building directory and the store, then commits through the
/// store's guarded writes.
pub struct Engine {
    store: Arc<dyn ReservationStore>,
    buildings: Arc<dyn BuildingDirectory>,
    clock: Arc<dyn Clock>,
    config: EngineConfig,
}

impl Engine {
    pub fn new(
        store: Arc<dyn ReservationStore>,
        buildings: Arc<dyn BuildingDirectory>,
        clock: Arc<dyn Clock>,
        config: EngineConfig,
    ) -> Self {
        Self {
            store,
            buildings,
            clock,
            config,
        }
    }

    pub fn store(&self) -> &Arc<dyn ReservationStore> {
        &self.store
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Run `transition` against the status observed in `snapshot`, as a
    /// single compare-and-set in the store.
    async fn apply_transition(
        &self,
        snapshot: &Reservation,
        transition: Transition,
    ) -> Result<TransitionOutcome, EngineError> {
        let to = transition
            .target(snapshot.status)
            .ok_or(EngineError::IllegalTransition {
                id: snapshot.id,
                from: snapshot.status,
                transition,
            })?;
        let now = self.clock.now();
        let payment_deadline = (to == Status::AwaitingPayment).then(|| now + self.config.payment_window);

        let outcome = self
            .store
            .transition(GuardedTransition {
                id: snapshot.id,
                expected: snapshot.status,
                transition,
                at: now,
                payment_deadline,
            })
            .await?;

        match outcome {
            TransitionOutcome::Applied { from, to } => {
                info!("reservation {} {from} -> {to} ({transition})", snapshot.id);
                metrics::counter!(observability::TRANSITIONS_TOTAL, "transition" => transition.label())
                    .increment(1);
            }
            TransitionOutcome::AlreadyAdvanced { current } => {
                debug!(
                    "reservation {} already advanced to {current}, skipping {transition}",
                    snapshot.id
                );
                metrics::counter!(observability::TRANSITIONS_NOOP_TOTAL).increment(1);
            }
        }
        Ok(outcome)
    }
}
