use ulid::Ulid;

use crate::model::Reservation;

use super::{Engine, EngineError};

impl Engine {
    pub async fn get_reservation(&self, id: Ulid) -> Result<Reservation, EngineError> {
        self.store.get(id).await?.ok_or(EngineError::NotFound(id))
    }

    /// Every reservation the tenant owns, terminal ones included.
    pub async fn list_for_tenant(&self, tenant_id: Ulid) -> Result<Vec<Reservation>, EngineError> {
        self.store.list_for_tenant(tenant_id).await
    }

    pub async fn count_active_for_tenant(&self, tenant_id: Ulid) -> Result<usize, EngineError> {
        self.store.count_active_for_user(tenant_id).await
    }

    pub async fn count_active_for_building(&self, building_id: Ulid) -> Result<usize, EngineError> {
        self.store.count_active_for_building(building_id).await
    }
}
