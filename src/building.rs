use std::io;
use std::path::Path;

use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::engine::EngineError;

/// Whether a building can currently be booked.
#[async_trait]
pub trait BuildingDirectory: Send + Sync {
    /// `Err(BuildingNotFound)` for unknown buildings.
    async fn is_published(&self, building_id: Ulid) -> Result<bool, EngineError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Building {
    pub id: Ulid,
    pub name: String,
    #[serde(default)]
    pub published: bool,
}

/// In-memory building catalog, optionally seeded from a JSON array of
/// [`Building`] records.
#[derive(Default)]
pub struct BuildingCatalog {
    buildings: DashMap<Ulid, Building>,
}

impl BuildingCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        let buildings: Vec<Building> = serde_json::from_str(json)?;
        let catalog = Self::new();
        for b in buildings {
            catalog.insert(b);
        }
        Ok(catalog)
    }

    pub fn load(path: &Path) -> io::Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
    }

    pub fn insert(&self, building: Building) {
        self.buildings.insert(building.id, building);
    }

    pub fn set_published(&self, building_id: Ulid, published: bool) -> Result<(), EngineError> {
        let mut entry = self
            .buildings
            .get_mut(&building_id)
            .ok_or(EngineError::BuildingNotFound(building_id))?;
        entry.published = published;
        Ok(())
    }

    pub fn get(&self, building_id: &Ulid) -> Option<Building> {
        self.buildings.get(building_id).map(|e| e.value().clone())
    }

    pub fn len(&self) -> usize {
        self.buildings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buildings.is_empty()
    }
}

#[async_trait]
impl BuildingDirectory for BuildingCatalog {
    async fn is_published(&self, building_id: Ulid) -> Result<bool, EngineError> {
        self.buildings
            .get(&building_id)
            .map(|b| b.published)
            .ok_or(EngineError::BuildingNotFound(building_id))
    }
}
