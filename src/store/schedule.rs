use ulid::Ulid;

use crate::model::*;

/// Occupying reservations on one building, sorted by `span.start`.
#[derive(Debug, Clone)]
pub struct BuildingSchedule {
    pub building_id: Ulid,
    pub entries: Vec<Occupancy>,
}

impl BuildingSchedule {
    pub fn new(building_id: Ulid) -> Self {
        Self {
            building_id,
            entries: Vec::new(),
        }
    }

    /// Insert maintaining sort order by span.start.
    pub fn insert(&mut self, entry: Occupancy) {
        let pos = self
            .entries
            .binary_search_by_key(&entry.span.start, |e| e.span.start)
            .unwrap_or_else(|e| e);
        self.entries.insert(pos, entry);
    }

    pub fn remove(&mut self, id: Ulid) -> Option<Occupancy> {
        let pos = self.entries.iter().position(|e| e.id == id)?;
        Some(self.entries.remove(pos))
    }

    pub fn set_status(&mut self, id: Ulid, status: crate::lifecycle::Status) {
        if let Some(entry) = self.entries.iter_mut().find(|e| e.id == id) {
            entry.status = status;
        }
    }

    /// Entries whose window overlaps the query.
    /// Binary search skips everything starting at or after `query.end`.
    pub fn overlapping(&self, query: &DateSpan) -> impl Iterator<Item = &Occupancy> {
        let right_bound = self.entries.partition_point(|e| e.span.start < query.end);
        self.entries[..right_bound]
            .iter()
            .filter(move |e| e.span.end > query.start)
    }

    pub fn occupying_count(&self) -> usize {
        self.entries.iter().filter(|e| e.status.is_occupying()).count()
    }
}
