use chrono::NaiveDate;
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;

use super::conflict::{first_conflict, validate_window};
use super::{Engine, EngineError};

impl Engine {
    /// True iff no occupying reservation on `building_id` overlaps
    /// `[start, end)`. `exclude` drops one reservation from the conflict set.
    pub async fn is_available(
        &self,
        building_id: Ulid,
        start: NaiveDate,
        end: NaiveDate,
        exclude: Option<Ulid>,
    ) -> Result<bool, EngineError> {
        let span = validate_window(start, end)?;
        Ok(self.find_conflict(building_id, span, exclude).await?.is_none())
    }

    /// Id of the first occupying reservation overlapping `span`, if any.
    pub async fn find_conflict(
        &self,
        building_id: Ulid,
        span: DateSpan,
        exclude: Option<Ulid>,
    ) -> Result<Option<Ulid>, EngineError> {
        let entries = self.store.overlapping(building_id, span).await?;
        Ok(first_conflict(&entries, &span, exclude))
    }

    async fn ensure_available(
        &self,
        building_id: Ulid,
        span: DateSpan,
        exclude: Option<Ulid>,
    ) -> Result<(), EngineError> {
        match self.find_conflict(building_id, span, exclude).await? {
            Some(conflicting) => Err(EngineError::Unavailable {
                building_id,
                conflicting,
            }),
            None => Ok(()),
        }
    }

    async fn ensure_published(&self, building_id: Ulid) -> Result<(), EngineError> {
        if self.buildings.is_published(building_id).await? {
            Ok(())
        } else {
            Err(EngineError::BuildingNotPublished(building_id))
        }
    }

    /// Publication and availability checks, run concurrently. Both resolve
    /// before anything is returned; a publication error wins over an
    /// availability error.
    pub(super) async fn validate_booking(
        &self,
        building_id: Ulid,
        span: DateSpan,
        exclude: Option<Ulid>,
    ) -> Result<(), EngineError> {
        let (published, available) = futures::join!(
            self.ensure_published(building_id),
            self.ensure_available(building_id, span, exclude),
        );
        published?;
        available
    }

    /// Sub-windows of `[start, end)` where `building_id` is free.
    pub async fn free_windows(
        &self,
        building_id: Ulid,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<DateSpan>, EngineError> {
        let query = validate_window(start, end)?;
        let booked = self.booked_windows(building_id, start, end).await?;
        Ok(subtract_windows(&[query], &booked))
    }

    /// Occupied stretches of `[start, end)` on `building_id`, merged and
    /// clamped to the query.
    pub async fn booked_windows(
        &self,
        building_id: Ulid,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<DateSpan>, EngineError> {
        let query = validate_window(start, end)?;
        if query.days() > MAX_QUERY_WINDOW_DAYS {
            return Err(EngineError::LimitExceeded("query window too wide"));
        }
        let mut booked: Vec<DateSpan> = self
            .store
            .overlapping(building_id, query)
            .await?
            .into_iter()
            .filter(|o| o.status.is_occupying())
            .map(|o| DateSpan::new(o.span.start.max(query.start), o.span.end.min(query.end)))
            .collect();
        booked.sort_by_key(|s| s.start);
        Ok(merge_overlapping(&booked))
    }
}

/// Merge sorted overlapping/adjacent windows into disjoint windows.
pub fn merge_overlapping(sorted: &[DateSpan]) -> Vec<DateSpan> {
    let mut merged: Vec<DateSpan> = Vec::new();
    for &span in sorted {
        if let Some(last) = merged.last_mut()
            && span.start <= last.end
        {
            last.end = last.end.max(span.end);
            continue;
        }
        merged.push(span);
    }
    merged
}

/// `base` minus `to_remove`; both sorted by start, `to_remove` disjoint.
pub fn subtract_windows(base: &[DateSpan], to_remove: &[DateSpan]) -> Vec<DateSpan> {
    let mut result = Vec::new();
    let mut ri = 0;

    for b in base {
        let mut cursor = b.start;
        while ri < to_remove.len() && to_remove[ri].end <= cursor {
            ri += 1;
        }
        let mut j = ri;
        while j < to_remove.len() && to_remove[j].start < b.end {
            let r = &to_remove[j];
            if r.start > cursor {
                result.push(DateSpan::new(cursor, r.start));
            }
            cursor = cursor.max(r.end);
            j += 1;
        }
        if cursor < b.end {
            result.push(DateSpan::new(cursor, b.end));
        }
    }

    result
}
