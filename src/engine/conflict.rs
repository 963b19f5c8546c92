use chrono::NaiveDate;
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;

use super::EngineError;

pub(crate) fn validate_window(start: NaiveDate, end: NaiveDate) -> Result<DateSpan, EngineError> {
    DateSpan::try_new(start, end).ok_or(EngineError::InvalidWindow { start, end })
}

/// Derive the booking window from a start day and a whole number of months.
pub(crate) fn window_for(start: NaiveDate, duration_months: u32) -> Result<DateSpan, EngineError> {
    if duration_months == 0 || duration_months > MAX_DURATION_MONTHS {
        return Err(EngineError::InvalidDuration(duration_months));
    }
    DateSpan::from_months(start, duration_months)
        .ok_or(EngineError::InvalidDuration(duration_months))
}

pub(crate) fn validate_company_name(name: &str) -> Result<(), EngineError> {
    if name.trim().is_empty() {
        return Err(EngineError::InvalidInput("company name is empty"));
    }
    if name.len() > MAX_COMPANY_NAME_LEN {
        return Err(EngineError::LimitExceeded("company name too long"));
    }
    Ok(())
}

/// First occupying entry whose window overlaps `span`, skipping `exclude`.
pub(crate) fn first_conflict<'a>(
    entries: impl IntoIterator<Item = &'a Occupancy>,
    span: &DateSpan,
    exclude: Option<Ulid>,
) -> Option<Ulid> {
    entries
        .into_iter()
        .filter(|o| Some(o.id) != exclude)
        .filter(|o| o.status.is_occupying())
        .find(|o| o.span.overlaps(span))
        .map(|o| o.id)
}

pub(crate) fn check_no_conflict<'a>(
    building_id: Ulid,
    entries: impl IntoIterator<Item = &'a Occupancy>,
    span: &DateSpan,
    exclude: Option<Ulid>,
) -> Result<(), EngineError> {
    match first_conflict(entries, span, exclude) {
        Some(conflicting) => Err(EngineError::Unavailable {
            building_id,
            conflicting,
        }),
        None => Ok(()),
    }
}
