use chrono::{DateTime, Months, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::lifecycle::Status;

/// Half-open calendar-day window `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DateSpan {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateSpan {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        debug_assert!(start < end, "DateSpan start must be before end");
        Self { start, end }
    }

    /// `None` unless `start < end`.
    pub fn try_new(start: NaiveDate, end: NaiveDate) -> Option<Self> {
        (start < end).then_some(Self { start, end })
    }

    /// Window covering `months` calendar months from `start`. Days past the
    /// end of a shorter month clamp to its last day (Jan 31 + 1 month = Feb 28/29).
    pub fn from_months(start: NaiveDate, months: u32) -> Option<Self> {
        let end = start.checked_add_months(Months::new(months))?;
        Self::try_new(start, end)
    }

    pub fn days(&self) -> i64 {
        (self.end - self.start).num_days()
    }

    pub fn overlaps(&self, other: &DateSpan) -> bool {
        self.start < other.end && other.start < self.end
    }

}

/// Midnight UTC at the start of `day`.
pub fn day_start(day: NaiveDate) -> DateTime<Utc> {
    day.and_time(NaiveTime::MIN).and_utc()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    pub id: Ulid,
    pub tenant_id: Ulid,
    pub building_id: Ulid,
    pub company_name: String,
    /// Always `DateSpan::from_months(span.start, duration_months)`.
    pub span: DateSpan,
    pub duration_months: u32,
    pub status: Status,
    /// Set only while AWAITING_PAYMENT.
    pub payment_deadline: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Reservation {
    /// The one deadline relevant to the current status, if any.
    pub fn deadline(&self) -> Option<DateTime<Utc>> {
        match self.status {
            Status::AwaitingPayment => self.payment_deadline,
            Status::Active => Some(day_start(self.span.end)),
            _ => None,
        }
    }

    pub fn is_occupying(&self) -> bool {
        self.status.is_occupying()
    }

    pub fn occupancy(&self) -> Occupancy {
        Occupancy {
            id: self.id,
            span: self.span,
            status: self.status,
        }
    }
}

/// A reservation's footprint on a building schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Occupancy {
    pub id: Ulid,
    pub span: DateSpan,
    pub status: Status,
}

/// Caller-requested changes to an existing reservation. `None` keeps the
/// stored value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReservationPatch {
    pub building_id: Option<Ulid>,
    pub start_date: Option<NaiveDate>,
    pub duration_months: Option<u32>,
    pub company_name: Option<String>,
}

impl ReservationPatch {
    pub fn is_empty(&self) -> bool {
        self.building_id.is_none()
            && self.start_date.is_none()
            && self.duration_months.is_none()
            && self.company_name.is_none()
    }
}

/// Fully resolved details written by a guarded update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetailsUpdate {
    pub building_id: Ulid,
    pub span: DateSpan,
    pub duration_months: u32,
    pub company_name: String,
    pub at: DateTime<Utc>,
}

/// The event types. This is the WAL record format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    ReservationCreated {
        reservation: Reservation,
    },
    DetailsUpdated {
        id: Ulid,
        building_id: Ulid,
        span: DateSpan,
        duration_months: u32,
        company_name: String,
        at: DateTime<Utc>,
    },
    StatusChanged {
        id: Ulid,
        building_id: Ulid,
        from: Status,
        to: Status,
        payment_deadline: Option<DateTime<Utc>>,
        at: DateTime<Utc>,
    },
    ReservationDeleted {
        id: Ulid,
        building_id: Ulid,
    },
}

impl Event {
    pub fn building_id(&self) -> Ulid {
        match self {
            Event::ReservationCreated { reservation } => reservation.building_id,
            Event::DetailsUpdated { building_id, .. }
            | Event::StatusChanged { building_id, .. }
            | Event::ReservationDeleted { building_id, .. } => *building_id,
        }
    }

    pub fn reservation_id(&self) -> Ulid {
        match self {
            Event::ReservationCreated { reservation } => reservation.id,
            Event::DetailsUpdated { id, .. }
            | Event::StatusChanged { id, .. }
            | Event::ReservationDeleted { id, .. } => *id,
        }
    }
}
