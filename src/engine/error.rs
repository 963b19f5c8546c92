use chrono::NaiveDate;
use ulid::Ulid;

use crate::lifecycle::{Status, Transition};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    InvalidWindow {
        start: NaiveDate,
        end: NaiveDate,
    },
    InvalidDuration(u32),
    InvalidInput(&'static str),
    NotFound(Ulid),
    BuildingNotFound(Ulid),
    BuildingNotPublished(Ulid),
    Unavailable {
        building_id: Ulid,
        conflicting: Ulid,
    },
    NoPermission {
        reservation_id: Ulid,
        tenant_id: Ulid,
    },
    AlreadyTerminal {
        id: Ulid,
        status: Status,
    },
    IllegalTransition {
        id: Ulid,
        from: Status,
        transition: Transition,
    },
    /// A guarded write found a different status than the one it was based on.
    StatusChanged {
        id: Ulid,
        expected: Status,
        current: Status,
    },
    AlreadyExists(Ulid),
    LimitExceeded(&'static str),
    StoreUnavailable(String),
    WalError(String),
}

/// Coarse classification for the request layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    Conflict,
    NotFound,
    Transient,
}

impl EngineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::InvalidWindow { .. }
            | EngineError::InvalidDuration(_)
            | EngineError::InvalidInput(_) => ErrorKind::Validation,
            EngineError::NotFound(_) | EngineError::BuildingNotFound(_) => ErrorKind::NotFound,
            EngineError::BuildingNotPublished(_)
            | EngineError::Unavailable { .. }
            | EngineError::NoPermission { .. }
            | EngineError::AlreadyTerminal { .. }
            | EngineError::IllegalTransition { .. }
            | EngineError::StatusChanged { .. }
            | EngineError::AlreadyExists(_)
            | EngineError::LimitExceeded(_) => ErrorKind::Conflict,
            EngineError::StoreUnavailable(_) | EngineError::WalError(_) => ErrorKind::Transient,
        }
    }
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::InvalidWindow { start, end } => {
                write!(f, "invalid window [{start}, {end}): start must be before end")
            }
            EngineError::InvalidDuration(months) => {
                write!(f, "invalid duration: {months} months")
            }
            EngineError::InvalidInput(msg) => write!(f, "invalid input: {msg}"),
            EngineError::NotFound(id) => write!(f, "reservation not found: {id}"),
            EngineError::BuildingNotFound(id) => write!(f, "building not found: {id}"),
            EngineError::BuildingNotPublished(id) => {
                write!(f, "building {id} is not open for booking")
            }
            EngineError::Unavailable {
                building_id,
                conflicting,
            } => write!(
                f,
                "building {building_id} is unavailable: conflicts with reservation {conflicting}"
            ),
            EngineError::NoPermission {
                reservation_id,
                tenant_id,
            } => write!(
                f,
                "tenant {tenant_id} has no permission on reservation {reservation_id}"
            ),
            EngineError::AlreadyTerminal { id, status } => match status {
                Status::Completed => write!(f, "reservation {id} is already completed"),
                _ => write!(f, "reservation {id} is already {status}"),
            },
            EngineError::IllegalTransition {
                id,
                from,
                transition,
            } => write!(f, "cannot {transition} reservation {id} from {from}"),
            EngineError::StatusChanged {
                id,
                expected,
                current,
            } => write!(
                f,
                "reservation {id} changed concurrently: expected {expected}, found {current}"
            ),
            EngineError::AlreadyExists(id) => write!(f, "already exists: {id}"),
            EngineError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
            EngineError::StoreUnavailable(e) => write!(f, "store unavailable: {e}"),
            EngineError::WalError(e) => write!(f, "WAL error: {e}"),
        }
    }
}

impl std::error::Error for EngineError {}
