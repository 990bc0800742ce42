use std::fmt;

use ulid::Ulid;

use crate::model::{CarStatus, RentalStatus};

use super::lifecycle::Transition;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entity {
    Car,
    Rental,
    User,
    Agency,
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Entity::Car => "car",
            Entity::Rental => "rental",
            Entity::User => "user",
            Entity::Agency => "agency",
        })
    }
}

/// Stable classification callers can branch on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    NotFound,
    Conflict,
    IllegalTransition,
    Internal,
}

#[derive(Debug)]
pub enum EngineError {
    Validation(String),
    AlreadyExists(Ulid),
    NotFound(Entity, Ulid),
    /// Overlaps the given rental.
    Conflict(Ulid),
    /// The car's lock could not be acquired in time.
    CarBusy(Ulid),
    CarUnavailable {
        car_id: Ulid,
        status: CarStatus,
    },
    IllegalTransition {
        rental_id: Ulid,
        from: RentalStatus,
        transition: Transition,
    },
    LimitExceeded(&'static str),
    Internal(&'static str),
}

impl EngineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::Validation(_)
            | EngineError::AlreadyExists(_)
            | EngineError::CarUnavailable { .. }
            | EngineError::LimitExceeded(_) => ErrorKind::Validation,
            EngineError::NotFound(..) => ErrorKind::NotFound,
            EngineError::Conflict(_) | EngineError::CarBusy(_) => ErrorKind::Conflict,
            EngineError::IllegalTransition { .. } => ErrorKind::IllegalTransition,
            EngineError::Internal(_) => ErrorKind::Internal,
        }
    }

    pub(crate) fn validation(msg: impl Into<String>) -> Self {
        EngineError::Validation(msg.into())
    }
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineError::Validation(msg) => write!(f, "invalid request: {msg}"),
            EngineError::AlreadyExists(id) => write!(f, "already exists: {id}"),
            EngineError::NotFound(entity, id) => write!(f, "{entity} not found: {id}"),
            EngineError::Conflict(id) => write!(f, "window overlaps rental {id}"),
            EngineError::CarBusy(id) => write!(f, "car {id} is busy, retry later"),
            EngineError::CarUnavailable { car_id, status } => {
                write!(f, "car {car_id} is unavailable ({status})")
            }
            EngineError::IllegalTransition {
                rental_id,
                from,
                transition,
            } => write!(f, "cannot {transition} rental {rental_id} in status {from}"),
            EngineError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
            EngineError::Internal(msg) => write!(f, "internal error: {msg}"),
        }
    }
}

impl std::error::Error for EngineError {}
