use std::fmt;

use crate::model::{Rental, RentalStatus};

use super::EngineError;

/// Everything that can happen to an existing rental.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Confirm,
    CheckIn,
    Finalize,
    Cancel,
    /// Field edits before pickup. Status is unchanged.
    Revise,
    Remove,
}

impl Transition {
    pub const ALL: [Transition; 6] = [
        Transition::Confirm,
        Transition::CheckIn,
        Transition::Finalize,
        Transition::Cancel,
        Transition::Revise,
        Transition::Remove,
    ];
}

impl fmt::Display for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Transition::Confirm => "confirm",
            Transition::CheckIn => "check in",
            Transition::Finalize => "finalize",
            Transition::Cancel => "cancel",
            Transition::Revise => "revise",
            Transition::Remove => "remove",
        })
    }
}

pub fn permits(from: RentalStatus, transition: Transition) -> bool {
    use RentalStatus::*;
    match transition {
        Transition::Confirm => from == Pending,
        Transition::CheckIn => from == Confirmed,
        Transition::Finalize => from == Active,
        Transition::Cancel | Transition::Revise => matches!(from, Pending | Confirmed),
        Transition::Remove => from != Active,
    }
}

pub fn check(rental: &Rental, transition: Transition) -> Result<(), EngineError> {
    if permits(rental.status, transition) {
        Ok(())
    } else {
        Err(EngineError::IllegalTransition {
            rental_id: rental.id,
            from: rental.status,
            transition,
        })
    }
}
