use std::fmt;
use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Unix milliseconds (UTC). The only time type.
pub type Ms = i64;

/// Closed interval `[start, end]`. Touching endpoints overlap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub start: Ms,
    pub end: Ms,
}

impl Span {
    pub fn new(start: Ms, end: Ms) -> Self {
        debug_assert!(start < end, "Span start must be before end");
        Self { start, end }
    }

    pub fn duration_ms(&self) -> Ms {
        self.end - self.start
    }

    pub fn overlaps(&self, other: &Span) -> bool {
        self.start <= other.end && other.start <= self.end
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RentalStatus {
    /// Reserved for payment gating; no current operation creates it.
    Pending,
    Confirmed,
    Active,
    Completed,
    Cancelled,
}

impl RentalStatus {
    /// Terminal rentals no longer occupy the car.
    pub fn is_terminal(self) -> bool {
        matches!(self, RentalStatus::Completed | RentalStatus::Cancelled)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RentalStatus::Pending => "PENDING",
            RentalStatus::Confirmed => "CONFIRMED",
            RentalStatus::Active => "ACTIVE",
            RentalStatus::Completed => "COMPLETED",
            RentalStatus::Cancelled => "CANCELLED",
        }
    }
}

impl fmt::Display for RentalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RentalStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "PENDING" => Ok(RentalStatus::Pending),
            "CONFIRMED" => Ok(RentalStatus::Confirmed),
            "ACTIVE" => Ok(RentalStatus::Active),
            "COMPLETED" => Ok(RentalStatus::Completed),
            "CANCELLED" => Ok(RentalStatus::Cancelled),
            other => Err(format!("unknown rental status: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CarStatus {
    Available,
    Rented,
    Maintenance,
}

impl CarStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            CarStatus::Available => "AVAILABLE",
            CarStatus::Rented => "RENTED",
            CarStatus::Maintenance => "MAINTENANCE",
        }
    }
}

impl fmt::Display for CarStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CarStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "AVAILABLE" => Ok(CarStatus::Available),
            "RENTED" => Ok(CarStatus::Rented),
            "MAINTENANCE" => Ok(CarStatus::Maintenance),
            other => Err(format!("unknown car status: {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Agency {
    pub id: Ulid,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: Ulid,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Car {
    pub id: Ulid,
    pub plate: Option<String>,
    /// Agency the car currently sits at.
    pub agency_id: Ulid,
    pub daily_rate: Decimal,
    pub current_mileage: u64,
    pub status: CarStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rental {
    pub id: Ulid,
    pub user_id: Ulid,
    pub car_id: Ulid,
    pub pickup_agency_id: Ulid,
    pub return_agency_id: Ulid,
    /// Planned pickup/return.
    pub span: Span,
    pub real_return_date: Option<Ms>,
    /// Car's daily rate at booking time. Never rewritten.
    pub daily_rate_snapshot: Decimal,
    pub total_value: Decimal,
    pub start_mileage: u64,
    pub end_mileage: Option<u64>,
    pub status: RentalStatus,
    pub created_at: Ms,
    pub updated_at: Ms,
}

impl Rental {
    pub fn same_agency(&self) -> bool {
        self.pickup_agency_id == self.return_agency_id
    }
}

/// A car together with every rental that references it. One lock guards both,
/// so car and rental mutations always land together.
#[derive(Debug, Clone)]
pub struct CarLedger {
    pub car: Car,
    /// All rentals for the car, sorted by `span.start`.
    pub rentals: Vec<Rental>,
    /// Set when the car is removed; waiters holding a stale handle see NotFound.
    pub retired: bool,
}

impl CarLedger {
    pub fn new(car: Car) -> Self {
        Self {
            car,
            rentals: Vec::new(),
            retired: false,
        }
    }

    /// Insert rental maintaining sort order by span.start.
    pub fn insert_rental(&mut self, rental: Rental) {
        let pos = self
            .rentals
            .binary_search_by_key(&rental.span.start, |r| r.span.start)
            .unwrap_or_else(|e| e);
        self.rentals.insert(pos, rental);
    }

    pub fn remove_rental(&mut self, id: Ulid) -> Option<Rental> {
        let pos = self.rentals.iter().position(|r| r.id == id)?;
        Some(self.rentals.remove(pos))
    }

    pub fn rental(&self, id: Ulid) -> Option<&Rental> {
        self.rentals.iter().find(|r| r.id == id)
    }

    pub fn rental_mut(&mut self, id: Ulid) -> Option<&mut Rental> {
        self.rentals.iter_mut().find(|r| r.id == id)
    }

    /// Rentals whose closed window overlaps the query, any status.
    /// Binary search skips rentals starting after `query.end`.
    pub fn overlapping(&self, query: &Span) -> impl Iterator<Item = &Rental> {
        let right_bound = self.rentals.partition_point(|r| r.span.start <= query.end);
        self.rentals[..right_bound]
            .iter()
            .filter(move |r| r.span.end >= query.start)
    }
}

// ── Requests ─────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewRental {
    pub id: Ulid,
    pub user_id: Ulid,
    pub car_id: Ulid,
    pub start_date: Ms,
    pub end_date: Ms,
    pub pickup_agency_id: Ulid,
    /// Defaults to the pickup agency.
    pub return_agency_id: Option<Ulid>,
    /// Defaults to the car's odometer.
    pub start_mileage: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FinalizeRental {
    pub end_mileage: Option<u64>,
    /// Defaults to now.
    pub real_return_date: Option<Ms>,
}

/// Partial rental update. A status routes to the matching transition;
/// the remaining fields are merged while the rental has not been picked up.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RentalPatch {
    pub status: Option<RentalStatus>,
    pub start_date: Option<Ms>,
    pub end_date: Option<Ms>,
    pub return_agency_id: Option<Ulid>,
    pub start_mileage: Option<u64>,
    pub end_mileage: Option<u64>,
    pub real_return_date: Option<Ms>,
}

impl RentalPatch {
    pub fn has_field_edits(&self) -> bool {
        self.start_date.is_some()
            || self.end_date.is_some()
            || self.return_agency_id.is_some()
            || self.start_mileage.is_some()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CarPatch {
    pub status: Option<CarStatus>,
    pub current_mileage: Option<u64>,
    pub agency_id: Option<Ulid>,
    pub daily_rate: Option<Decimal>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RentalFilter {
    pub car_id: Option<Ulid>,
    pub user_id: Option<Ulid>,
    pub status: Option<RentalStatus>,
}

impl RentalFilter {
    pub fn matches(&self, rental: &Rental) -> bool {
        self.car_id.is_none_or(|id| rental.car_id == id)
            && self.user_id.is_none_or(|id| rental.user_id == id)
            && self.status.is_none_or(|s| rental.status == s)
    }
}

/// The event types, flat with no nesting. This is the WAL record format.
/// Every rental event names its car so replay can route it to the right ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    AgencyRegistered {
        id: Ulid,
        name: String,
    },
    UserRegistered {
        id: Ulid,
        name: String,
    },
    CarRegistered {
        car: Car,
    },
    CarUpdated {
        car: Car,
    },
    CarRemoved {
        id: Ulid,
    },
    RentalCreated {
        rental: Rental,
    },
    RentalConfirmed {
        id: Ulid,
        car_id: Ulid,
        at: Ms,
    },
    /// Rental → ACTIVE, car → RENTED.
    RentalCheckedIn {
        id: Ulid,
        car_id: Ulid,
        at: Ms,
    },
    /// Rental → COMPLETED; car → AVAILABLE at the return agency with the final odometer.
    RentalFinalized {
        id: Ulid,
        car_id: Ulid,
        end_mileage: u64,
        real_return_date: Ms,
        total_value: Decimal,
        at: Ms,
    },
    RentalCancelled {
        id: Ulid,
        car_id: Ulid,
        at: Ms,
    },
    RentalRevised {
        id: Ulid,
        car_id: Ulid,
        span: Span,
        return_agency_id: Ulid,
        start_mileage: u64,
        total_value: Decimal,
        at: Ms,
    },
    RentalRemoved {
        id: Ulid,
        car_id: Ulid,
    },
}

impl Event {
    /// The car whose ledger this event mutates, if any.
    pub fn car_id(&self) -> Option<Ulid> {
        match self {
            Event::CarRegistered { car } | Event::CarUpdated { car } => Some(car.id),
            Event::CarRemoved { id } => Some(*id),
            Event::RentalCreated { rental } => Some(rental.car_id),
            Event::RentalConfirmed { car_id, .. }
            | Event::RentalCheckedIn { car_id, .. }
            | Event::RentalFinalized { car_id, .. }
            | Event::RentalCancelled { car_id, .. }
            | Event::RentalRevised { car_id, .. }
            | Event::RentalRemoved { car_id, .. } => Some(*car_id),
            Event::AgencyRegistered { .. } | Event::UserRegistered { .. } => None,
        }
    }
}
