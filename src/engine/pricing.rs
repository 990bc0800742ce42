//! Rental cost. Pure functions over a rate snapshot; nothing here reads live car data.

use rust_decimal::{Decimal, RoundingStrategy};

use crate::limits::DAY_MS;
use crate::model::{Ms, Span};

use super::EngineError;

/// Share of one day's rate charged when the car is returned to another agency.
pub fn cross_agency_surcharge() -> Decimal {
    Decimal::new(3, 1)
}

/// Whole days billed for `[start, end]`: partial days round up, minimum one.
pub fn billable_days(start: Ms, end: Ms) -> i64 {
    let elapsed = (end - start).max(0);
    let days = elapsed / DAY_MS + i64::from(elapsed % DAY_MS != 0);
    days.max(1)
}

fn cost(daily_rate: Decimal, days: i64, same_agency: bool) -> Result<Decimal, EngineError> {
    let overflow = || EngineError::LimitExceeded("rental cost out of range");
    let mut total = daily_rate.checked_mul(Decimal::from(days)).ok_or_else(overflow)?;
    if !same_agency {
        let surcharge = daily_rate
            .checked_mul(cross_agency_surcharge())
            .ok_or_else(overflow)?;
        total = total.checked_add(surcharge).ok_or_else(overflow)?;
    }
    Ok(total.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero))
}

/// Booking-time estimate over the planned window.
pub fn estimate(daily_rate: Decimal, span: &Span, same_agency: bool) -> Result<Decimal, EngineError> {
    cost(daily_rate, billable_days(span.start, span.end), same_agency)
}

/// Charge at hand-back, billed to the actual return instant.
pub fn final_cost(
    snapshot_rate: Decimal,
    start: Ms,
    returned_at: Ms,
    same_agency: bool,
) -> Result<Decimal, EngineError> {
    cost(snapshot_rate, billable_days(start, returned_at), same_agency)
}
