use ulid::Ulid;

use crate::limits::*;
use crate::model::*;

use super::EngineError;

pub(crate) fn now_ms() -> Ms {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as Ms)
        .unwrap_or(0)
}

/// Midnight UTC of the day containing `now`.
pub(crate) fn start_of_day(now: Ms) -> Ms {
    now - now.rem_euclid(DAY_MS)
}

fn check_timestamp(t: Ms) -> Result<(), EngineError> {
    if !(MIN_VALID_TIMESTAMP_MS..=MAX_VALID_TIMESTAMP_MS).contains(&t) {
        return Err(EngineError::LimitExceeded("timestamp out of range"));
    }
    Ok(())
}

/// Range, order and length of a rental window.
pub(crate) fn validate_window(start: Ms, end: Ms) -> Result<Span, EngineError> {
    check_timestamp(start)?;
    check_timestamp(end)?;
    if end <= start {
        return Err(EngineError::validation("end_date must be after start_date"));
    }
    let span = Span::new(start, end);
    if span.duration_ms() > MAX_RENTAL_WINDOW_MS {
        return Err(EngineError::LimitExceeded("rental window too long"));
    }
    Ok(span)
}

/// A pickup today (any time) is accepted; yesterday is not.
pub(crate) fn check_not_past(start: Ms, now: Ms) -> Result<(), EngineError> {
    if start < start_of_day(now) {
        return Err(EngineError::validation("start_date is in the past"));
    }
    Ok(())
}

pub(crate) fn validate_query_window(start: Ms, end: Ms) -> Result<Span, EngineError> {
    check_timestamp(start)?;
    check_timestamp(end)?;
    if end < start {
        return Err(EngineError::validation("end_date must not precede start_date"));
    }
    if end - start > MAX_QUERY_WINDOW_MS {
        return Err(EngineError::LimitExceeded("query window too wide"));
    }
    // start == end is a point-in-time query; built directly since Span::new asserts start < end.
    Ok(Span { start, end })
}

/// Rentals that still hold the car and overlap `span` (closed interval).
pub(crate) fn blocking_rentals<'a>(
    ledger: &'a CarLedger,
    span: &'a Span,
    exclude: Option<Ulid>,
) -> impl Iterator<Item = &'a Rental> + 'a {
    ledger
        .overlapping(span)
        .filter(move |r| !r.status.is_terminal() && Some(r.id) != exclude)
}

pub(crate) fn find_conflict(ledger: &CarLedger, span: &Span, exclude: Option<Ulid>) -> Option<Ulid> {
    blocking_rentals(ledger, span, exclude).next().map(|r| r.id)
}

pub(crate) fn check_no_conflict(
    ledger: &CarLedger,
    span: &Span,
    exclude: Option<Ulid>,
) -> Result<(), EngineError> {
    match find_conflict(ledger, span, exclude) {
        Some(id) => Err(EngineError::Conflict(id)),
        None => Ok(()),
    }
}
