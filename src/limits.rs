use crate::model::Ms;

/// One day in ms.
pub const DAY_MS: Ms = 86_400_000;

/// 1970-01-01T00:00:00Z.
pub const MIN_VALID_TIMESTAMP_MS: Ms = 0;
/// 9999-12-31T23:59:59.999Z.
pub const MAX_VALID_TIMESTAMP_MS: Ms = 253_402_300_799_999;

/// Longest rental window accepted at booking time.
pub const MAX_RENTAL_WINDOW_MS: Ms = 365 * DAY_MS;
/// Widest window accepted by conflict queries.
pub const MAX_QUERY_WINDOW_MS: Ms = 5 * 365 * DAY_MS;

pub const MAX_CARS: usize = 100_000;
pub const MAX_RENTALS_PER_CAR: usize = 50_000;
pub const MAX_NAME_LEN: usize = 256;
pub const MAX_PLATE_LEN: usize = 32;
pub const MAX_MILEAGE: u64 = 10_000_000;
/// Highest daily rate a car can carry, in whole currency units.
pub const MAX_DAILY_RATE: i64 = 1_000_000;

/// How long a single attempt waits for a car's write lock.
pub const CAR_LOCK_WAIT_MS: u64 = 2_000;
/// Attempts before a busy car surfaces as a conflict.
pub const CAR_LOCK_ATTEMPTS: u32 = 3;
