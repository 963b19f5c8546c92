// Hard bounds on caller-supplied input and in-memory growth.

/// Longest bookable term, in calendar months.
pub const MAX_DURATION_MONTHS: u32 = 120;

pub const MAX_COMPANY_NAME_LEN: usize = 256;

/// Occupying reservations a single building schedule will index.
pub const MAX_RESERVATIONS_PER_BUILDING: usize = 10_000;

/// Widest window accepted by free/booked window queries, in days.
pub const MAX_QUERY_WINDOW_DAYS: i64 = 3_660;

/// Lower bound on the reconciliation scan cadence.
pub const MIN_SCAN_INTERVAL_SECS: u64 = 1;

/// Upper bound on the payment window, in hours (one year).
pub const MAX_PAYMENT_WINDOW_HOURS: i64 = 8_760;
