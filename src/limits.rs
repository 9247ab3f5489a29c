/// Free-text notes on a block.
pub const MAX_NOTES_LEN: usize = 2_000;

/// `created_by` actor reference.
pub const MAX_ACTOR_LEN: usize = 256;

/// Blocks a single vehicle may carry on one date.
pub const MAX_BLOCKS_PER_VEHICLE_DAY: usize = 512;

/// Widest date range accepted by calendar range queries (inclusive).
pub const MAX_RANGE_DAYS: i64 = 366;

/// Largest party the availability search will look for.
pub const MAX_PARTY_SIZE: u32 = 500;

/// Longest tour accepted, in minutes.
pub const MAX_DURATION_MINUTES: u32 = 24 * 60;
