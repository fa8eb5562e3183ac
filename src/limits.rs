use crate::model::Ms;

const DAY_MS: Ms = 86_400_000;

/// 1970-01-01T00:00:00Z.
pub const MIN_VALID_TIMESTAMP_MS: Ms = 0;
/// 9999-12-31T23:59:59.999Z.
pub const MAX_VALID_TIMESTAMP_MS: Ms = 253_402_300_799_999;

/// Longest single schedule entry.
pub const MAX_SPAN_DURATION_MS: Ms = 366 * DAY_MS;
/// Widest window for an availability listing.
pub const MAX_QUERY_WINDOW_MS: Ms = 366 * DAY_MS;

pub const MAX_RESOURCE_IDS_PER_QUERY: usize = 1024;
pub const MAX_BATCH_SIZE: usize = 1024;
pub const MAX_NAME_LEN: usize = 512;
pub const MAX_NOTE_LEN: usize = 4096;
pub const MAX_ENTRIES_PER_RESOURCE: usize = 1_000_000;
