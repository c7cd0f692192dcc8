/// Element whose children form the record sequence of a DBLP dump
pub const ROOT_TAG: &str = "dblp";

/// Commit the session after every N top-level records
pub const COMMIT_INTERVAL: u32 = 100;

/// Progress update interval (tick every N records)
pub const PROGRESS_INTERVAL: u64 = 1000;

/// Anomalies kept in memory for the run summary; later ones are only counted
pub const MAX_RETAINED_ANOMALIES: usize = 10_000;

/// Default SQLite database path
pub const DEFAULT_DATABASE: &str = "dblp.sqlite";
