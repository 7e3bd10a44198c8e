// Registry persistence and publication output

pub mod store;
pub mod wikitable;

/// Snapshot schema version.
/// Increment when the schema changes in a way that old versions can't read
pub const SNAPSHOT_FORMAT_VERSION: u32 = 1;
