/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

/// Identifier assigned to every launched job (sync or async).
pub type JobId = uuid::Uuid;
