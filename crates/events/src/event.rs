use chrono::{DateTime, Utc};

/// An immutable fact about a record, named and versioned for the activity log.
pub trait Event: Clone + core::fmt::Debug + Send + Sync + 'static {
    /// Dotted name, e.g. `"enrollment.approved"`.
    fn event_type(&self) -> &'static str;

    /// Payload schema version; bump when the serialized shape changes.
    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc>;
}
