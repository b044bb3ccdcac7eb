//! Resource naming helpers
//!
//! The resource string is the whole contention domain: two requests contend
//! only when their strings are equal. These helpers build the hierarchical
//! names used across the back office (`<kind>:<action>:<id>`); the client
//! itself never parses or validates a resource.

const SEPARATOR: &str = ":";

/// Join arbitrary segments into a resource name
pub fn scoped<I, S>(parts: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    parts
        .into_iter()
        .map(|p| p.as_ref().to_string())
        .collect::<Vec<_>>()
        .join(SEPARATOR)
}

/// Creating a document under a numbering series, e.g. `invoice-series:create:F001`
pub fn series_create(kind: &str, series: &str) -> String {
    scoped([format!("{}-series", kind).as_str(), "create", series])
}

/// Editing one record, e.g. `purchase-order:update:4711`
pub fn record_update(kind: &str, id: &str) -> String {
    scoped([kind, "update", id])
}

/// Sending one record to an external system, e.g. `invoice:submit:sunat:F001-42`
pub fn record_submission(kind: &str, id: &str, target: &str) -> String {
    scoped([kind, "submit", target, id])
}

/// Processing a batch, e.g. `kardex:batch:2024-06`
pub fn batch(kind: &str, batch_id: &str) -> String {
    scoped([kind, "batch", batch_id])
}
