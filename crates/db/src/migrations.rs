/// Inline SQL migrations for the snapshot cache schema.
///
/// The schema is one table, so plain inline statements are enough.

pub const MIGRATIONS: &[&str] = &[
    // Migration 1: namespaced key/value snapshots
    r#"
CREATE TABLE IF NOT EXISTS kv_cache (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL,
    updated_at INTEGER NOT NULL
);
"#,
];
