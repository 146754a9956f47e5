//! Test-only fixtures: project trees, an in-memory application database and
//! check contexts.

use std::fs;
use std::path::Path;

use tempfile::TempDir;

use crate::io::db::Database;
use crate::io::process::CommandLimits;
use crate::verify::{CheckContext, Collaborator};

/// Subset of the application schema the operational commands touch.
pub const FIXTURE_SCHEMA: &str = "
CREATE TABLE tenants (
    id INTEGER PRIMARY KEY,
    slug TEXT NOT NULL UNIQUE,
    name TEXT NOT NULL
);
CREATE TABLE users (
    id INTEGER PRIMARY KEY,
    email TEXT NOT NULL UNIQUE,
    role TEXT NOT NULL,
    tenant_id INTEGER REFERENCES tenants(id),
    is_active INTEGER NOT NULL DEFAULT 1,
    is_test_user INTEGER NOT NULL DEFAULT 0
);
CREATE TABLE assessments (id INTEGER PRIMARY KEY, tenant_id INTEGER, status TEXT);
CREATE TABLE facility_profiles (id INTEGER PRIMARY KEY, tenant_id INTEGER, name TEXT);
CREATE TABLE intake_forms (id INTEGER PRIMARY KEY, tenant_id INTEGER, rec_categories TEXT);
CREATE TABLE audit_log (id INTEGER PRIMARY KEY, action TEXT, created_at TEXT);
CREATE TABLE consultant_clients (id INTEGER PRIMARY KEY, consultant_id INTEGER, tenant_id INTEGER);
CREATE TABLE licenses (id INTEGER PRIMARY KEY, tenant_id INTEGER, expires_at TEXT);
CREATE TABLE feature_flags (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    tenant_id TEXT,
    enabled INTEGER NOT NULL DEFAULT 0
);
";

/// In-memory database with [`FIXTURE_SCHEMA`] and a `test-tenant` row.
pub fn fixture_database() -> Database {
    let db = Database::in_memory().expect("in-memory database");
    db.execute_batch(FIXTURE_SCHEMA).expect("fixture schema");
    db.execute_batch(
        "INSERT INTO tenants (id, slug, name) VALUES (1, 'test-tenant', 'Test Tenant');",
    )
    .expect("fixture tenant");
    db
}

/// Check context rooted at `root` with a ready database and no HTTP server.
pub fn context_with_db(root: &Path, db: Database) -> CheckContext {
    CheckContext {
        root: root.to_path_buf(),
        http: Collaborator::Unavailable("no server in tests".to_string()),
        db: Collaborator::Ready(db),
        limits: CommandLimits::default(),
    }
}

/// Temporary project root containing `files` (relative path, contents).
pub fn project_dir(files: &[(&str, &str)]) -> TempDir {
    let temp = tempfile::tempdir().expect("tempdir");
    for (path, contents) in files {
        let full = temp.path().join(path);
        if let Some(parent) = full.parent() {
            fs::create_dir_all(parent).expect("create parent dir");
        }
        fs::write(&full, contents).expect("write fixture file");
    }
    temp
}
