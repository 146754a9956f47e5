//! Test-user enforcement for `opscheck users enforce`.
//!
//! Configured test users must exist, be active and carry the configured role
//! and tenant. Users are created or updated, never deleted.

use std::collections::BTreeSet;
use std::time::Instant;

use anyhow::{Context, Result};
use rusqlite::{OptionalExtension, params};
use tracing::{debug, info, instrument, warn};

use crate::core::record::ResultRecord;
use crate::io::config::TestUser;
use crate::io::db::Database;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnforceMode {
    /// Create missing users and repair divergent ones.
    Apply,
    /// Report what `Apply` would change.
    DryRun,
}

/// Name of the trailing record listing test users missing from the config.
pub const UNCONFIGURED_RECORD: &str = "unconfigured test users";

#[derive(Debug)]
struct StoredUser {
    id: i64,
    role: String,
    tenant_id: Option<i64>,
    is_active: bool,
    is_test_user: bool,
}

/// One record per configured user, then one for unconfigured test users.
#[instrument(skip_all, fields(users = users.len(), mode = ?mode))]
pub fn enforce_test_users(db: &Database, users: &[TestUser], mode: EnforceMode) -> Vec<ResultRecord> {
    let mut records = Vec::with_capacity(users.len() + 1);
    for user in users {
        let started = Instant::now();
        let record = match enforce_one(db, user, mode) {
            Ok(record) => record,
            Err(err) => {
                warn!(email = %user.email, err = %format!("{err:#}"), "test user enforcement failed");
                ResultRecord::fail(&user.email).with_detail(format!("{err:#}"))
            }
        };
        records.push(record.with_duration(started.elapsed()));
    }

    let started = Instant::now();
    let configured: BTreeSet<&str> = users.iter().map(|user| user.email.as_str()).collect();
    let record = match unconfigured_test_users(db, &configured) {
        Ok(extra) if extra.is_empty() => ResultRecord::pass(UNCONFIGURED_RECORD),
        Ok(extra) => ResultRecord::warn(UNCONFIGURED_RECORD).with_detail(extra.join(", ")),
        Err(err) => ResultRecord::fail(UNCONFIGURED_RECORD).with_detail(format!("{err:#}")),
    };
    records.push(record.critical(false).with_duration(started.elapsed()));
    records
}

fn enforce_one(db: &Database, user: &TestUser, mode: EnforceMode) -> Result<ResultRecord> {
    let conn = db.connection();
    let tenant_id: Option<i64> = conn
        .query_row(
            "SELECT id FROM tenants WHERE slug = ?1",
            params![user.tenant],
            |row| row.get(0),
        )
        .optional()
        .with_context(|| format!("look up tenant {}", user.tenant))?;
    let Some(tenant_id) = tenant_id else {
        return Ok(ResultRecord::fail(&user.email)
            .with_detail(format!("tenant {} does not exist", user.tenant)));
    };

    let Some(stored) = load_user(db, &user.email)? else {
        return Ok(match mode {
            EnforceMode::DryRun => ResultRecord::fail(&user.email).with_detail("missing"),
            EnforceMode::Apply => {
                conn.execute(
                    "INSERT INTO users (email, role, tenant_id, is_active, is_test_user)
                     VALUES (?1, ?2, ?3, 1, 1)",
                    params![user.email, user.role, tenant_id],
                )
                .with_context(|| format!("create user {}", user.email))?;
                info!(email = %user.email, "test user created");
                ResultRecord::pass(&user.email)
                    .with_detail(format!("created as {} in {}", user.role, user.tenant))
            }
        });
    };

    let drift = drift(&stored, user, tenant_id);
    if drift.is_empty() {
        debug!(email = %user.email, "test user in place");
        return Ok(ResultRecord::pass(&user.email).with_detail("in place"));
    }
    let summary = drift.join(", ");
    Ok(match mode {
        EnforceMode::DryRun => {
            ResultRecord::warn(&user.email).with_detail(format!("would update: {summary}"))
        }
        EnforceMode::Apply => {
            conn.execute(
                "UPDATE users SET role = ?1, tenant_id = ?2, is_active = 1, is_test_user = 1
                 WHERE id = ?3",
                params![user.role, tenant_id, stored.id],
            )
            .with_context(|| format!("update user {}", user.email))?;
            info!(email = %user.email, %summary, "test user updated");
            ResultRecord::pass(&user.email).with_detail(format!("updated: {summary}"))
        }
    })
}

fn load_user(db: &Database, email: &str) -> Result<Option<StoredUser>> {
    db.connection()
        .query_row(
            "SELECT id, role, tenant_id, is_active, is_test_user FROM users WHERE email = ?1",
            params![email],
            |row| {
                Ok(StoredUser {
                    id: row.get(0)?,
                    role: row.get(1)?,
                    tenant_id: row.get(2)?,
                    is_active: row.get(3)?,
                    is_test_user: row.get(4)?,
                })
            },
        )
        .optional()
        .with_context(|| format!("look up user {email}"))
}

fn drift(stored: &StoredUser, user: &TestUser, tenant_id: i64) -> Vec<String> {
    let mut drift = Vec::new();
    if stored.role != user.role {
        drift.push(format!("role {} -> {}", stored.role, user.role));
    }
    if stored.tenant_id != Some(tenant_id) {
        drift.push(format!("tenant -> {}", user.tenant));
    }
    if !stored.is_active {
        drift.push("reactivate".to_string());
    }
    if !stored.is_test_user {
        drift.push("mark as test user".to_string());
    }
    drift
}

fn unconfigured_test_users(db: &Database, configured: &BTreeSet<&str>) -> Result<Vec<String>> {
    let conn = db.connection();
    let mut stmt = conn
        .prepare("SELECT email FROM users WHERE is_test_user = 1 ORDER BY email")
        .context("prepare test user listing")?;
    let emails = stmt
        .query_map([], |row| row.get::<_, String>(0))
        .context("list test users")?;
    let mut extra = Vec::new();
    for email in emails {
        let email = email.context("read test user row")?;
        if !configured.contains(email.as_str()) {
            extra.push(email);
        }
    }
    Ok(extra)
}
