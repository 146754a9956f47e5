//! Feature flag service adapters.
//!
//! The application exposes flags over HTTP; the same data can also be
//! reached directly in the `feature_flags` table when the server is down.

use anyhow::{Context, Result, bail};
use rusqlite::{OptionalExtension, params};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, instrument};

use crate::core::flags::FeatureFlag;
use crate::io::db::Database;
use crate::io::http::HttpProbe;

/// Endpoint listing and updating flags.
pub const FLAGS_ENDPOINT: &str = "/api/feature-flags";

pub trait FlagService {
    /// Flags visible to `tenant` (global + tenant-scoped), or every flag when `None`.
    fn list(&self, tenant: Option<&str>) -> Result<Vec<FeatureFlag>>;
    /// Create or update one flag and return the stored value.
    fn set(&self, name: &str, tenant: Option<&str>, enabled: bool) -> Result<FeatureFlag>;
}

pub struct HttpFlagService<'a> {
    probe: &'a HttpProbe,
}

impl<'a> HttpFlagService<'a> {
    pub fn new(probe: &'a HttpProbe) -> Self {
        Self { probe }
    }
}

/// The server answers either a bare array or `{ "flags": [...] }`.
#[derive(Deserialize)]
#[serde(untagged)]
enum FlagList {
    Bare(Vec<FeatureFlag>),
    Wrapped { flags: Vec<FeatureFlag> },
}

impl FlagService for HttpFlagService<'_> {
    #[instrument(skip(self))]
    fn list(&self, tenant: Option<&str>) -> Result<Vec<FeatureFlag>> {
        let query: Vec<(&str, &str)> = tenant
            .map(|tenant| ("tenantId", tenant))
            .into_iter()
            .collect();
        let list: FlagList = self
            .probe
            .get_json_with_query(FLAGS_ENDPOINT, &query)
            .context("list feature flags")?;
        Ok(match list {
            FlagList::Bare(flags) | FlagList::Wrapped { flags } => flags,
        })
    }

    #[instrument(skip(self))]
    fn set(&self, name: &str, tenant: Option<&str>, enabled: bool) -> Result<FeatureFlag> {
        let body = json!({ "name": name, "enabled": enabled, "tenantId": tenant });
        self.probe
            .post_json(FLAGS_ENDPOINT, &body)
            .with_context(|| format!("set feature flag {name}"))
    }
}

pub struct SqlFlagService<'a> {
    db: &'a Database,
}

impl<'a> SqlFlagService<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }
}

impl FlagService for SqlFlagService<'_> {
    fn list(&self, tenant: Option<&str>) -> Result<Vec<FeatureFlag>> {
        let conn = self.db.connection();
        let mut stmt = conn
            .prepare(
                "SELECT name, enabled, tenant_id FROM feature_flags
                 WHERE ?1 IS NULL OR tenant_id IS NULL OR tenant_id = ?1
                 ORDER BY name, tenant_id",
            )
            .context("prepare feature flag listing")?;
        let rows = stmt
            .query_map(params![tenant], |row| {
                Ok(FeatureFlag {
                    name: row.get(0)?,
                    enabled: row.get(1)?,
                    tenant_id: row.get(2)?,
                })
            })
            .context("list feature flags")?;
        let mut flags = Vec::new();
        for row in rows {
            flags.push(row.context("read feature flag row")?);
        }
        Ok(flags)
    }

    #[instrument(skip(self))]
    fn set(&self, name: &str, tenant: Option<&str>, enabled: bool) -> Result<FeatureFlag> {
        if name.trim().is_empty() {
            bail!("flag name must be non-empty");
        }
        let conn = self.db.connection();
        let updated = conn
            .execute(
                "UPDATE feature_flags SET enabled = ?1 WHERE name = ?2 AND tenant_id IS ?3",
                params![enabled, name, tenant],
            )
            .with_context(|| format!("update feature flag {name}"))?;
        if updated == 0 {
            conn.execute(
                "INSERT INTO feature_flags (name, tenant_id, enabled) VALUES (?1, ?2, ?3)",
                params![name, tenant, enabled],
            )
            .with_context(|| format!("insert feature flag {name}"))?;
            debug!(name, "feature flag inserted");
        }
        let stored: Option<bool> = conn
            .query_row(
                "SELECT enabled FROM feature_flags WHERE name = ?1 AND tenant_id IS ?2",
                params![name, tenant],
                |row| row.get(0),
            )
            .optional()
            .with_context(|| format!("read back feature flag {name}"))?;
        let Some(enabled) = stored else {
            bail!("feature flag {name} missing after write");
        };
        Ok(FeatureFlag {
            name: name.to_string(),
            enabled,
            tenant_id: tenant.map(str::to_string),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::fixture_database;
    use mockito::{Matcher, Server};
    use std::time::Duration;

    #[test]
    fn sql_set_upserts_global_and_scoped_flags() {
        let db = fixture_database();
        let service = SqlFlagService::new(&db);

        service.set("onboarding_v2", None, false).expect("insert global");
        service.set("onboarding_v2", Some("acme"), true).expect("insert scoped");
        service.set("onboarding_v2", None, true).expect("update global");

        let all = service.list(None).expect("list");
        assert_eq!(all.len(), 2);
        assert!(all.iter().all(|flag| flag.enabled));

        let other = service.list(Some("other")).expect("list");
        assert_eq!(other.len(), 1);
        assert_eq!(other[0].tenant_id, None);
    }

    #[test]
    fn http_list_accepts_wrapped_payload() {
        let mut server = Server::new();
        let mock = server
            .mock("GET", "/api/feature-flags")
            .match_query(Matcher::UrlEncoded("tenantId".into(), "acme corp".into()))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"flags":[{"name":"cloud_storage","enabled":true,"tenantId":"acme corp"}]}"#)
            .create();

        let probe = HttpProbe::new(&server.url(), Duration::from_secs(5)).expect("probe");
        let flags = HttpFlagService::new(&probe)
            .list(Some("acme corp"))
            .expect("list");
        mock.assert();
        assert_eq!(flags.len(), 1);
        assert_eq!(flags[0].tenant_id.as_deref(), Some("acme corp"));
    }

    #[test]
    fn http_set_posts_flag() {
        let mut server = Server::new();
        let mock = server
            .mock("POST", "/api/feature-flags")
            .match_body(Matcher::Json(serde_json::json!({
                "name": "cloud_storage",
                "enabled": true,
                "tenantId": null
            })))
            .with_status(200)
            .with_body(r#"{"name":"cloud_storage","enabled":true}"#)
            .create();

        let probe = HttpProbe::new(&server.url(), Duration::from_secs(5)).expect("probe");
        let flag = HttpFlagService::new(&probe)
            .set("cloud_storage", None, true)
            .expect("set");
        mock.assert();
        assert!(flag.enabled);
    }

    #[test]
    fn http_list_encodes_tenant_query() {
        let mut server = Server::new();
        let mock = server
            .mock("GET", "/api/feature-flags")
            .match_query(Matcher::UrlEncoded("tenantId".into(), "acme&co/1".into()))
            .with_status(200)
            .with_body("[]")
            .create();

        let probe = HttpProbe::new(&server.url(), Duration::from_secs(5)).expect("probe");
        let flags = HttpFlagService::new(&probe)
            .list(Some("acme&co/1"))
            .expect("list");
        mock.assert();
        assert!(flags.is_empty());
    }

    #[test]
    fn http_list_without_tenant_sends_no_query() {
        let mut server = Server::new();
        let mock = server
            .mock("GET", "/api/feature-flags")
            .match_query(Matcher::Missing)
            .with_status(200)
            .with_body(r#"[{"name":"cloud_storage","enabled":false}]"#)
            .create();

        let probe = HttpProbe::new(&server.url(), Duration::from_secs(5)).expect("probe");
        let flags = HttpFlagService::new(&probe).list(None).expect("list");
        mock.assert();
        assert_eq!(flags.len(), 1);
    }
}
