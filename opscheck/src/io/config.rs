//! opscheck configuration stored under `.opscheck/config.toml`.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use serde::{Deserialize, Serialize};

use crate::core::naming::NameCase;
use crate::core::tally::RateRounding;
use crate::io::process::CommandLimits;

/// Default config location relative to the project root.
pub const DEFAULT_CONFIG_PATH: &str = ".opscheck/config.toml";

/// opscheck configuration (TOML).
///
/// Edited by humans. Missing fields default to values that match a local
/// development checkout of the application.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct OpsConfig {
    /// Directory holding checklist `.toml` files.
    pub checklists_dir: PathBuf,
    /// Directory receiving persisted run reports.
    pub results_dir: PathBuf,
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub commands: CommandConfig,
    pub report: ReportConfig,
    pub test_users: Vec<TestUser>,
    pub naming: NamingConfig,
    pub storage: StorageConfig,
    pub suite: SuiteConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ServerConfig {
    pub base_url: String,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Environment variable holding the connection string.
    pub url_env: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CommandConfig {
    pub timeout_secs: u64,
    /// Truncate captured stdout/stderr beyond this many bytes.
    pub output_limit_bytes: usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ReportConfig {
    pub rounding: RateRounding,
}

/// A user that must exist in every environment for manual and automated testing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TestUser {
    pub email: String,
    pub role: String,
    /// Tenant slug.
    pub tenant: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct NamingConfig {
    /// Directories (relative to the project root) that are linted.
    pub roots: Vec<PathBuf>,
    /// Directory names skipped anywhere in the tree.
    pub ignore_dirs: Vec<String>,
    pub rules: Vec<NamingRule>,
    pub forbidden: Vec<ForbiddenTerm>,
}

/// File stems under `dirs` with one of `extensions` must be in `case`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NamingRule {
    pub name: String,
    #[serde(default)]
    pub dirs: Vec<PathBuf>,
    pub extensions: Vec<String>,
    pub case: NameCase,
    #[serde(default)]
    pub critical: bool,
}

/// A regex that must not appear in linted text files.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ForbiddenTerm {
    pub pattern: String,
    pub message: String,
    #[serde(default)]
    pub critical: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct StorageConfig {
    pub providers: Vec<StorageProvider>,
}

/// Cloud-storage integration and the env vars its OAuth app needs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StorageProvider {
    pub id: String,
    pub display_name: String,
    pub env: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SuiteConfig {
    pub phases: Vec<SuitePhase>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SuitePhase {
    pub name: String,
    pub command: Vec<String>,
    /// Included in `suite --quick`.
    #[serde(default)]
    pub quick: bool,
}

impl Default for OpsConfig {
    fn default() -> Self {
        Self {
            checklists_dir: PathBuf::from(".opscheck/checklists"),
            results_dir: PathBuf::from(".opscheck/results"),
            server: ServerConfig::default(),
            database: DatabaseConfig::default(),
            commands: CommandConfig::default(),
            report: ReportConfig::default(),
            test_users: Vec::new(),
            naming: NamingConfig::default(),
            storage: StorageConfig::default(),
            suite: SuiteConfig::default(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:5000".to_string(),
            timeout_secs: 10,
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url_env: "DATABASE_URL".to_string(),
        }
    }
}

impl Default for CommandConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 120,
            output_limit_bytes: 100_000,
        }
    }
}

impl Default for NamingConfig {
    fn default() -> Self {
        Self {
            roots: vec![PathBuf::from("client/src"), PathBuf::from("server")],
            ignore_dirs: ["node_modules", "dist", "build", ".git", "target", "coverage"]
                .into_iter()
                .map(str::to_string)
                .collect(),
            rules: Vec::new(),
            forbidden: Vec::new(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        let provider = |id: &str, display_name: &str, env: &[&str]| StorageProvider {
            id: id.to_string(),
            display_name: display_name.to_string(),
            env: env.iter().map(|var| var.to_string()).collect(),
        };
        Self {
            providers: vec![
                provider(
                    "google_drive",
                    "Google Drive",
                    &["GOOGLE_CLIENT_ID", "GOOGLE_CLIENT_SECRET"],
                ),
                provider(
                    "dropbox",
                    "Dropbox",
                    &["DROPBOX_APP_KEY", "DROPBOX_APP_SECRET"],
                ),
                provider(
                    "onedrive",
                    "OneDrive",
                    &["ONEDRIVE_CLIENT_ID", "ONEDRIVE_CLIENT_SECRET"],
                ),
                provider("box", "Box", &["BOX_CLIENT_ID", "BOX_CLIENT_SECRET"]),
            ],
        }
    }
}

impl Default for SuiteConfig {
    fn default() -> Self {
        let argv = |parts: &[&str]| parts.iter().map(|part| part.to_string()).collect();
        Self {
            phases: vec![
                SuitePhase {
                    name: "unit tests with coverage".to_string(),
                    command: argv(&[
                        "python",
                        "-m",
                        "pytest",
                        "tests/unit/",
                        "--cov=src",
                        "--cov-report=term-missing",
                        "--cov-fail-under=80",
                        "-v",
                    ]),
                    quick: false,
                },
                SuitePhase {
                    name: "integration tests".to_string(),
                    command: argv(&["python", "-m", "pytest", "tests/integration/", "-v"]),
                    quick: false,
                },
                SuitePhase {
                    name: "quick unit tests".to_string(),
                    command: argv(&["python", "-m", "pytest", "tests/unit/", "-x", "--tb=short"]),
                    quick: true,
                },
            ],
        }
    }
}

impl OpsConfig {
    pub fn validate(&self) -> Result<()> {
        if self.server.base_url.trim().is_empty() {
            return Err(anyhow!("server.base_url must be non-empty"));
        }
        if self.server.timeout_secs == 0 {
            return Err(anyhow!("server.timeout_secs must be > 0"));
        }
        if self.database.url_env.trim().is_empty() {
            return Err(anyhow!("database.url_env must be non-empty"));
        }
        if self.commands.timeout_secs == 0 {
            return Err(anyhow!("commands.timeout_secs must be > 0"));
        }
        if self.commands.output_limit_bytes == 0 {
            return Err(anyhow!("commands.output_limit_bytes must be > 0"));
        }
        for (index, user) in self.test_users.iter().enumerate() {
            validate_test_user(user).with_context(|| format!("test_users[{index}] invalid"))?;
        }
        for (index, rule) in self.naming.rules.iter().enumerate() {
            if rule.name.trim().is_empty() || rule.extensions.is_empty() {
                bail!("naming.rules[{index}] needs a name and at least one extension");
            }
        }
        for (index, term) in self.naming.forbidden.iter().enumerate() {
            regex::Regex::new(&term.pattern)
                .with_context(|| format!("naming.forbidden[{index}] pattern invalid"))?;
        }
        let mut provider_ids = BTreeSet::new();
        for provider in &self.storage.providers {
            if provider.id.trim().is_empty() {
                bail!("storage.providers id must be non-empty");
            }
            if !provider_ids.insert(provider.id.as_str()) {
                bail!("duplicate storage provider id {}", provider.id);
            }
        }
        for phase in &self.suite.phases {
            if phase.command.is_empty() || phase.command[0].trim().is_empty() {
                bail!("suite phase '{}' command must be a non-empty array", phase.name);
            }
        }
        Ok(())
    }

    pub fn command_limits(&self) -> CommandLimits {
        CommandLimits {
            timeout: Duration::from_secs(self.commands.timeout_secs),
            output_limit_bytes: self.commands.output_limit_bytes,
        }
    }

    pub fn server_timeout(&self) -> Duration {
        Duration::from_secs(self.server.timeout_secs)
    }
}

fn validate_test_user(user: &TestUser) -> Result<()> {
    let Some((local, domain)) = user.email.split_once('@') else {
        bail!("email {:?} must contain '@'", user.email);
    };
    if local.is_empty() || !domain.contains('.') {
        bail!("email {:?} is not a valid address", user.email);
    }
    if user.role.trim().is_empty() {
        bail!("role must be non-empty for {}", user.email);
    }
    if user.tenant.trim().is_empty() {
        bail!("tenant must be non-empty for {}", user.email);
    }
    Ok(())
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `OpsConfig::default()`.
pub fn load_config(path: &Path) -> Result<OpsConfig> {
    if !path.exists() {
        let cfg = OpsConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: OpsConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()?;
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_missing_returns_default() {
        let temp = tempfile::tempdir().expect("tempdir");
        let cfg = load_config(&temp.path().join("missing.toml")).expect("load");
        assert_eq!(cfg, OpsConfig::default());
        assert_eq!(cfg.storage.providers.len(), 4);
    }

    #[test]
    fn parses_partial_file_with_defaults() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("config.toml");
        fs::write(
            &path,
            r#"
[server]
base_url = "http://127.0.0.1:3000"

[report]
rounding = "floor"

[[naming.rules]]
name = "components are PascalCase"
dirs = ["client/src/components"]
extensions = ["tsx"]
case = "pascal"
"#,
        )
        .expect("write");
        let cfg = load_config(&path).expect("load");
        assert_eq!(cfg.server.base_url, "http://127.0.0.1:3000");
        assert_eq!(cfg.server.timeout_secs, 10);
        assert_eq!(cfg.report.rounding, RateRounding::Floor);
        assert_eq!(cfg.naming.rules[0].case, NameCase::Pascal);
        assert!(!cfg.naming.rules[0].critical);
    }

    #[test]
    fn rejects_invalid_values() {
        let mut cfg = OpsConfig::default();
        cfg.commands.timeout_secs = 0;
        assert!(cfg.validate().is_err());

        let mut cfg = OpsConfig::default();
        cfg.test_users.push(TestUser {
            email: "not-an-email".to_string(),
            role: "admin".to_string(),
            tenant: "t".to_string(),
        });
        let err = cfg.validate().expect_err("bad email");
        assert!(format!("{err:#}").contains("must contain '@'"));

        let mut cfg = OpsConfig::default();
        let duplicate = cfg.storage.providers[0].clone();
        cfg.storage.providers.push(duplicate);
        assert!(cfg.validate().is_err());
    }
}
