//! Operational verification checks for the RUR2 compliance platform.
//!
//! Each command runs a fixed list of checks, prints a report and exits with
//! `exit_codes::OK` unless a critical check failed.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use chrono::Utc;
use clap::{Args, Parser, Subcommand, ValueEnum};
use colored::Colorize;

use opscheck::core::record::ResultRecord;
use opscheck::exit_codes;
use opscheck::flags::toggle;
use opscheck::io::checklist::{discover_checklists, resolve_checklist};
use opscheck::io::config::{DEFAULT_CONFIG_PATH, OpsConfig, load_config};
use opscheck::io::db::Database;
use opscheck::io::flag_service::{FlagService, HttpFlagService, SqlFlagService};
use opscheck::io::http::HttpProbe;
use opscheck::io::report::print_report;
use opscheck::io::results::{RunReport, file_sha256, load_history, write_run_report};
use opscheck::lint::lint;
use opscheck::logging;
use opscheck::storage::{provider_status, render_env_template};
use opscheck::suite::{run_suite, select_phases};
use opscheck::users::{EnforceMode, enforce_test_users};
use opscheck::verify::{CheckContext, Collaborator, run_checklist};

#[derive(Parser)]
#[command(
    name = "opscheck",
    version,
    about = "Operational verification checks for the RUR2 platform"
)]
struct Cli {
    /// Config file; relative paths resolve against --root.
    #[arg(long, global = true, env = "OPSCHECK_CONFIG")]
    config: Option<PathBuf>,
    /// Project root that checks, commands and paths resolve against.
    #[arg(long, global = true, default_value = ".")]
    root: PathBuf,
    /// Print a JSON report instead of the terminal report.
    #[arg(long, global = true)]
    json: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run a checklist by id or path.
    Verify {
        checklist: String,
        /// Do not persist the run report.
        #[arg(long)]
        no_save: bool,
    },
    /// List checklists in the checklists directory.
    List,
    /// Summarize persisted runs of a checklist or command.
    History { scope: String },
    /// List or toggle feature flags.
    Flags {
        #[command(subcommand)]
        action: FlagsCommand,
    },
    /// Manage configured test users.
    Users {
        #[command(subcommand)]
        action: UsersCommand,
    },
    /// Check file names and forbidden terms against naming rules.
    Lint,
    /// Cloud-storage provider setup.
    Storage {
        #[command(subcommand)]
        action: StorageCommand,
    },
    /// Run the configured test-suite phases in order.
    Suite {
        /// Only phases marked `quick`.
        #[arg(long)]
        quick: bool,
    },
}

#[derive(Subcommand)]
enum FlagsCommand {
    List {
        #[command(flatten)]
        target: FlagTarget,
    },
    Enable {
        #[arg(required = true)]
        names: Vec<String>,
        #[command(flatten)]
        target: FlagTarget,
    },
    Disable {
        #[arg(required = true)]
        names: Vec<String>,
        #[command(flatten)]
        target: FlagTarget,
    },
}

#[derive(Args)]
struct FlagTarget {
    /// Scope to one tenant instead of the global flag.
    #[arg(long)]
    tenant: Option<String>,
    #[arg(long, value_enum, default_value_t = Backend::Http)]
    backend: Backend,
}

#[derive(Clone, Copy, ValueEnum)]
enum Backend {
    /// The application's `/api/feature-flags` endpoint.
    Http,
    /// The `feature_flags` table.
    Sql,
}

#[derive(Subcommand)]
enum UsersCommand {
    /// Create or repair configured test users.
    Enforce {
        /// Report changes without writing.
        #[arg(long)]
        dry_run: bool,
    },
}

#[derive(Subcommand)]
enum StorageCommand {
    /// Check provider credentials and server registration.
    Status {
        /// Skip the server probe.
        #[arg(long)]
        offline: bool,
    },
    /// Print an `.env` snippet with provider variables and callback URLs.
    Env,
}

/// Resolved CLI environment shared by every command.
struct App {
    root: PathBuf,
    cfg: OpsConfig,
    json: bool,
}

fn main() {
    logging::init();
    let code = match run() {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{err:#}");
            exit_codes::INVALID
        }
    };
    std::process::exit(code);
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    let config_path = resolve(
        &cli.root,
        cli.config
            .as_deref()
            .unwrap_or(Path::new(DEFAULT_CONFIG_PATH)),
    );
    let cfg = load_config(&config_path)
        .with_context(|| format!("load config {}", config_path.display()))?;
    let app = App {
        root: cli.root,
        cfg,
        json: cli.json,
    };

    match cli.command {
        Command::Verify { checklist, no_save } => cmd_verify(&app, &checklist, !no_save),
        Command::List => cmd_list(&app),
        Command::History { scope } => cmd_history(&app, &scope),
        Command::Flags { action } => cmd_flags(&app, action),
        Command::Users {
            action: UsersCommand::Enforce { dry_run },
        } => {
            let db = open_database(&app.cfg)?;
            let mode = if dry_run {
                EnforceMode::DryRun
            } else {
                EnforceMode::Apply
            };
            let started = Utc::now();
            let records = enforce_test_users(&db, &app.cfg.test_users, mode);
            finish(&app, "users", "Test users", started, records, None, true)
        }
        Command::Lint => {
            let started = Utc::now();
            let records = lint(&app.root, &app.cfg.naming)?;
            finish(&app, "lint", "Naming conventions", started, records, None, true)
        }
        Command::Storage { action } => cmd_storage(&app, action),
        Command::Suite { quick } => {
            let phases = select_phases(&app.cfg.suite.phases, quick);
            if phases.is_empty() {
                bail!("no suite phases selected (quick = {quick})");
            }
            let started = Utc::now();
            let records = run_suite(&phases, &app.root, app.cfg.command_limits());
            finish(&app, "suite", "Test suite", started, records, None, true)
        }
    }
}

fn cmd_verify(app: &App, id_or_path: &str, save: bool) -> Result<i32> {
    let checklists_dir = resolve(&app.root, &app.cfg.checklists_dir);
    let (path, checklist) = resolve_checklist(&checklists_dir, id_or_path)?;
    let source_hash = file_sha256(&path)?;

    let ctx = CheckContext {
        root: app.root.clone(),
        http: Collaborator::from_result(HttpProbe::new(
            &app.cfg.server.base_url,
            app.cfg.server_timeout(),
        )),
        db: Collaborator::from_result(Database::from_env(&app.cfg.database.url_env)),
        limits: app.cfg.command_limits(),
    };

    let started = Utc::now();
    let records = run_checklist(&checklist, &ctx);
    let title = if checklist.checklist.title.is_empty() {
        checklist.checklist.id.as_str()
    } else {
        checklist.checklist.title.as_str()
    };
    finish(
        app,
        &checklist.checklist.id,
        title,
        started,
        records,
        Some(source_hash),
        save,
    )
}

fn cmd_list(app: &App) -> Result<i32> {
    let checklists_dir = resolve(&app.root, &app.cfg.checklists_dir);
    let checklists = discover_checklists(&checklists_dir)?;
    if checklists.is_empty() {
        println!("no checklists in {}", checklists_dir.display());
    }
    for (path, checklist) in &checklists {
        println!(
            "{:<24} {:>3} checks  {}  ({})",
            checklist.checklist.id.bold(),
            checklist.checks.len(),
            checklist.checklist.title,
            path.display()
        );
    }
    Ok(exit_codes::OK)
}

fn cmd_history(app: &App, scope: &str) -> Result<i32> {
    let results_dir = resolve(&app.root, &app.cfg.results_dir);
    let (history, warnings) = load_history(&results_dir, scope)?;
    for warning in &warnings {
        eprintln!("{}", warning.yellow());
    }
    if app.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&history).context("serialize history")?
        );
        return Ok(exit_codes::OK);
    }
    println!("{}", scope.bold());
    println!(
        "{} run(s), {} clean, last {}",
        history.runs,
        history.clean_runs,
        history.last_run_id.as_deref().unwrap_or("-")
    );
    for (name, (passed, total)) in &history.check_pass_rates {
        println!("  {passed:>3}/{total:<3} {name}");
    }
    Ok(exit_codes::OK)
}

fn cmd_flags(app: &App, action: FlagsCommand) -> Result<i32> {
    let (names, target, enabled) = match action {
        FlagsCommand::List { target } => {
            return with_flag_service(&app.cfg, target.backend, |service| {
                let flags = service.list(target.tenant.as_deref())?;
                if app.json {
                    println!(
                        "{}",
                        serde_json::to_string_pretty(&flags).context("serialize flags")?
                    );
                } else {
                    for flag in &flags {
                        let state = if flag.enabled {
                            "on".green()
                        } else {
                            "off".red()
                        };
                        println!(
                            "{:<32} {:<3} {}",
                            flag.name,
                            state,
                            flag.tenant_id.as_deref().unwrap_or("(global)")
                        );
                    }
                }
                Ok(exit_codes::OK)
            });
        }
        FlagsCommand::Enable { names, target } => (names, target, true),
        FlagsCommand::Disable { names, target } => (names, target, false),
    };
    with_flag_service(&app.cfg, target.backend, |service| {
        let started = Utc::now();
        let records = toggle(service, &names, target.tenant.as_deref(), enabled);
        finish(app, "flags", "Feature flags", started, records, None, true)
    })
}

fn with_flag_service<T>(
    cfg: &OpsConfig,
    backend: Backend,
    f: impl FnOnce(&dyn FlagService) -> Result<T>,
) -> Result<T> {
    match backend {
        Backend::Http => {
            let probe = HttpProbe::new(&cfg.server.base_url, cfg.server_timeout())?;
            f(&HttpFlagService::new(&probe))
        }
        Backend::Sql => {
            let db = open_database(cfg)?;
            f(&SqlFlagService::new(&db))
        }
    }
}

fn cmd_storage(app: &App, action: StorageCommand) -> Result<i32> {
    match action {
        StorageCommand::Status { offline } => {
            let probe = if offline {
                None
            } else {
                Some(HttpProbe::new(
                    &app.cfg.server.base_url,
                    app.cfg.server_timeout(),
                )?)
            };
            let started = Utc::now();
            let records = provider_status(
                &app.cfg.storage.providers,
                |var| std::env::var(var).ok(),
                probe.as_ref(),
            );
            finish(app, "storage", "Cloud storage providers", started, records, None, true)
        }
        StorageCommand::Env => {
            print!(
                "{}",
                render_env_template(&app.cfg.storage.providers, &app.cfg.server.base_url)?
            );
            Ok(exit_codes::OK)
        }
    }
}

/// Print the report, persist it and return the exit code it implies.
fn finish(
    app: &App,
    scope: &str,
    title: &str,
    started: chrono::DateTime<Utc>,
    records: Vec<ResultRecord>,
    source_hash: Option<String>,
    save: bool,
) -> Result<i32> {
    let rounding = app.cfg.report.rounding;
    let mut report = RunReport::new(scope, title, started, Utc::now(), records, rounding);
    if let Some(hash) = source_hash {
        report = report.with_source_hash(hash);
    }

    if app.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&report).context("serialize run report")?
        );
    } else {
        print_report(title, &report.records, rounding)?;
    }

    if save {
        let results_dir = resolve(&app.root, &app.cfg.results_dir);
        let path = write_run_report(&results_dir, &report)?;
        if !app.json {
            println!("{}", format!("report: {}", path.display()).dimmed());
        }
    }
    Ok(report.exit_code)
}

fn open_database(cfg: &OpsConfig) -> Result<Database> {
    Database::from_env(&cfg.database.url_env)
}

fn resolve(root: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        root.join(path)
    }
}
