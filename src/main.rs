//! Site-Auditor main entry point
//!
//! This is the command-line interface: it plays the external scheduler
//! (`audit`, `batch`) and the operator console (`stop`, `list`, `show`,
//! `dismiss`).

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use site_auditor::checks::{Dismissals, Rule};
use site_auditor::config::{load_config_with_hash, Config};
use site_auditor::output::{format_report, write_report, AuditReport};
use site_auditor::storage::{SqliteStorage, Storage};
use site_auditor::{normalize_url, BatchOutcome, Orchestrator};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

/// Site-Auditor: a resumable website crawl-and-audit engine
#[derive(Parser, Debug)]
#[command(name = "site-auditor")]
#[command(version)]
#[command(about = "Crawl a website and audit every page", long_about = None)]
struct Cli {
    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create an audit and run batches until it finishes
    Audit {
        /// Path to TOML configuration file
        #[arg(value_name = "CONFIG")]
        config: PathBuf,

        /// Root URL of the site
        url: String,

        /// Tenant whose dismissals apply
        #[arg(long)]
        tenant: Option<i64>,
    },

    /// Run a single batch of an existing audit
    Batch {
        #[arg(value_name = "CONFIG")]
        config: PathBuf,

        audit_id: i64,
    },

    /// Ask a running audit to stop after its current page
    Stop {
        #[arg(value_name = "CONFIG")]
        config: PathBuf,

        audit_id: i64,
    },

    /// List every audit in the database, newest first
    List {
        #[arg(value_name = "CONFIG")]
        config: PathBuf,
    },

    /// Print the report of an audit
    Show {
        #[arg(value_name = "CONFIG")]
        config: PathBuf,

        audit_id: i64,

        /// Write the report to a file instead of stdout
        #[arg(long, value_name = "PATH")]
        output: Option<PathBuf>,
    },

    /// Dismiss a rule for one page (or for the whole site, for site rules)
    Dismiss {
        #[arg(value_name = "CONFIG")]
        config: PathBuf,

        #[arg(long)]
        tenant: i64,

        /// Rule name, as listed by `rules`
        rule: String,

        /// Page URL (any URL of the site for site rules)
        url: String,
    },

    /// List the check catalog
    Rules,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    match cli.command {
        Command::Audit {
            config,
            url,
            tenant,
        } => handle_audit(&config, &url, tenant).await,
        Command::Batch { config, audit_id } => handle_batch(&config, audit_id).await,
        Command::Stop { config, audit_id } => handle_stop(&config, audit_id),
        Command::List { config } => handle_list(&config),
        Command::Show {
            config,
            audit_id,
            output,
        } => handle_show(&config, audit_id, output.as_deref()),
        Command::Dismiss {
            config,
            tenant,
            rule,
            url,
        } => handle_dismiss(&config, tenant, &rule, &url),
        Command::Rules => {
            handle_rules();
            Ok(())
        }
    }
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("site_auditor=info,warn"),
            1 => EnvFilter::new("site_auditor=debug,info"),
            2 => EnvFilter::new("site_auditor=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

fn load_config(path: &Path) -> anyhow::Result<Config> {
    let (config, hash) = load_config_with_hash(path)
        .with_context(|| format!("Failed to load configuration from {}", path.display()))?;
    tracing::info!("Configuration loaded from {} (hash: {})", path.display(), hash);
    Ok(config)
}

fn open_storage(config: &Config) -> anyhow::Result<SqliteStorage> {
    let path = Path::new(&config.output.database_path);
    SqliteStorage::new(path).with_context(|| format!("Failed to open database {}", path.display()))
}

fn orchestrator(config: &Config) -> anyhow::Result<Orchestrator<SqliteStorage>> {
    let storage = open_storage(config)?;
    Orchestrator::new(storage, config).context("Failed to set up the auditor")
}

/// Handles `audit`: the built-in scheduler
async fn handle_audit(config_path: &Path, url: &str, tenant: Option<i64>) -> anyhow::Result<()> {
    let config = load_config(config_path)?;
    let mut orchestrator = orchestrator(&config)?;

    let audit_id = orchestrator
        .create_audit(url, tenant)
        .with_context(|| format!("Cannot audit {}", url))?;
    println!("Audit {} created for {}", audit_id, url);

    let status = orchestrator
        .run_to_completion(audit_id)
        .await
        .with_context(|| format!("Audit {} failed", audit_id))?;

    let report = AuditReport::load(orchestrator.storage(), audit_id)?;
    println!("\n{}", format_report(&report));
    tracing::info!("Audit {} finished as {}", audit_id, status);
    Ok(())
}

/// Handles `batch`: one scheduler invocation
async fn handle_batch(config_path: &Path, audit_id: i64) -> anyhow::Result<()> {
    let config = load_config(config_path)?;
    let mut orchestrator = orchestrator(&config)?;

    let outcome = orchestrator
        .run_batch(audit_id)
        .await
        .with_context(|| format!("Batch of audit {} failed", audit_id))?;

    if outcome.needs_another_batch() {
        println!("Audit {}: more work pending, run `batch` again", audit_id);
    } else if let BatchOutcome::Finished(status) = outcome {
        println!("Audit {}: {}", audit_id, status);
    }
    Ok(())
}

fn handle_stop(config_path: &Path, audit_id: i64) -> anyhow::Result<()> {
    let config = load_config(config_path)?;
    let mut orchestrator = orchestrator(&config)?;

    if orchestrator.request_stop(audit_id)? {
        println!("Stop requested for audit {}", audit_id);
    } else {
        println!("Audit {} has already finished", audit_id);
    }
    Ok(())
}

fn handle_list(config_path: &Path) -> anyhow::Result<()> {
    let config = load_config(config_path)?;
    let storage = open_storage(&config)?;

    println!("{:<6} {:<15} {:<7} {:<6} ROOT", "ID", "STATUS", "SCORE", "PAGES");
    for audit in storage.list_audits()? {
        let score = audit
            .overall_score
            .map(|s| s.to_string())
            .unwrap_or_else(|| "-".to_string());
        let marker = if audit.status.needs_batch() { " *" } else { "" };
        println!(
            "{:<6} {:<15} {:<7} {:<6} {}{}",
            audit.id,
            audit.status.to_db_string(),
            score,
            audit.pages_crawled,
            audit.root_url,
            marker
        );
    }
    Ok(())
}

fn handle_show(config_path: &Path, audit_id: i64, output: Option<&Path>) -> anyhow::Result<()> {
    let config = load_config(config_path)?;
    let storage = open_storage(&config)?;

    let report = AuditReport::load(&storage, audit_id)
        .with_context(|| format!("Cannot load audit {}", audit_id))?;

    match output {
        Some(path) => {
            write_report(&report, path)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            println!("Report written to {}", path.display());
        }
        None => print!("{}", format_report(&report)),
    }
    Ok(())
}

fn handle_dismiss(
    config_path: &Path,
    tenant: i64,
    rule_name: &str,
    url: &str,
) -> anyhow::Result<()> {
    let Some(rule) = Rule::from_name(rule_name) else {
        bail!("Unknown rule '{}', see `site-auditor rules`", rule_name);
    };
    let url = normalize_url(url).with_context(|| format!("Invalid URL {}", url))?;
    let target = Dismissals::target_for(rule, &url);

    let config = load_config(config_path)?;
    let mut storage = open_storage(&config)?;
    let id = storage.add_dismissal(tenant, rule.name(), &target, None)?;

    println!(
        "Dismissal {}: {} for {} (tenant {})",
        id,
        rule.name(),
        target,
        tenant
    );
    Ok(())
}

fn handle_rules() {
    println!(
        "{:<30} {:<6} {:<14} {:<12} DESCRIPTION",
        "RULE", "SCOPE", "CATEGORY", "PRIORITY"
    );
    for rule in Rule::all() {
        let definition = rule.definition();
        println!(
            "{:<30} {:<6} {:<14} {:<12} {}",
            definition.name,
            format!("{:?}", definition.scope).to_lowercase(),
            definition.category.to_db_string(),
            definition.priority.to_db_string(),
            definition.passed_name
        );
    }
}
