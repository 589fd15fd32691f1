//! Lookout CLI
//!
//! Runs monitoring rules and browses the alerts they produced.

mod settings;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::{debug, info, warn, Level};
use tracing_subscriber::FmtSubscriber;
use uuid::Uuid;

use lookout_agents::{build_analyzer, Credentials, EnricherRegistry, JsonFileStore, Persistence};
use lookout_core::{AlertId, Rule, RuleId};
use lookout_runtime::{emit_all, Pipeline, PipelineError};

use crate::settings::Settings;

#[derive(Parser)]
#[command(name = "lookout")]
#[command(author, version, about = "Lookout: rule-driven threat-intel monitoring", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbosity level (0-3)
    #[arg(short, long, default_value = "1", global = true)]
    verbose: u8,

    /// Settings file (default: ./lookout.toml when present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Alert history file, overrides the settings file
    #[arg(long, global = true)]
    store: Option<PathBuf>,

    /// urlscan.io API key (or set URLSCAN_API_KEY env var)
    #[arg(long, env = "URLSCAN_API_KEY", global = true, hide_env_values = true)]
    urlscan_api_key: Option<String>,

    /// AlienVault OTX API key (or set OTX_API_KEY env var)
    #[arg(long, env = "OTX_API_KEY", global = true, hide_env_values = true)]
    otx_api_key: Option<String>,

    /// IPInfo token (or set IPINFO_TOKEN env var)
    #[arg(long, env = "IPINFO_TOKEN", global = true, hide_env_values = true)]
    ipinfo_token: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a rule once and emit an alert if anything new was found
    Search {
        /// Rule definition (TOML)
        rule: PathBuf,

        /// Run even if the rule changed since its last run
        #[arg(short, long)]
        force: bool,
    },

    /// Check a rule definition without running it
    Validate {
        /// Rule definition (TOML)
        rule: PathBuf,
    },

    /// Browse stored alerts
    Alert {
        #[command(subcommand)]
        command: AlertCommands,
    },
}

#[derive(Subcommand)]
enum AlertCommands {
    /// List alerts, newest first
    List {
        /// Only alerts of this rule
        #[arg(short, long)]
        rule: Option<String>,

        /// Maximum number of alerts
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },

    /// Show one alert as JSON
    Get {
        /// Alert id
        id: String,
    },

    /// Delete an alert; its artifacts may alert again on the next run
    Delete {
        /// Alert id
        id: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging
    let log_level = match cli.verbose {
        0 => Level::ERROR,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };

    FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(false)
        .compact()
        .init();

    let mut settings = Settings::load(cli.config.as_deref())?;
    if let Some(store) = &cli.store {
        settings.store.path = store.clone();
    }
    let credentials = settings.credentials(&Credentials {
        urlscan_api_key: cli.urlscan_api_key.clone(),
        otx_api_key: cli.otx_api_key.clone(),
        ipinfo_token: cli.ipinfo_token.clone(),
    });

    match cli.command {
        Commands::Search { rule, force } => {
            run_search(&rule, force, &settings, &credentials).await?;
        }
        Commands::Validate { rule } => {
            let rule = load_rule(&rule)?;
            println!("✅ Rule {} is valid ({})", rule.id, rule.analyzer.name());
        }
        Commands::Alert { command } => {
            let store = JsonFileStore::open(&settings.store.path).await?;
            match command {
                AlertCommands::List { rule, limit } => list_alerts(&store, rule, limit).await?,
                AlertCommands::Get { id } => get_alert(&store, &id).await?,
                AlertCommands::Delete { id } => delete_alert(&store, &id).await?,
            }
        }
    }

    Ok(())
}

fn load_rule(path: &Path) -> Result<Rule> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read rule {}", path.display()))?;
    let rule = Rule::from_toml_str(&content)?;
    rule.validate()
        .with_context(|| format!("Rule {} is invalid", path.display()))?;
    Ok(rule)
}

async fn run_search(
    path: &Path,
    force: bool,
    settings: &Settings,
    credentials: &Credentials,
) -> Result<()> {
    let rule = load_rule(path)?;
    let http = settings.http_config();

    let store = Arc::new(JsonFileStore::open(&settings.store.path).await?);
    let fingerprint = rule.fingerprint();
    if let Some(previous) = store.rule_fingerprint(&rule.id).await? {
        if previous != fingerprint && !force {
            bail!(
                "Rule {} changed since its last run. Use --force to run the new definition",
                rule.id
            );
        }
    }

    let analyzer = build_analyzer(&rule.analyzer, &http, credentials)?;
    let registry = if settings.enrichment.enabled {
        let registry =
            EnricherRegistry::with_defaults(&http, settings.whois_config(), credentials)?;
        debug!(
            "Enrichment covers {:?}",
            registry.kinds().collect::<Vec<_>>()
        );
        registry
    } else {
        info!("Enrichment disabled");
        EnricherRegistry::new()
    };
    let pipeline = Pipeline::new(
        store.clone(),
        Arc::new(registry),
        settings.pipeline_config(),
    );

    let outcome = tokio::select! {
        result = pipeline.run(&rule, analyzer.as_ref()) => result,
        _ = tokio::signal::ctrl_c() => Err(PipelineError::Cancelled),
    };

    let alert = match outcome {
        Ok(alert) => alert,
        Err(e) => {
            warn!("Run of rule {} aborted ({})", rule.id, e.reason_code());
            return Err(anyhow!(e).context(format!("Rule {} aborted", rule.id)));
        }
    };
    store.store_rule_fingerprint(&rule.id, &fingerprint).await?;

    let Some(alert) = alert else {
        println!("No new artifacts for rule {}", rule.id);
        return Ok(());
    };

    let emitters = settings.emitters()?;
    let report = emit_all(&emitters, &alert, &settings.retry.emit_policy()).await;

    println!(
        "✅ Alert {} with {} new artifacts",
        alert.id.map(|id| id.to_string()).unwrap_or_default(),
        alert.len()
    );
    if !report.all_delivered() {
        println!("⚠️  {} of {} emitters failed", report.failed.len(), emitters.len());
    }

    Ok(())
}

async fn list_alerts(store: &JsonFileStore, rule: Option<String>, limit: usize) -> Result<()> {
    let rule_id = rule.map(RuleId);
    let alerts = store.list_alerts(rule_id.as_ref(), limit).await?;

    if alerts.is_empty() {
        println!("No alerts in {}", store.path().display());
        return Ok(());
    }

    for alert in alerts {
        let id = alert.id.map(|id| id.to_string()).unwrap_or_default();
        println!(
            "{}  {}  {:<24} {:>4} artifacts  {}",
            id,
            alert.created_at.format("%Y-%m-%d %H:%M:%S"),
            alert.rule_id,
            alert.len(),
            alert.title
        );
    }

    Ok(())
}

fn parse_alert_id(id: &str) -> Result<AlertId> {
    let id = Uuid::parse_str(id).with_context(|| format!("Invalid alert id: {}", id))?;
    Ok(AlertId(id))
}

async fn get_alert(store: &JsonFileStore, id: &str) -> Result<()> {
    let id = parse_alert_id(id)?;
    let alert = store
        .get_alert(id)
        .await?
        .ok_or_else(|| anyhow!("Alert {} not found", id))?;

    println!("{}", serde_json::to_string_pretty(&alert)?);
    Ok(())
}

async fn delete_alert(store: &JsonFileStore, id: &str) -> Result<()> {
    let id = parse_alert_id(id)?;
    if !store.delete_alert(id).await? {
        bail!("Alert {} not found", id);
    }

    println!("🗑️  Deleted alert {}", id);
    Ok(())
}
