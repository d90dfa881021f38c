use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{Shell, generate};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tiergate_autonomy::DecisionGate;
use tiergate_config::{ConfigLoader, GateConfig, WarningSeverity};
use tiergate_core::{GateError, PermissionTier};

use crate::protocol::EvaluationRequest;
use crate::state::{AuditLog, StateStore};

mod run;
mod setup;

/// Tiered-autonomy permission and risk gate for automated trading signals
#[derive(Parser)]
#[command(name = "tiergate", version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to tiergate.toml config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log level override (e.g. debug, info, warn, error)
    #[arg(short, long, global = true)]
    log_level: Option<String>,

    /// Enable verbose output (debug logging)
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    verbose: bool,

    /// Suppress all log output (errors only)
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Evaluate one request document and print the decision as JSON
    Evaluate {
        /// Account to evaluate (overrides `account_id` in the request)
        #[arg(short, long)]
        account: Option<String>,
        /// Request file; reads stdin when omitted
        #[arg(short, long)]
        input: Option<PathBuf>,
    },
    /// Serve JSON-lines requests on stdin, one decision per line on stdout
    Run,
    /// Show an account's current tier
    Tier {
        account: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Set an account's tier by hand (the only way out of T0)
    Override {
        account: String,
        /// Target tier number, 0-5
        tier: u8,
        /// Who is making the change
        #[arg(long)]
        operator: String,
        /// Why
        #[arg(long)]
        reason: String,
    },
    /// Print the tier table
    Tiers {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show current configuration
    Config {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Validate configuration and persisted state
    Doctor,
    /// Initialize a new tiergate.toml in the current or home directory
    Init {
        /// Create in current directory instead of ~/.tiergate/
        #[arg(long)]
        local: bool,
    },
    /// Generate shell completions for bash, zsh, or fish
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
    /// Show version and build info
    Version,
}

impl Cli {
    pub async fn run(self) -> tiergate_core::Result<()> {
        // Load config first so we can use it for log format
        let config_loader = ConfigLoader::load(self.config.as_deref())?;
        let config = config_loader.get();

        // Resolve log level: --verbose > --quiet > --log-level > config
        let log_level = if self.verbose {
            "debug"
        } else if self.quiet {
            "error"
        } else {
            self.log_level.as_deref().unwrap_or(config.logging.level.as_str())
        };
        init_tracing(log_level, &config.logging.format);

        match self.command {
            Commands::Evaluate { account, input } => {
                Self::cmd_evaluate(&config, account.as_deref(), input.as_deref())
            }
            Commands::Run => run::cmd_run(config, config_loader).await,
            Commands::Tier { account, json } => Self::cmd_tier(&config, &account, json),
            Commands::Override {
                account,
                tier,
                operator,
                reason,
            } => Self::cmd_override(&config, &account, tier, &operator, &reason),
            Commands::Tiers { json } => Self::cmd_tiers(&config, json),
            Commands::Config { json } => Self::cmd_config(&config, json),
            Commands::Doctor => Self::cmd_doctor(&config, config_loader.path()),
            Commands::Init { local } => setup::cmd_init(local),
            Commands::Completions { shell } => Self::cmd_completions(shell),
            Commands::Version => Self::cmd_version(),
        }
    }

    fn cmd_evaluate(
        config: &GateConfig,
        account: Option<&str>,
        input: Option<&Path>,
    ) -> tiergate_core::Result<()> {
        let raw = match input {
            Some(path) => std::fs::read_to_string(path)?,
            None => std::io::read_to_string(std::io::stdin())?,
        };
        let request = EvaluationRequest::parse(&raw)?;
        let account_id = request.resolve_account(account)?;

        let host = Host::open(config)?;
        let decision = host.gate.evaluate(
            &account_id,
            &request.proposal,
            &request.account,
            &request.performance,
        )?;
        host.commit()?;

        println!("{}", serde_json::to_string_pretty(&decision)?);
        Ok(())
    }

    fn cmd_tier(config: &GateConfig, account: &str, json: bool) -> tiergate_core::Result<()> {
        let host = Host::open(config)?;
        let tier = host.gate.current_tier(account);
        let row = host.gate.export().into_iter().find(|r| r.account_id == account);

        if json {
            let value = serde_json::json!({
                "account_id": account,
                "tier": tier,
                "name": tier.name(),
                "known": row.is_some(),
                "updated_at": row.as_ref().map(|r| r.updated_at),
                "reason": row.as_ref().map(|r| r.reason.clone()),
            });
            println!("{}", serde_json::to_string_pretty(&value)?);
            return Ok(());
        }

        println!("{account}: {tier}");
        println!("   {}", tier.description());
        match row {
            Some(r) => println!("   Since {} ({})", r.updated_at.to_rfc3339(), r.reason),
            None => println!("   Not seen yet; new accounts start here"),
        }
        Ok(())
    }

    fn cmd_override(
        config: &GateConfig,
        account: &str,
        tier: u8,
        operator: &str,
        reason: &str,
    ) -> tiergate_core::Result<()> {
        let target = PermissionTier::try_from(tier)?;
        let host = Host::open(config)?;
        let transition = host.gate.manual_override(account, target, operator, reason)?;
        host.commit()?;

        println!(
            "✅ {}: {} -> {} by {}",
            account, transition.from, transition.to, operator
        );
        Ok(())
    }

    fn cmd_tiers(config: &GateConfig, json: bool) -> tiergate_core::Result<()> {
        let catalog = &config.catalog;
        if json {
            println!("{}", serde_json::to_string_pretty(&catalog.tiers)?);
            return Ok(());
        }

        println!(
            "{:<18} {:>9} {:>9} {:>11} {:>12}",
            "Tier", "Size", "Leverage", "Confidence", "Trades/day"
        );
        println!("{}", "-".repeat(63));
        for tier in PermissionTier::ALL {
            let t = catalog.tier_limits(tier)?;
            let trades = t
                .max_daily_trades
                .map(|n| n.to_string())
                .unwrap_or_else(|| "unbounded".into());
            println!(
                "{:<18} {:>8.1}% {:>8}x {:>11.2} {:>12}",
                tier.to_string(),
                t.max_position_pct * 100.0,
                t.max_leverage,
                t.confidence_threshold,
                trades
            );
        }
        println!();
        println!(
            "New accounts start at {}. Absolute leverage ceiling {}x.",
            catalog.initial_tier, catalog.hard.max_leverage
        );
        Ok(())
    }

    fn cmd_config(config: &GateConfig, json: bool) -> tiergate_core::Result<()> {
        if json {
            println!("{}", serde_json::to_string_pretty(config)?);
        } else {
            println!(
                "{}",
                toml::to_string_pretty(config).map_err(|e| GateError::Config(e.to_string()))?
            );
        }
        Ok(())
    }

    fn cmd_doctor(config: &GateConfig, config_path: &Path) -> tiergate_core::Result<()> {
        println!("🩺 tiergate doctor");
        println!("   Config: {}", config_path.display());
        println!();

        // Run structured validation
        let warnings = match config.validate() {
            Ok(w) => w,
            Err(e) => {
                println!("{e}");
                return Ok(());
            }
        };

        let mut warn_count = 0;
        let mut info_count = 0;

        for w in &warnings {
            println!("  {w}");
            match w.severity {
                WarningSeverity::Warning => warn_count += 1,
                WarningSeverity::Info => info_count += 1,
                WarningSeverity::Error => {}
            }
        }

        // State and audit files are outside config validation
        let mut error_count = 0;
        let store = StateStore::new(&config.state.path);
        match store.load() {
            Ok(rows) => {
                let protected = rows
                    .iter()
                    .filter(|r| r.tier == PermissionTier::Protection)
                    .count();
                println!("  ✅ state: {} accounts, {} in protection mode", rows.len(), protected);
            }
            Err(e) => {
                println!("  ❌ state: {e}");
                error_count += 1;
            }
        }

        if let Some(ref audit) = config.state.audit_log {
            match AuditLog::open(audit) {
                Ok(_) => println!("  ✅ audit log: {}", audit.display()),
                Err(e) => {
                    println!("  ❌ audit log {}: {e}", audit.display());
                    error_count += 1;
                }
            }
        } else {
            println!("  💡 state.audit_log: not set; tier changes are only logged");
            info_count += 1;
        }

        println!();
        println!(
            "  {error_count} errors, ⚠️  {warn_count} warnings, 💡 {info_count} suggestions"
        );
        Ok(())
    }

    fn cmd_version() -> tiergate_core::Result<()> {
        println!("tiergate v{}", env!("CARGO_PKG_VERSION"));
        println!("   Target: {}", std::env::consts::ARCH);
        println!("   OS: {}", std::env::consts::OS);
        #[cfg(debug_assertions)]
        println!("   Profile: debug");
        #[cfg(not(debug_assertions))]
        println!("   Profile: release");
        Ok(())
    }

    fn cmd_completions(shell: Shell) -> tiergate_core::Result<()> {
        let mut cmd = Cli::command();
        generate(shell, &mut cmd, "tiergate", &mut std::io::stdout());
        Ok(())
    }
}

/// Logs go to stderr; stdout carries decisions.
fn init_tracing(level: &str, format: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    match format {
        "json" => builder.json().with_target(true).init(),
        "compact" => builder.compact().with_target(false).init(),
        _ => builder.with_target(false).init(),
    }
}

/// A gate restored from the state file, plus what it takes to persist it.
struct Host {
    gate: Arc<DecisionGate>,
    store: StateStore,
    audit: Option<(AuditLog, tokio::sync::broadcast::Receiver<tiergate_core::GateEvent>)>,
}

impl Host {
    fn open(config: &GateConfig) -> tiergate_core::Result<Self> {
        let gate = Arc::new(DecisionGate::new(config.catalog.clone())?);
        let store = StateStore::new(&config.state.path);
        gate.restore(store.load()?);

        let audit = match config.state.audit_log {
            Some(ref path) => Some((AuditLog::open(path)?, gate.subscribe())),
            None => None,
        };
        Ok(Self { gate, store, audit })
    }

    /// Persist tiers and flush queued events.
    fn commit(self) -> tiergate_core::Result<()> {
        self.store.save(&self.gate.export())?;
        if let Some((mut log, mut rx)) = self.audit {
            log.drain(&mut rx)?;
        }
        Ok(())
    }
}
