use std::path::PathBuf;

use clap::{Parser, Subcommand};
use serde_json::Value;
use tracing::{error, info};

use fedplan::config::Config;
use fedplan::state::StateManager;
use fedplan::{registry, Error, LedgerDb, Result};

/// fedplan - federated learning compute plan scheduler over a key/value ledger
#[derive(Parser, Debug)]
#[command(name = "fedplan")]
#[command(version, about, long_about = None)]
#[command(after_help = "ENVIRONMENT:\n    FEDPLAN_DEBUG=1     Enable debug logging (alternative to --debug)")]
pub struct Cli {
    /// Enable debug logging (writes to ~/.fedplan/fedplan.log)
    #[arg(short = 'd', long, global = true)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Run one ledger command as a single transaction
    Invoke {
        /// Command name, e.g. createComputePlan
        function: String,

        /// JSON arguments
        args: Option<String>,

        /// Organisation submitting the transaction
        #[arg(long)]
        creator: Option<String>,

        /// Ledger snapshot to run against
        #[arg(long)]
        state: Option<PathBuf>,
    },

    /// List the available ledger commands
    Functions,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    fedplan::log::init_with_debug(cli.debug);

    match cli.command {
        Command::Functions => {
            for name in registry::function_names() {
                println!("{}", name);
            }
            Ok(())
        }
        Command::Invoke {
            function,
            args,
            creator,
            state,
        } => run_invoke(&function, args.as_deref(), creator, state),
    }
}

/// Load the snapshot, run `function` in one transaction, commit and save on
/// success.
fn run_invoke(
    function: &str,
    args: Option<&str>,
    creator: Option<String>,
    state: Option<PathBuf>,
) -> Result<()> {
    let config = Config::load()?;
    let creator = creator.unwrap_or_else(|| config.effective_creator().to_string());
    let state_path = match state {
        Some(path) => path,
        None => config.effective_state_path()?,
    };

    let mut args: Value = match args {
        Some(raw) => serde_json::from_str(raw)
            .map_err(|e| Error::BadRequest(format!("arguments are not valid JSON: {}", e)))?,
        None => Value::Null,
    };
    if function == "queryComputePlans" {
        if args.is_null() {
            args = serde_json::json!({});
        }
        if let Some(map) = args.as_object_mut() {
            map.entry("pageSize")
                .or_insert_with(|| Value::from(config.effective_page_size()));
        }
    }

    let manager = StateManager::new(&state_path);
    let mut ledger = manager.load(&creator)?;
    ledger.begin(&creator);

    let result = {
        let mut db = LedgerDb::new(&mut ledger);
        registry::invoke(&mut db, function, args)
    };

    match result {
        Ok(response) => {
            ledger.commit();
            manager.save(&ledger)?;
            info!(function, creator = %creator, "transaction committed");
            println!("{}", serde_json::to_string_pretty(&response)?);
            Ok(())
        }
        Err(e) => {
            ledger.rollback();
            error!(function, creator = %creator, error = %e, "transaction failed");
            let output = serde_json::json!({
                "error": e.kind().to_string(),
                "message": e.to_string(),
            });
            eprintln!("{}", serde_json::to_string_pretty(&output)?);
            std::process::exit(1);
        }
    }
}
