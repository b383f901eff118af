//! schemalens CLI - Crawl external database catalogs into a local metadata store
//!
//! Usage:
//!   schemalens profile add <name>
//!   schemalens profile list [--owner <owner>]
//!   schemalens sync <profile-id>
//!   schemalens summary <profile-id>
//!
//! Examples:
//!   schemalens profile add shop
//!   schemalens profile add adhoc --from-env --owner alice
//!   schemalens sync 1
//!   schemalens diagram 1 --rebuild
//!   schemalens describe column 12 "Customer email, unique per account"

use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use tracing::debug;

use schemalens::config::{ConnectParams, Settings};
use schemalens::connection::PgConnector;
use schemalens::search::DEFAULT_SEARCH_LIMIT;
use schemalens::service::{DescriptionTarget, MetadataService, Outcome};
use schemalens::store::{ColumnId, MetadataStore, NewProfile, ProfileId, TableId};

#[derive(Parser)]
#[command(name = "schemalens")]
#[command(about = "schemalens - Crawl external database catalogs into a local metadata store")]
#[command(version)]
struct Cli {
    /// Log debug output (overridden by RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage connection profiles
    Profile {
        #[command(subcommand)]
        action: ProfileAction,
    },

    /// Open a connection and run a trivial query
    Test { profile: i64 },

    /// Reconcile local metadata with the live catalog
    Sync { profile: i64 },

    /// Print the schema summary used for prompt construction
    Summary { profile: i64 },

    /// Print the ER diagram snapshot
    Diagram {
        profile: i64,

        /// Rebuild even if a stored snapshot exists
        #[arg(long)]
        rebuild: bool,
    },

    /// Overwrite a table or column description
    Describe {
        target: TargetArg,
        id: i64,
        text: String,
    },

    /// Search table and column metadata
    Search {
        profile: i64,
        query: String,

        #[arg(short, long, default_value_t = DEFAULT_SEARCH_LIMIT)]
        limit: usize,
    },

    /// Regenerate placeholder embeddings
    Embeddings { profile: i64 },

    /// List column-level relationships
    Relationships { profile: i64 },
}

#[derive(Subcommand)]
enum ProfileAction {
    /// Register a profile declared in the config file
    Add {
        /// Profile name under [profiles.<name>]
        name: String,

        /// Read connection parameters from SCHEMALENS_DB_* instead
        #[arg(long)]
        from_env: bool,

        /// Owner when using --from-env
        #[arg(long, default_value = "local")]
        owner: String,
    },

    /// List registered profiles
    List {
        #[arg(long)]
        owner: Option<String>,
    },

    /// Delete a profile and all derived metadata
    Remove { id: i64 },
}

#[derive(Clone, Copy, ValueEnum)]
enum TargetArg {
    Table,
    Column,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let settings = match Settings::load() {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Error loading settings: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let store = match open_store(&settings) {
        Ok(s) => Arc::new(s),
        Err(message) => {
            eprintln!("{}", message);
            return ExitCode::FAILURE;
        }
    };

    let service = MetadataService::new(store, PgConnector::new(), settings.clone());

    match cli.command {
        Commands::Profile { action } => cmd_profile(&service, &settings, action).await,
        Commands::Test { profile } => emit(&service.test_connection(ProfileId(profile)).await),
        Commands::Sync { profile } => {
            let report = service.run_sync(ProfileId(profile)).await;
            print_json(&report);
            exit_code(report.success)
        }
        Commands::Summary { profile } => emit(&service.get_schema_summary(ProfileId(profile))),
        Commands::Diagram { profile, rebuild } => {
            emit(&service.get_or_build_diagram(ProfileId(profile), rebuild))
        }
        Commands::Describe { target, id, text } => {
            let target = match target {
                TargetArg::Table => DescriptionTarget::Table(TableId(id)),
                TargetArg::Column => DescriptionTarget::Column(ColumnId(id)),
            };
            emit(&service.set_description(target, &text))
        }
        Commands::Search {
            profile,
            query,
            limit,
        } => emit(&service.search(ProfileId(profile), &query, limit)),
        Commands::Embeddings { profile } => emit(&service.update_embeddings(ProfileId(profile))),
        Commands::Relationships { profile } => {
            emit(&service.list_relationships(ProfileId(profile)))
        }
    }
}

fn open_store(settings: &Settings) -> Result<MetadataStore, String> {
    let path = settings
        .store_path()
        .map_err(|e| format!("Error resolving store path: {}", e))?;
    debug!(path = %path.display(), "opening metadata store");
    MetadataStore::open(&path)
        .map_err(|e| format!("Error opening store '{}': {}", path.display(), e))
}

async fn cmd_profile(
    service: &MetadataService<PgConnector>,
    settings: &Settings,
    action: ProfileAction,
) -> ExitCode {
    match action {
        ProfileAction::Add {
            name,
            from_env,
            owner,
        } => {
            let resolved = if from_env {
                ConnectParams::from_env()
                    .map(|params| (owner, params))
                    .map_err(|e| e.to_string())
            } else {
                settings
                    .get_profile(&name)
                    .and_then(|p| Ok((p.owner.clone(), p.to_connect_params()?)))
                    .map_err(|e| e.to_string())
            };

            match resolved {
                Ok((owner, params)) => emit(&service.create_profile(&NewProfile {
                    owner,
                    name,
                    params,
                })),
                Err(e) => {
                    eprintln!("Error resolving profile '{}': {}", name, e);
                    ExitCode::FAILURE
                }
            }
        }
        ProfileAction::List { owner } => emit(&service.list_profiles(owner.as_deref())),
        ProfileAction::Remove { id } => emit(&service.delete_profile(ProfileId(id)).await),
    }
}

fn emit<T: Serialize>(outcome: &Outcome<T>) -> ExitCode {
    print_json(outcome);
    exit_code(outcome.success)
}

fn print_json<T: Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{}", json),
        Err(e) => eprintln!("Error serializing output: {}", e),
    }
}

fn exit_code(success: bool) -> ExitCode {
    if success {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
