mod codes_cmd;
mod config;
mod export_cmd;
mod import_cmd;
mod plan_cmds;
mod post_cmd;
mod validate_cmd;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use uuid::Uuid;

use arho_db::pool;

use config::ArhoConfig;

#[derive(Parser)]
#[command(
    name = "arho",
    about = "Statutory land-use plan database with Ryhti API exchange"
)]
struct Cli {
    /// Database URL (overrides ARHO_DATABASE_URL env var)
    #[arg(long, global = true)]
    database_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Write an arho config file (no database required)
    Init {
        /// PostgreSQL connection URL
        #[arg(long, default_value = "postgresql://localhost:5432/arho")]
        db_url: String,
        /// Overwrite existing config file
        #[arg(long)]
        force: bool,
    },
    /// Initialize the arho database (creates it and runs migrations)
    DbInit,
    /// Reference code management
    Codes {
        #[command(subcommand)]
        command: CodesCommands,
    },
    /// Plan management
    Plan {
        #[command(subcommand)]
        command: PlanCommands,
    },
    /// Import a plan from a wire-format JSON document
    Import {
        /// Path to the plan JSON file
        file: PathBuf,
        /// Plan name (stored under the "fin" language key)
        #[arg(long)]
        name: String,
        /// Responsible organisation id
        #[arg(long)]
        organisation: Uuid,
        /// Plan type code value (e.g. 11 for a regional plan)
        #[arg(long)]
        plan_type: String,
        /// Permanent plan identifier, when already issued
        #[arg(long)]
        permanent_identifier: Option<String>,
        /// Producer's own plan identifier
        #[arg(long)]
        producers_identifier: Option<String>,
        /// Replace an existing plan with the same key
        #[arg(long)]
        overwrite: bool,
    },
    /// Export a plan as a wire-format JSON document
    Export {
        /// Plan ID to export
        plan_id: Uuid,
        /// Output file path (defaults to stdout)
        #[arg(long)]
        output: Option<PathBuf>,
        /// Export the plan matter instead of the plan document
        #[arg(long)]
        matter: bool,
    },
    /// Validate plans against the national API
    Validate {
        /// Plan ID to validate (omit to validate all plans flagged for export)
        plan_id: Option<Uuid>,
    },
    /// Post plan matters to the national registry
    Post {
        /// Plan ID to post (omit to post all plans flagged for export)
        plan_id: Option<Uuid>,
    },
}

#[derive(Subcommand)]
pub enum CodesCommands {
    /// Load or update reference codes from a seed file
    Load {
        /// Path to the code seed JSON file
        file: PathBuf,
    },
}

#[derive(Subcommand)]
pub enum PlanCommands {
    /// List all plans
    List,
    /// Show a plan's details and lifecycle history
    Status {
        /// Plan ID to show
        plan_id: Uuid,
    },
    /// Move a plan to a new lifecycle status
    SetStatus {
        /// Plan ID to transition
        plan_id: Uuid,
        /// Target lifecycle status code value (e.g. 06)
        status: String,
    },
}

/// Execute the `arho init` command: write config file.
fn cmd_init(db_url: &str, force: bool) -> anyhow::Result<()> {
    let path = config::config_path();

    if path.exists() && !force {
        anyhow::bail!(
            "config file already exists at {}\nUse --force to overwrite.",
            path.display()
        );
    }

    let cfg = config::ConfigFile {
        database: config::DatabaseSection {
            url: db_url.to_string(),
        },
        api: None,
    };

    config::save_config(&cfg)?;

    println!("Config written to {}", path.display());
    println!("  database.url = {db_url}");
    println!();
    println!("Next: run `arho db-init` to create and migrate the database.");
    println!("Add an [api] section to use `arho validate` and `arho post`.");

    Ok(())
}

/// Execute the `arho db-init` command: create database and run migrations.
async fn cmd_db_init(cli_db_url: Option<&str>) -> anyhow::Result<()> {
    let resolved = ArhoConfig::resolve(cli_db_url)?;

    println!("Initializing arho database...");

    pool::ensure_database_exists(&resolved.db_config).await?;
    let db_pool = pool::create_pool(&resolved.db_config).await?;
    pool::run_migrations(&db_pool).await?;

    let counts = pool::table_counts(&db_pool).await?;
    println!("Database ready. Tables:");
    for (table, count) in &counts {
        println!("  {table}: {count} rows");
    }

    db_pool.close().await;

    println!("arho db-init complete.");
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Init { db_url, force } => {
            cmd_init(&db_url, force)?;
        }
        Commands::DbInit => {
            cmd_db_init(cli.database_url.as_deref()).await?;
        }
        Commands::Codes { command } => {
            let resolved = ArhoConfig::resolve(cli.database_url.as_deref())?;
            let db_pool = pool::create_pool(&resolved.db_config).await?;
            let result = match command {
                CodesCommands::Load { file } => codes_cmd::run_codes_load(&db_pool, &file).await,
            };
            db_pool.close().await;
            result?;
        }
        Commands::Plan { command } => {
            let resolved = ArhoConfig::resolve(cli.database_url.as_deref())?;
            let db_pool = pool::create_pool(&resolved.db_config).await?;
            let result = plan_cmds::run_plan_command(command, &db_pool).await;
            db_pool.close().await;
            result?;
        }
        Commands::Import {
            file,
            name,
            organisation,
            plan_type,
            permanent_identifier,
            producers_identifier,
            overwrite,
        } => {
            let resolved = ArhoConfig::resolve(cli.database_url.as_deref())?;
            let db_pool = pool::create_pool(&resolved.db_config).await?;
            let options = import_cmd::ImportOptions {
                file,
                name,
                organisation,
                plan_type,
                permanent_identifier,
                producers_identifier,
                overwrite,
            };
            let result = import_cmd::run_import(&db_pool, options).await;
            db_pool.close().await;
            result?;
        }
        Commands::Export {
            plan_id,
            output,
            matter,
        } => {
            let resolved = ArhoConfig::resolve(cli.database_url.as_deref())?;
            let db_pool = pool::create_pool(&resolved.db_config).await?;
            let result = export_cmd::run_export(&db_pool, plan_id, output.as_deref(), matter).await;
            db_pool.close().await;
            result?;
        }
        Commands::Validate { plan_id } => {
            let resolved = ArhoConfig::resolve(cli.database_url.as_deref())?;
            let api = resolved.api_settings()?;
            let db_pool = pool::create_pool(&resolved.db_config).await?;
            let result = validate_cmd::run_validate(&db_pool, api, plan_id).await;
            db_pool.close().await;
            result?;
        }
        Commands::Post { plan_id } => {
            let resolved = ArhoConfig::resolve(cli.database_url.as_deref())?;
            let api = resolved.api_settings()?;
            let db_pool = pool::create_pool(&resolved.db_config).await?;
            let result = post_cmd::run_post(&db_pool, api, plan_id).await;
            db_pool.close().await;
            result?;
        }
    }

    Ok(())
}
