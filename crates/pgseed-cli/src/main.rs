use std::io::{BufRead, Write};
use std::path::PathBuf;

use anyhow::Result;
use clap::{ArgAction, Parser, Subcommand};
use pgseed_storage::{AppConfig, PgCategorySession, PgFormCatalog, PgPool};
use pgseed_wizard::{category_tree, form_mapping, Console, WizardError};
use tracing::debug;

#[derive(Debug, Parser)]
#[command(name = "pgseed")]
#[command(about = "Interactive wizards for seeding PostgreSQL reference data")]
struct Cli {
    /// YAML file with database and table settings; environment variables override it.
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,
    /// Log to stderr (-v info, -vv debug). RUST_LOG takes precedence.
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Map existing fields onto a form with sequential order_index values.
    MapFields,
    /// Build a category hierarchy depth-first inside one transaction.
    Categories,
    /// Verify that the configured database is reachable.
    Check,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = AppConfig::load(cli.config.as_deref())?;
    debug!(command = ?cli.command, db = %config.database.display_target(), "configuration loaded");
    let mut console = Console::new(std::io::stdin().lock(), std::io::stdout());

    match cli.command {
        Commands::MapFields => map_fields(&config, &mut console).await,
        Commands::Categories => manage_categories(&config, &mut console).await,
        Commands::Check => check(&config, &mut console).await,
    }
}

fn init_tracing(verbose: u8) {
    let fallback = match verbose {
        0 => "warn",
        1 => "warn,pgseed=info",
        _ => "info,pgseed=debug",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| fallback.into()),
        )
        .with_writer(std::io::stderr)
        .init();
}

async fn connect<R: BufRead, W: Write>(
    config: &AppConfig,
    console: &mut Console<R, W>,
) -> Result<PgPool> {
    console.say("\n🔄 Testing database connection...")?;
    match pgseed_storage::connect(&config.database).await {
        Ok(pool) => {
            console.say("✅ Database connected successfully!")?;
            Ok(pool)
        }
        Err(err) => {
            console.say(format!("❌ {err}"))?;
            Err(err.into())
        }
    }
}

async fn map_fields<R: BufRead, W: Write>(
    config: &AppConfig,
    console: &mut Console<R, W>,
) -> Result<()> {
    form_mapping::banner(console)?;
    let pool = connect(config, console).await?;

    let catalog = PgFormCatalog::new(pool.clone(), &config.forms);
    let outcome = form_mapping::run_form_mapping(&catalog, console).await;
    pool.close().await;

    outcome?;
    console.say("\n👋 Goodbye!")?;
    Ok(())
}

async fn manage_categories<R: BufRead, W: Write>(
    config: &AppConfig,
    console: &mut Console<R, W>,
) -> Result<()> {
    category_tree::banner(console)?;
    let pool = connect(config, console).await?;

    let mut session = PgCategorySession::begin(&pool, &config.categories).await?;
    let outcome = category_tree::run_category_session(&mut session, console).await;
    drop(session);
    pool.close().await;

    match outcome {
        Ok(_) | Err(WizardError::InputClosed) => {}
        Err(err) => return Err(err.into()),
    }
    console.say("\nThank you for using Category Manager!")?;
    Ok(())
}

async fn check<R: BufRead, W: Write>(config: &AppConfig, console: &mut Console<R, W>) -> Result<()> {
    console.say(format!(
        "🔄 Testing database connection to {}...",
        config.database.display_target()
    ))?;
    match pgseed_storage::check_connection(&config.database).await {
        Ok(()) => {
            console.say("✅ Database connection successful!")?;
            Ok(())
        }
        Err(err) => {
            console.say(format!("❌ {err}"))?;
            Err(err.into())
        }
    }
}
