use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use autosign::database::repositories::AccountRepository;
use autosign::scheduler::{self, OperatorRegistry};
use autosign::{Error, database};

#[derive(Parser)]
#[command(name = "autosign", version, about = "Automatic daily Tieba check-in")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the daily scheduler loop (default).
    Run,
    /// Run a single refresh + sign pass and exit.
    Once,
    /// Store a new account.
    AddAccount {
        #[arg(long)]
        name: String,
        /// Cookie string in `name=value;name=value` format.
        #[arg(long)]
        cookie: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "autosign=info,tieba_operator=info,sqlx=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load environment variables
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let database_url = std::env::var("DATABASE_URL")
        .unwrap_or_else(|_| "sqlite:autosign.db?mode=rwc".to_string());

    let pool = database::init_pool(&database_url).await?;
    database::prepare_schema(&pool).await?;

    match cli.command.unwrap_or(Command::Run) {
        Command::Run => {
            tracing::info!("starting daily scheduler loop");
            scheduler::run_daily_loop(pool).await;
        }
        Command::Once => {
            let mut registry = OperatorRegistry::new();
            scheduler::run_once(&pool, &mut registry).await;
        }
        Command::AddAccount { name, cookie } => {
            if cookie.trim().is_empty() {
                return Err(Error::Configuration("cookie string is empty".to_owned()).into());
            }
            let id = AccountRepository::new(pool.clone())
                .insert(&name, &cookie)
                .await?;
            tracing::info!(id, name = %name, "account stored");
        }
    }

    Ok(())
}
