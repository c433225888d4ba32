use anyhow::Result;
use clap::{Parser, Subcommand};
use jobdash_storage::{PgExecutor, StoreConfig};
use jobdash_web::{AppState, ServerConfig};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "jobdash")]
#[command(about = "Labor-market dashboard API")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Serve the JSON API.
    Serve {
        #[arg(long, env = "JOBDASH_BIND")]
        bind: Option<String>,
        #[arg(long, env = "JOBDASH_PORT")]
        port: Option<u16>,
    },
    /// Print which optional tables and columns the database has.
    Probe,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();
    let executor = PgExecutor::connect(&StoreConfig::from_env()).await?;

    match cli.command.unwrap_or(Commands::Serve {
        bind: None,
        port: None,
    }) {
        Commands::Serve { bind, port } => {
            let mut config = ServerConfig::from_env();
            if let Some(bind) = bind {
                config.bind = bind;
            }
            if let Some(port) = port {
                config.port = port;
            }
            jobdash_web::serve(&config, AppState::new(executor)).await?;
        }
        Commands::Probe => {
            for (element, present) in jobdash_report::probe_optional(&executor).await? {
                println!("{element}: {}", if present { "present" } else { "missing" });
            }
        }
    }

    Ok(())
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(env_filter).try_init();
}
