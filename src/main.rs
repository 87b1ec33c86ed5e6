use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

use costplan::{api, db, export};

#[derive(Parser)]
#[command(name = "costplan")]
#[command(about = "Construction cost estimation with hierarchical estimate trees")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the Costplan server
    Serve {
        /// Port for HTTP API
        #[arg(short, long, default_value = "3000")]
        port: u16,
    },
    /// Export a project's estimate as CSV
    Export {
        /// Project id
        project_id: Uuid,

        /// Write to a file instead of stdout
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::new(
        std::env::var("RUST_LOG").unwrap_or_else(|_| "costplan=debug,tower_http=debug".into()),
    );

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

async fn serve(port: u16) -> anyhow::Result<()> {
    tracing::info!("Starting Costplan server on port {}", port);

    let db = db::Database::open_default()?;
    db.migrate()?;

    let app = api::create_router(db);

    let listener = tokio::net::TcpListener::bind(format!("127.0.0.1:{}", port)).await?;
    tracing::info!("Costplan server listening on http://127.0.0.1:{}", port);

    axum::serve(listener, app).await?;
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing();

    match cli.command {
        Some(Commands::Serve { port }) => serve(port).await?,
        Some(Commands::Export { project_id, out }) => {
            let db = db::Database::open_default()?;
            db.migrate()?;

            let forest = db.get_estimate_tree(project_id)?;
            let units = db.list_units()?;
            let csv = export::estimate_to_csv(&forest, &units);

            match out {
                Some(path) => {
                    std::fs::write(&path, csv)?;
                    tracing::info!("Estimate written to {}", path.display());
                }
                None => print!("{csv}"),
            }
        }
        None => serve(3000).await?,
    }

    Ok(())
}
