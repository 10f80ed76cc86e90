use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use pmboard::api::{self, AppState};
use pmboard::config::{Config, ServeArgs};
use pmboard::db::Database;
use pmboard::mcp;
use pmboard::uploads::UploadStore;
use pmboard_core::context::CONTEXT_FILE_NAME;

const DEFAULT_SERVER: &str = "http://127.0.0.1:3000";

#[derive(Parser)]
#[command(name = "pmboard")]
#[command(about = "Kanban and roadmap board for AI-assisted development")]
#[command(args_conflicts_with_subcommands = true)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    #[command(flatten)]
    serve: ServeArgs,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the PM Board server (default)
    Serve(ServeArgs),
    /// Start MCP server via stdio
    Mcp {
        /// SQLite database file (defaults to the platform data directory)
        #[arg(long, env = "PMBOARD_DB")]
        db: Option<PathBuf>,

        /// Public URL used in generated agent instructions
        #[arg(long, env = "PMBOARD_PUBLIC_URL", default_value = DEFAULT_SERVER)]
        base_url: String,
    },
    /// Fetch a project's context snapshot from a running server
    Context {
        /// Project ID
        project_id: String,

        /// Address of the running server
        #[arg(long, env = "PMBOARD_PUBLIC_URL", default_value = DEFAULT_SERVER)]
        server: String,

        /// File to write
        #[arg(short, long, default_value = CONTEXT_FILE_NAME)]
        out: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // stdout carries the MCP protocol, so logs always go to stderr.
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "pmboard=debug,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Serve(args)) => serve(args).await?,
        Some(Commands::Mcp { db, base_url }) => {
            let db = match db {
                Some(path) => Database::open(&path)?,
                None => Database::open_default()?,
            };
            db.migrate()?;

            mcp::run_stdio_server(db, base_url).await?;
        }
        Some(Commands::Context {
            project_id,
            server,
            out,
        }) => fetch_context(&project_id, &server, &out).await?,
        None => serve(cli.serve).await?,
    }

    Ok(())
}

async fn serve(args: ServeArgs) -> anyhow::Result<()> {
    let config = Config::from_args(args)?;
    tracing::info!(
        db = %config.db_path.display(),
        uploads = %config.upload_dir.display(),
        "Starting PM Board server"
    );

    let db = Database::open(&config.db_path)?;
    db.migrate()?;

    let uploads = UploadStore::new(config.upload_dir.clone());
    uploads.ensure_dir().await?;

    let app = api::create_router(AppState::new(db, uploads, config.base_url.as_str()));

    let listener = tokio::net::TcpListener::bind(config.listen_addr())
        .await
        .with_context(|| format!("Failed to bind {}", config.listen_addr()))?;
    tracing::info!("PM Board server listening on http://{}", config.listen_addr());

    axum::serve(listener, app).await?;
    Ok(())
}

async fn fetch_context(project_id: &str, server: &str, out: &Path) -> anyhow::Result<()> {
    let url = format!(
        "{}/api/agent/projects/{}/context",
        server.trim_end_matches('/'),
        project_id
    );
    tracing::debug!(%url, "fetching context");

    let body = reqwest::get(&url)
        .await
        .with_context(|| format!("Failed to reach {}", url))?
        .error_for_status()?
        .text()
        .await?;

    tokio::fs::write(out, body)
        .await
        .with_context(|| format!("Failed to write {}", out.display()))?;
    eprintln!("Wrote {}", out.display());
    Ok(())
}
