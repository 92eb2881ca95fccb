//! labstock CLI - lab inventory server and administration
//!
//! Entry point for the `labstock` binary:
//! - `labstock serve` runs the HTTP API (migrations run on startup)
//! - `labstock init-admin` bootstraps the first admin account

use std::path::PathBuf;

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;

use labstock_core::AppConfig;
use labstock_server::auth;
use labstock_server::db::repos::UserRepo;

mod tracing_setup;

#[derive(Parser, Debug)]
#[command(
    name = "labstock",
    author,
    version,
    about = "Inventory service for laboratory consumables and stocks",
    long_about = "Track antibodies, plasmids, oligonucleotides, chemicals, and fly stocks \
                  with batches, comments, file attachments, and spreadsheet imports."
)]
struct Cli {
    /// Enable debug logging (RUST_LOG still takes precedence)
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the HTTP API server
    Serve(ServeArgs),
    /// Create the initial admin user
    InitAdmin(InitAdminArgs),
}

#[derive(Parser, Debug)]
struct ServeArgs {
    /// Path to a TOML config file; omit to configure from the environment
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Override the bind address from the config (e.g. 0.0.0.0:3050)
    #[arg(long, value_name = "ADDR")]
    bind: Option<String>,

    /// Allow requests from any origin (development only)
    #[arg(long)]
    cors_permissive: bool,
}

#[derive(Parser, Debug)]
struct InitAdminArgs {
    /// Path to a TOML config file; omit to configure from the environment
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    #[arg(long)]
    username: String,

    #[arg(long)]
    email: String,

    /// Password for the new account (minimum 8 characters)
    #[arg(long)]
    password: String,
}

fn load_config(path: Option<&PathBuf>) -> Result<AppConfig> {
    match path {
        Some(path) => AppConfig::load(path),
        None => AppConfig::from_env(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    tracing_setup::init(cli.debug).ok();

    match cli.command {
        Commands::Serve(args) => run_serve(args).await?,
        Commands::InitAdmin(args) => run_init_admin(args).await?,
    }
    Ok(())
}

async fn run_serve(args: ServeArgs) -> Result<()> {
    let mut config = load_config(args.config.as_ref())?;

    if let Some(bind) = args.bind {
        config.server.addr = bind;
    }
    if args.cors_permissive {
        config.server.cors_permissive = true;
    }

    labstock_server::serve(config)
        .await
        .context("server exited with an error")?;
    Ok(())
}

async fn run_init_admin(args: InitAdminArgs) -> Result<()> {
    if args.password.len() < 8 {
        bail!("password must be at least 8 characters");
    }

    let config = load_config(args.config.as_ref())?;
    let pool = labstock_server::db::create_pool(
        &config.database.url,
        config.database.max_connections,
    )
    .await
    .context("failed to connect to the database")?;
    labstock_server::db::migrations::run(&pool)
        .await
        .context("failed to run migrations")?;

    let users = UserRepo::new(&pool);
    if users.count().await? > 0 {
        bail!("users already exist; create further accounts through the API");
    }

    let hash = auth::hash_password(&args.password)
        .map_err(|e| anyhow!("failed to hash password: {e}"))?;
    let user = users
        .create(&args.username, &args.email, &hash, true, &["admin".to_string()])
        .await?;

    info!(user = user.id, username = %user.username, "admin account created");
    println!("created admin '{}' (id {})", user.username, user.id);
    Ok(())
}
