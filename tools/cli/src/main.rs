//! bwbridge CLI - Command line interface for a Bitwarden CLI session.
//!
//! This tool drives `bw` through login, unlock, lock and sync, lists vault
//! items in snake case, and applies conversion descriptors to JSON documents.
//! Results go to stdout as JSON; logs go to stderr.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};
use zeroize::Zeroizing;

use bwbridge_client::{ClientConfig, ItemCatalog, SessionManager, SessionState};
use bwbridge_transform::{enclose, transform_keys, Conversion};

#[derive(Parser)]
#[command(name = "bwbridge")]
#[command(about = "bwbridge - Bitwarden CLI session bridge")]
#[command(version)]
struct Cli {
    /// Enable verbose logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Configuration file (JSON).
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Path or name of the `bw` binary.
    #[arg(long, global = true)]
    binary: Option<PathBuf>,

    /// Server the tool must be configured for.
    #[arg(long, global = true)]
    server: Option<String>,

    /// Account email.
    #[arg(long, global = true, env = "BWBRIDGE_EMAIL")]
    email: Option<String>,

    /// Expected account user id.
    #[arg(long, global = true)]
    user_id: Option<String>,

    /// Expected personal API client id.
    #[arg(long, global = true)]
    client_id: Option<String>,

    /// Private data directory for the tool.
    #[arg(long, global = true)]
    appdata_dir: Option<PathBuf>,

    /// Per-invocation timeout in seconds.
    #[arg(long, global = true)]
    timeout: Option<u64>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the version of the `bw` binary.
    Version,

    /// Show the tool's live status.
    Status,

    /// Show whether the session is logged out, locked or unlocked.
    State,

    /// Log in if needed and unlock the vault.
    Unlock {
        /// Print only the session key.
        #[arg(long)]
        raw: bool,
    },

    /// Lock the vault.
    Lock,

    /// Log out of the tool.
    Logout,

    /// Unlock and pull the latest vault contents.
    Sync,

    /// List vault items.
    Items {
        /// Wrap card, identity, login and secure note into one-element lists.
        #[arg(long)]
        host_shape: bool,
    },

    /// Apply a conversion descriptor to a JSON document.
    Transform {
        /// Descriptor file (JSON).
        #[arg(short, long)]
        descriptor: PathBuf,

        /// Enclose marked maps instead of renaming keys.
        #[arg(long)]
        enclose: bool,

        /// Input document (default: stdin).
        input: Option<PathBuf>,
    },
}

#[derive(Serialize)]
struct StateReport {
    state: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.as_str().to_lowercase()));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match &cli.command {
        Commands::Version => cmd_version(load_config(&cli, false)?).await,
        Commands::Status => cmd_status(load_config(&cli, false)?).await,
        Commands::State => cmd_state(load_config(&cli, false)?).await,
        Commands::Unlock { raw } => cmd_unlock(load_config(&cli, true)?, *raw).await,
        Commands::Lock => cmd_lock(load_config(&cli, false)?).await,
        Commands::Logout => cmd_logout(load_config(&cli, false)?).await,
        Commands::Sync => cmd_sync(load_config(&cli, true)?).await,
        Commands::Items { host_shape } => cmd_items(load_config(&cli, true)?, *host_shape).await,
        Commands::Transform {
            descriptor,
            enclose,
            input,
        } => cmd_transform(descriptor, *enclose, input.as_deref()),
    }
}

/// Build the client configuration from file, flags and environment.
fn load_config(cli: &Cli, needs_password: bool) -> Result<ClientConfig> {
    let path = cli
        .config
        .clone()
        .or_else(|| ClientConfig::default_path().filter(|p| p.exists()));

    let mut config = match &path {
        Some(path) => {
            debug!("Loading configuration from {}", path.display());
            ClientConfig::from_file(path)
                .with_context(|| format!("Failed to load config {}", path.display()))?
        }
        None => ClientConfig::default(),
    };

    if let Some(binary) = &cli.binary {
        config = config.with_binary(binary.clone());
    }
    if let Some(server) = &cli.server {
        config = config.with_server(server.clone());
    }
    if let Some(email) = &cli.email {
        config.email = Some(email.clone());
    }
    if let Some(user_id) = &cli.user_id {
        config = config.with_user_id(user_id.clone());
    }
    if let Some(client_id) = &cli.client_id {
        config = config.with_client_id(client_id.clone());
    }
    if let Some(dir) = &cli.appdata_dir {
        config = config.with_appdata_dir(dir.clone());
    }
    if let Some(secs) = cli.timeout {
        config = config.with_command_timeout(Duration::from_secs(secs));
    }

    if let Ok(key) = std::env::var("BWBRIDGE_SESSION") {
        config = config.with_session_key(key);
    }
    if let Ok(password) = std::env::var("BWBRIDGE_MASTER_PASSWORD") {
        config = config.with_master_password(password);
    } else if needs_password && config.master_password.is_none() {
        let password = prompt_password("Master password: ")?;
        config = config.with_master_password(password.as_str());
    }

    config.validate().context("Invalid configuration")?;
    Ok(config)
}

/// Prompt for password securely.
fn prompt_password(prompt: &str) -> Result<Zeroizing<String>> {
    let password = rpassword::prompt_password(prompt).context("Failed to read password")?;
    Ok(Zeroizing::new(password))
}

fn session(config: ClientConfig) -> Result<SessionManager> {
    SessionManager::new(config).context("Failed to create session")
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let rendered = serde_json::to_string_pretty(value).context("Failed to render output")?;
    println!("{}", rendered);
    Ok(())
}

/// Print the version of the `bw` binary.
async fn cmd_version(config: ClientConfig) -> Result<()> {
    let version = session(config)?
        .version()
        .await
        .context("Failed to query tool version")?;
    println!("{}", version);
    Ok(())
}

/// Show the tool's live status.
async fn cmd_status(config: ClientConfig) -> Result<()> {
    let status = session(config)?
        .status()
        .await
        .context("Failed to query status")?;
    print_json(&status)
}

/// Show the session state.
async fn cmd_state(config: ClientConfig) -> Result<()> {
    let state: SessionState = session(config)?
        .state()
        .await
        .context("Failed to query session state")?;
    print_json(&StateReport {
        state: state.to_string(),
    })
}

/// Unlock the vault.
async fn cmd_unlock(config: ClientConfig, raw: bool) -> Result<()> {
    let session = session(config)?;
    session
        .ensure_unlocked()
        .await
        .context("Failed to unlock vault")?;

    let key = session
        .session_key()
        .await
        .context("Unlock produced no session key")?;
    if raw {
        println!("{}", key.expose());
    } else {
        info!("Vault unlocked");
        println!("Vault unlocked. Reuse the session with:");
        println!("  export BWBRIDGE_SESSION=\"{}\"", key.expose());
    }
    Ok(())
}

/// Lock the vault.
async fn cmd_lock(config: ClientConfig) -> Result<()> {
    session(config)?
        .ensure_locked()
        .await
        .context("Failed to lock vault")?;
    println!("Vault locked.");
    Ok(())
}

/// Log out of the tool.
async fn cmd_logout(config: ClientConfig) -> Result<()> {
    session(config)?
        .ensure_logged_out()
        .await
        .context("Failed to log out")?;
    println!("Logged out.");
    Ok(())
}

/// Unlock and sync.
async fn cmd_sync(config: ClientConfig) -> Result<()> {
    session(config)?
        .sync()
        .await
        .context("Failed to sync vault")?;
    println!("Vault synced.");
    Ok(())
}

/// List vault items.
async fn cmd_items(config: ClientConfig, host_shape: bool) -> Result<()> {
    let session = SessionManager::connect(config)
        .await
        .context("Failed to open vault session")?;
    let catalog = ItemCatalog::new(Arc::clone(&session));

    let items = if host_shape {
        catalog.host_items().await
    } else {
        catalog.list_items().await
    }
    .context("Failed to list items")?;

    info!("Listed {} items", items.len());
    print_json(&items)
}

/// Apply a conversion descriptor to a document.
fn cmd_transform(descriptor: &Path, enclose_maps: bool, input: Option<&Path>) -> Result<()> {
    let descriptor_json = std::fs::read_to_string(descriptor)
        .with_context(|| format!("Failed to read descriptor {}", descriptor.display()))?;
    let conversion = Conversion::from_json(&descriptor_json).context("Invalid descriptor")?;

    let document_json = match input {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read input {}", path.display()))?,
        None => {
            let mut buffer = String::new();
            std::io::stdin()
                .read_to_string(&mut buffer)
                .context("Failed to read stdin")?;
            buffer
        }
    };
    let mut document: serde_json::Value =
        serde_json::from_str(&document_json).context("Input is not valid JSON")?;

    if enclose_maps {
        enclose(&mut document, &conversion).context("Failed to enclose document")?;
    } else {
        transform_keys(&mut document, &conversion).context("Failed to transform document")?;
    }

    print_json(&document)
}
