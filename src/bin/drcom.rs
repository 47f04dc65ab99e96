//! DrCOM CLI binary.
//!
//! Campus network authentication client.
//!
//! # Commands
//!
//! - `login` - Log in and stay online until Ctrl-C, then log out
//! - `discover` - Probe for the authentication server and print its salt
//! - `config` - Print the effective configuration (password redacted)
//!
//! Session events are written to stdout as JSON lines; logs go to stderr.

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use drcom::{Client, Config, Credentials, SessionState, VERSION};
use tokio::sync::broadcast::error::RecvError;

#[derive(Parser)]
#[command(name = "drcom")]
#[command(version = VERSION)]
#[command(about = "DrCOM campus network authentication client", long_about = None)]
struct Cli {
    /// Config file (default: <config_dir>/drcom/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Log in and keep the session alive until Ctrl-C
    Login {
        /// Username (overrides config and DRCOM_USERNAME)
        #[arg(short, long)]
        username: Option<String>,

        /// Password (overrides config and DRCOM_PASSWORD)
        #[arg(short, long)]
        password: Option<String>,

        /// Do not run the reconnection supervisor
        #[arg(long)]
        no_reconnect: bool,
    },

    /// Find the authentication server and print its salt
    Discover,

    /// Print the effective configuration as TOML
    Config,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .init();

    let config = Config::load(cli.config.as_deref())
        .context("loading configuration")?
        .with_env_overrides();

    match cli.command {
        Commands::Login {
            username,
            password,
            no_reconnect,
        } => {
            let mut config = config;
            if let Some(username) = username {
                config.account.username = username;
            }
            if let Some(password) = password {
                config.account.password = password;
            }
            if no_reconnect {
                config.reconnect.enabled = false;
            }
            run(cmd_login(config))
        },
        Commands::Discover => run(cmd_discover(config)),
        Commands::Config => cmd_config(&config),
    }
}

fn run(task: impl std::future::Future<Output = anyhow::Result<()>>) -> anyhow::Result<()> {
    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(task)
}

async fn cmd_login(config: Config) -> anyhow::Result<()> {
    if config.account.username.is_empty() {
        anyhow::bail!("No username: set [account] username, DRCOM_USERNAME or --username");
    }
    let credentials = Credentials::new(&config.account.username, &config.account.password)?;

    let mut client = Client::connect(config).await?;
    let mut events = client.subscribe();
    let printer = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => match serde_json::to_string(&event) {
                    Ok(line) => println!("{line}"),
                    Err(e) => tracing::warn!("Unprintable event: {}", e),
                },
                Err(RecvError::Lagged(n)) => tracing::warn!("Skipped {} events", n),
                Err(RecvError::Closed) => break,
            }
        }
    });

    client.login(&credentials).await?;
    tracing::info!("Online; press Ctrl-C to log out");

    let mut state = client.watch_state();
    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result.context("waiting for Ctrl-C")?;
            tracing::info!("Logging out");
        },
        _ = state.wait_for(|s| *s == SessionState::Offline) => {
            tracing::error!("Session went offline");
        },
    }

    let outcome = client.shutdown().await;
    printer.abort();
    outcome?;
    Ok(())
}

async fn cmd_discover(config: Config) -> anyhow::Result<()> {
    let client = Client::connect(config).await?;
    let discovery = client.discover().await?;

    println!("Server: {}", discovery.server);
    println!("Salt:   {}", hex::encode(discovery.salt));
    client.shutdown().await?;
    Ok(())
}

fn cmd_config(config: &Config) -> anyhow::Result<()> {
    config.validate()?;
    print!("{}", config.to_toml_redacted()?);
    Ok(())
}
