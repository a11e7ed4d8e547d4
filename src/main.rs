use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};

use clerk::config::ClerkConfig;
use clerk::daemon;
use clerk::host::{Host, Intent};
use clerk::store::{FileStore, StateStore};
use clerk::sync::badge::LogPresenter;
use clerk::sync::pairing::redeem_pairing_code;
use clerk::sync::tabs::FileTabSource;

#[derive(Parser)]
#[command(name = "clerk")]
#[command(about = "Relay tab snapshots and receive actions from a paired agent")]
struct Cli {
    /// Config file (defaults to the user config dir)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the background host: timer plus intent socket
    Daemon,

    /// Redeem a pairing code from the agent
    Pair {
        /// Six-digit code
        code: String,
        /// Relay worker URL
        #[arg(long)]
        worker_url: Option<String>,
    },

    /// Disconnect and forget credentials
    Unpair,

    /// Sync now
    Sync,

    /// Send a note to the agent
    Send {
        text: String,
        /// Page the note refers to
        #[arg(long)]
        url: Option<String>,
    },

    /// Add a link to the agent's brief
    Save {
        url: String,
        /// Link title (defaults to the URL)
        title: Option<String>,
    },

    /// Dismiss a pending action
    Dismiss { id: String },

    /// Show connection state and pending actions
    Status {
        /// Print JSON
        #[arg(long)]
        json: bool,
    },
}

async fn open_host(config: &ClerkConfig) -> Result<Arc<Host>, Box<dyn std::error::Error>> {
    let store = Arc::new(FileStore::open(config.store_path()).await?);
    let tabs = Arc::new(FileTabSource::new(config.tabs_path()));
    Ok(Host::new(
        config.clone(),
        store,
        tabs,
        Arc::new(LogPresenter::default()),
    ))
}

/// Forward to a running daemon, or handle in this process when none answers.
async fn dispatch(config: &ClerkConfig, intent: Intent) -> Result<bool, Box<dyn std::error::Error>> {
    match daemon::send_intent(&config.socket_path(), &intent).await {
        Ok(resp) => Ok(resp.ok),
        Err(e) => {
            log::debug!("Daemon not reachable ({}), handling in-process", e);
            let host = open_host(config).await?;
            Ok(host.handle(intent).await.ok)
        }
    }
}

async fn run(cli: Cli, config: ClerkConfig) -> Result<bool, Box<dyn std::error::Error>> {
    match cli.command {
        Commands::Daemon => {
            let host = open_host(&config).await?;
            host.start().await;
            let socket = config.socket_path();
            let result: Result<(), Box<dyn std::error::Error>> = tokio::select! {
                r = daemon::serve(host.clone(), &socket) => r.map_err(Into::into),
                r = tokio::signal::ctrl_c() => r.map_err(Into::into),
            };
            host.stop().await;
            let _ = tokio::fs::remove_file(&socket).await;
            result.map(|_| true)
        }
        Commands::Pair { code, worker_url } => {
            let worker_url = worker_url.unwrap_or_else(|| config.worker_url.clone());
            let creds = redeem_pairing_code(&worker_url, &code).await?;
            let state = StateStore::new(Arc::new(FileStore::open(config.store_path()).await?));
            state.save_credentials(&creds).await?;
            println!("Paired. Channel: {}...", creds.channel_prefix());
            dispatch(&config, Intent::Paired).await
        }
        Commands::Unpair => {
            let state = StateStore::new(Arc::new(FileStore::open(config.store_path()).await?));
            state.clear_credentials().await?;
            println!("Disconnected");
            dispatch(&config, Intent::Unpaired).await
        }
        Commands::Sync => dispatch(&config, Intent::SyncNow).await,
        Commands::Send { text, url } => dispatch(&config, Intent::SendMessage { text, url }).await,
        Commands::Save { url, title } => {
            let title = title.unwrap_or_else(|| url.clone());
            dispatch(&config, Intent::SaveToBrief { url, title }).await
        }
        Commands::Dismiss { id } => dispatch(&config, Intent::DismissAction { id }).await,
        Commands::Status { json } => {
            let host = open_host(&config).await?;
            let status = host.status().await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&status)?);
                return Ok(true);
            }
            if !status.paired {
                println!("Not connected. Use `clerk pair <code>` to connect.");
                return Ok(true);
            }
            println!("Connected");
            if let Some(channel) = &status.channel {
                println!("Channel: {}...", channel);
            }
            if let Some(at) = status.last_sync_at {
                println!("Last sync: {}", at.with_timezone(&chrono::Local).format("%H:%M:%S"));
            }
            match status.tab_count {
                Some(n) => println!("{} tabs tracked", n),
                None => println!("No tab data yet"),
            }
            println!("Pending actions: {}", status.pending.len());
            for action in &status.pending {
                let label = if action.title.is_empty() { &action.url } else { &action.title };
                println!("  [{}] {} {}", action.id, label, action.url);
                if !action.message.is_empty() {
                    println!("      {}", action.message);
                }
            }
            Ok(true)
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => ClerkConfig::load_from(path),
        None => ClerkConfig::load(),
    };

    if let Err(e) = clerk::init_logging("clerk", cli.debug || config.debug_logging) {
        eprintln!("Journal logging unavailable: {}", e);
    }

    match run(cli, config).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => {
            eprintln!("Request did not complete; see `journalctl --user -t clerk`");
            ExitCode::FAILURE
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}
