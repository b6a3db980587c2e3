//! The gogcli-sensor binary sets up accounts and polls their Gmail inboxes through gog.

use clap::{Parser, Subcommand};
use gogcli_sensor::coordinator::request_refresh;
use gogcli_sensor::errors::IntegrationError;
use gogcli_sensor::summary::{dashboard_card, sensor_states, EmailSummary};
use gogcli_sensor::{
    ensure_binary, validate_setup, AuthRegistry, InboxCoordinator, IntegrationConfig, SetupStatus,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the gog binary (default: discover)
    #[arg(long, global = true)]
    gog_path: Option<PathBuf>,

    /// Directory gog uses as its home for tokens and settings
    #[arg(long, global = true)]
    config_dir: Option<PathBuf>,

    /// Minutes between refreshes (minimum 5)
    #[arg(long, global = true, default_value_t = 5)]
    polling_interval: u64,

    /// Newest inbox messages fetched per refresh
    #[arg(long, global = true, default_value_t = 5)]
    limit: u32,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate the binary and credentials, authorizing the account if needed
    Setup {
        /// Gmail account to set up
        #[arg(long)]
        account: String,
        /// OAuth client credentials JSON (relative to the config dir)
        #[arg(long)]
        credentials_file: Option<PathBuf>,
    },
    /// Run one refresh cycle and print the message summaries as JSON
    Refresh {
        /// Gmail account to refresh
        #[arg(long)]
        account: String,
    },
    /// Poll the accounts until Ctrl-C (SIGUSR1 forces a refresh)
    Watch {
        /// Gmail accounts to poll
        #[arg(long, required = true, num_args = 1..)]
        account: Vec<String>,
    },
    /// Print one thread as JSON
    Thread {
        /// Gmail account owning the thread
        #[arg(long)]
        account: String,
        /// Thread id
        thread_id: String,
    },
    /// Print a dashboard card (YAML) for the account's email sensors
    Dashboard {
        /// Gmail account shown on the card
        #[arg(long)]
        account: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), IntegrationError> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    if let Commands::Dashboard { account } = &cli.command {
        let slots = usize::try_from(cli.limit).unwrap_or(usize::MAX);
        println!("{}", dashboard_card(account, slots));
        return Ok(());
    }

    let gog_path = ensure_binary(cli.gog_path.as_deref(), None).await?;

    match &cli.command {
        Commands::Setup {
            account,
            credentials_file,
        } => {
            let mut config = config_for(&cli, account);
            if let Some(path) = credentials_file {
                config = config.with_credentials_file(path);
            }
            run_setup(&config, &gog_path).await?;
        }
        Commands::Refresh { account } => {
            let coordinator = InboxCoordinator::from_config(&config_for(&cli, account), &gog_path);
            let messages = coordinator.refresh().await?;
            let summaries: Vec<EmailSummary> = messages.iter().map(EmailSummary::from_inbox).collect();
            println!("{}", serde_json::to_string_pretty(&summaries)?);
        }
        Commands::Watch { account } => {
            let coordinators = account
                .iter()
                .map(|a| Arc::new(InboxCoordinator::from_config(&config_for(&cli, a), &gog_path)))
                .collect::<Vec<_>>();
            run_watch(coordinators, cli.limit).await?;
        }
        Commands::Thread { account, thread_id } => {
            let coordinator = InboxCoordinator::from_config(&config_for(&cli, account), &gog_path);
            let thread = coordinator.get_thread(thread_id).await?;
            println!("{}", serde_json::to_string_pretty(&thread)?);
        }
        Commands::Dashboard { .. } => {}
    }

    Ok(())
}

fn config_for(cli: &Cli, account: &str) -> IntegrationConfig {
    let mut config = IntegrationConfig::new(account)
        .with_polling_interval(cli.polling_interval)
        .with_message_limit(cli.limit);
    if let Some(path) = &cli.gog_path {
        config = config.with_binary_path(path);
    }
    if let Some(dir) = &cli.config_dir {
        config = config.with_config_dir(dir);
    }
    config
}

async fn run_setup(config: &IntegrationConfig, gog_path: &Path) -> Result<(), IntegrationError> {
    println!("Checking gog at: {}", gog_path.display());
    match validate_setup(config, gog_path).await? {
        SetupStatus::Ready { version } => {
            println!("[OK] {} is authorized ({version}).", config.account);
            Ok(())
        }
        SetupStatus::NeedsAuthorization { version, hint } => {
            println!("gog {version} holds no token for {}.", config.account);
            authorize(config, gog_path).await.map_err(|e| {
                eprintln!("To authorize by hand: {hint}");
                e
            })
        }
    }
}

/// Interactive authorization: print the URL, read the code, retry on rejection.
async fn authorize(config: &IntegrationConfig, gog_path: &Path) -> Result<(), IntegrationError> {
    let registry = AuthRegistry::new();
    let mut input = BufReader::new(tokio::io::stdin()).lines();

    loop {
        let url = registry.begin_auth(config, gog_path).await?;
        println!("\nOpen this URL in a browser and grant access:\n\n  {url}\n");
        println!("Paste the authorization code or the full redirect URL:");

        let Some(line) = input.next_line().await? else {
            registry.remove(&config.account).await;
            return Err(IntegrationError::AccountNotAuthorized {
                account: config.account.clone(),
                hint: "Input closed before a code was entered.".to_string(),
            });
        };

        match registry.submit_code(&config.account, &line).await {
            Ok(()) => {
                println!("[OK] {} authorized.", config.account);
                return Ok(());
            }
            Err(IntegrationError::Adapter(e)) if e.is_retryable() => {
                println!("[RETRY] {e}");
            }
            Err(e) => {
                registry.remove(&config.account).await;
                return Err(e);
            }
        }
    }
}

async fn run_watch(coordinators: Vec<Arc<InboxCoordinator>>, slots: u32) -> Result<(), IntegrationError> {
    let (stop_tx, stop_rx) = tokio::sync::watch::channel(false);
    let slots = usize::try_from(slots).unwrap_or(usize::MAX);
    let mut tasks = tokio::task::JoinSet::new();

    for coordinator in &coordinators {
        let poller = Arc::clone(coordinator);
        let mut stop = stop_rx.clone();
        tasks.spawn(async move {
            poller
                .run(async move {
                    let _ = stop.changed().await;
                })
                .await;
        });

        let printer = Arc::clone(coordinator);
        let mut snapshots = coordinator.subscribe();
        let mut stop = stop_rx.clone();
        tasks.spawn(async move {
            loop {
                tokio::select! {
                    _ = stop.changed() => break,
                    changed = snapshots.changed() => if changed.is_err() { break },
                }
                let snapshot = snapshots.borrow_and_update().clone();
                if let Some(error) = &snapshot.last_error {
                    println!("{}: refresh failed: {error}", printer.account());
                    continue;
                }
                let updated = snapshot
                    .last_success
                    .map_or_else(|| "never".to_string(), |t| t.to_rfc3339());
                println!("{} (last update {updated})", printer.account());
                for (i, state) in sensor_states(&snapshot.messages, slots).iter().enumerate() {
                    println!("  email_{}: {state}", i + 1);
                }
            }
        });
    }

    wait_for_shutdown(&coordinators).await?;
    tracing::info!("shutting down");
    let _ = stop_tx.send(true);
    while tasks.join_next().await.is_some() {}
    Ok(())
}

#[cfg(unix)]
async fn wait_for_shutdown(coordinators: &[Arc<InboxCoordinator>]) -> Result<(), IntegrationError> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut refresh = signal(SignalKind::user_defined1())?;
    loop {
        tokio::select! {
            result = tokio::signal::ctrl_c() => return Ok(result?),
            _ = refresh.recv() => request_refresh(coordinators, &[]),
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown(_coordinators: &[Arc<InboxCoordinator>]) -> Result<(), IntegrationError> {
    Ok(tokio::signal::ctrl_c().await?)
}
