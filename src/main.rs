use anyhow::Result;
use chrono::{DateTime, Utc};
use clap::Parser;
use dotenv::dotenv;
use std::sync::Arc;
use tracing::{error, info};

/// Sleeper fantasy football notification bot for Telegram and Discord
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Directory holding the JSON database (overrides STATE_PATH)
    #[arg(long)]
    state_path: Option<String>,

    /// Port for the ops HTTP server (overrides WEB_PORT)
    #[arg(long)]
    port: Option<u16>,

    /// Do not start the ops HTTP server
    #[arg(long)]
    no_web: bool,

    /// Run a single tick of one job and exit
    #[arg(long, value_enum)]
    run_once: Option<JobKind>,

    /// Evaluate --run-once as if it were this instant (RFC 3339)
    #[arg(long, requires = "run_once")]
    at: Option<DateTime<Utc>>,
}

mod clock;
mod config;
mod error;
mod jobs;
mod logging;
mod messages;
mod messenger;
mod sleeper;
mod store;
#[cfg(test)]
mod testing;
mod web;

use clock::{system_clock, ManualClock, SharedClock};
use config::BotConfig;
use jobs::{
    CacheRefresher, DraftNotifier, IntelligentNotifier, JobKind, JobManager, JobRunner,
    SharedJobManager,
};
use messenger::{DiscordAdapter, Messenger, TelegramAdapter};
use sleeper::{SharedSportsApi, SleeperClient};
use store::create_shared_store;

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    let args = Args::parse();

    // Recent events for /admin/logs
    let log_buffer = logging::create_log_buffer(1000);

    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;
    use tracing_subscriber::EnvFilter;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_level(true),
        )
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(logging::LogCaptureLayer::new(log_buffer.clone()))
        .init();

    let mut config = BotConfig::from_env();
    if let Some(state_path) = args.state_path {
        config.state_path = state_path;
    }
    if let Some(port) = args.port {
        config.web_port = port;
    }
    config.validate()?;

    let clock: SharedClock = match args.at {
        Some(at) => {
            info!("Using fixed clock at {}", at.to_rfc3339());
            Arc::new(ManualClock::new(at))
        }
        None => system_clock(),
    };

    tokio::fs::create_dir_all(&config.state_path).await?;
    info!("Loading database from {}...", config.database_path());
    let store = create_shared_store(&config.database_path()).await?;
    info!(
        "Database ready: {} users, {} leagues",
        store.user_count().await,
        store.league_count().await
    );

    let api: SharedSportsApi = Arc::new(SleeperClient::from_config(&config, clock.clone())?);

    let mut messenger = Messenger::new(store.clone());
    if let Some(token) = &config.telegram_token {
        messenger = messenger.with_adapter(Arc::new(TelegramAdapter::new(token)));
    }
    if let Some(token) = &config.discord_token {
        messenger = messenger.with_adapter(Arc::new(DiscordAdapter::new(token)));
    }
    info!("Chat platforms: {:?}", messenger.configured_platforms());
    let messenger = Arc::new(messenger);

    let runner = JobRunner::new(
        DraftNotifier::new(api.clone(), store.clone(), messenger.clone(), clock.clone()),
        IntelligentNotifier::new(
            api.clone(),
            store.clone(),
            messenger,
            clock.clone(),
            &config.sport,
        ),
        CacheRefresher::new(api, store.clone(), clock.clone(), &config.sport, &config.schedule),
        clock,
    );
    let jobs: SharedJobManager = Arc::new(JobManager::new(runner, config.schedule.clone()));

    if let Some(kind) = args.run_once {
        let outcome = jobs.run_once(kind).await?;
        info!("{} job finished: {}", kind, outcome);
        store.save().await?;
        return Ok(());
    }

    jobs.start();

    if args.no_web {
        info!("--no-web: ops HTTP server disabled");
    } else {
        let state = web::AppState {
            jobs: jobs.clone(),
            store: store.clone(),
            log_buffer: log_buffer.clone(),
            admin_token: config.admin_token.as_deref().map(Arc::from),
        };
        let web_config = web::WebServerConfig::from_config(&config);
        tokio::spawn(async move {
            if let Err(e) = web::start_web_server(web_config, state).await {
                error!("Web server error: {}", e);
            }
        });
    }

    tokio::signal::ctrl_c().await?;
    info!("Shutdown requested, waiting for running jobs...");
    jobs.stop().await;

    if let Err(e) = store.save().await {
        error!("Failed to save database: {}", e);
    }
    info!("Bye");
    Ok(())
}
