use std::{path::PathBuf, sync::Arc};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use client_core::{
    config::{load_settings_from, DEFAULT_SETTINGS_FILE},
    CollectsTracker, ConfigNotifier, ConfigUpdate, HttpProfileApi, MemoryPreferenceStore,
    PreferenceStore, ProfileSyncController, SyncConfig, SyncEvent,
};
use storage::Storage;
use tokio_stream::{wrappers::BroadcastStream, StreamExt};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "profile-tools", about = "Drive the player profile sync controller from a terminal")]
struct Cli {
    #[arg(long, default_value = DEFAULT_SETTINGS_FILE)]
    config: PathBuf,
    #[arg(long)]
    api_base_url: Option<String>,
    #[arg(long)]
    database_url: Option<String>,
    /// Keep credential/season selections in memory only.
    #[arg(long)]
    ephemeral: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    Show,
    SwitchCredential {
        credential: String,
    },
    SwitchSeason {
        season: String,
    },
    LoadMore {
        #[arg(long, default_value_t = 1)]
        pages: u32,
    },
    LoadAll,
    Refresh,
    PersonResource {
        #[arg(long)]
        all_seasons: bool,
    },
    Collects,
}

struct LoggingConfigNotifier;

impl ConfigNotifier for LoggingConfigNotifier {
    fn update_config(&self, update: ConfigUpdate) {
        info!(
            credential = ?update.credential.map(|c| c.redacted()),
            season = ?update.season.map(|s| s.0),
            "profile config updated"
        );
    }
}

fn print_json(value: &impl serde::Serialize) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let mut settings = load_settings_from(&cli.config, |name| std::env::var(name).ok())?;
    if let Some(url) = cli.api_base_url {
        settings.api_base_url = url;
    }
    if let Some(url) = cli.database_url {
        settings.database_url = url;
    }

    let preferences: Arc<dyn PreferenceStore> = if cli.ephemeral {
        Arc::new(MemoryPreferenceStore::new())
    } else {
        let storage = Storage::new(&settings.database_url)
            .await
            .with_context(|| format!("failed to open preferences at '{}'", settings.database_url))?;
        Arc::new(storage)
    };
    let api = Arc::new(HttpProfileApi::new(&settings.api_base_url)?);
    let sync_config = SyncConfig::load(&settings, preferences.as_ref()).await?;

    if let Command::Collects = cli.command {
        let tracker = CollectsTracker::new(api, settings.collects.clone());
        match tracker.sync(&sync_config.credential).await {
            Some(board) => print_json(&board)?,
            None => warn!("no collects data found"),
        }
        return Ok(());
    }

    let controller = ProfileSyncController::new_with_dependencies(
        sync_config,
        api,
        preferences,
        Arc::new(LoggingConfigNotifier),
    );

    let mut events = BroadcastStream::new(controller.subscribe_events());
    tokio::spawn(async move {
        while let Some(event) = events.next().await {
            match event {
                Ok(SyncEvent::StreamFailed(failure)) => warn!(%failure, "stream failed"),
                Ok(SyncEvent::StaleResponseDiscarded { stream, generation }) => {
                    info!(%stream, generation, "stale response discarded")
                }
                Ok(_) => {}
                Err(err) => warn!(error = %err, "event stream lagged"),
            }
        }
    });

    controller.initialize().await;

    match cli.command {
        Command::Show | Command::Collects => {}
        Command::SwitchCredential { credential } => {
            controller
                .switch_credential(credential)
                .await
                .await
                .context("credential switch task failed")?;
        }
        Command::SwitchSeason { season } => {
            controller
                .switch_season(season)
                .await
                .await
                .context("season switch task failed")?;
        }
        Command::LoadMore { pages } => {
            for _ in 0..pages {
                let outcome = controller.request_next_page().await;
                if !outcome.is_applied() {
                    info!(?outcome, "stopped loading pages");
                    break;
                }
            }
        }
        Command::LoadAll => loop {
            let outcome = controller.request_next_page().await;
            if !outcome.is_applied() {
                info!(?outcome, "stopped loading pages");
                break;
            }
        },
        Command::Refresh => controller.refresh().await,
        Command::PersonResource { all_seasons } => {
            let season = controller.season().await;
            controller
                .fetch_person_resource(season, None, all_seasons)
                .await;
        }
    }

    print_json(&controller.snapshot().await)
}
