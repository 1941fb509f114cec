mod replay;

use std::path::PathBuf;

use anyhow::Context;
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;
use uuid::Uuid;

use placeconnect_client::ClientConfig;
use placeconnect_core::validate;
use placeconnect_store::Store;

use crate::replay::Replay;

const DEFAULT_STORE_PATH: &str = "placeconnect.db";

/// Inspect and edit PlaceConnect's device-local state.
#[derive(Parser, Debug)]
#[command(name = "placeconnect", version)]
struct Cli {
    /// Local store file. Falls back to PLACECONNECT_STORE_PATH, then ./placeconnect.db
    #[arg(long, global = true)]
    store: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show, set or clear the remembered guest name
    GuestName {
        #[command(subcommand)]
        action: Option<GuestAction>,
    },
    /// List or edit favourite places
    Favorites {
        #[command(subcommand)]
        action: Option<FavoriteAction>,
    },
    /// Fold a recorded realtime feed (JSON lines) and print the result
    Replay {
        path: PathBuf,
        /// Instant used for the expiry sweep, RFC 3339. Defaults to now
        #[arg(long)]
        at: Option<DateTime<Utc>>,
    },
}

#[derive(Subcommand, Debug)]
enum GuestAction {
    Set { name: String },
    Clear,
}

#[derive(Subcommand, Debug)]
enum FavoriteAction {
    List,
    Add { id: Uuid },
    Remove { id: Uuid },
    Toggle { id: Uuid },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "placeconnect=info".into()),
        )
        .init();

    let cli = Cli::parse();
    let config = ClientConfig::from_env();

    match cli.command {
        Command::GuestName { action } => {
            let store = open_store(cli.store, &config)?;
            guest_name(&store, action)
        }
        Command::Favorites { action } => {
            let store = open_store(cli.store, &config)?;
            favorites(&store, action.unwrap_or(FavoriteAction::List))
        }
        Command::Replay { path, at } => replay(path, at.unwrap_or_else(Utc::now)).await,
    }
}

fn open_store(flag: Option<PathBuf>, config: &ClientConfig) -> anyhow::Result<Store> {
    let path = flag
        .or_else(|| config.store_path.clone())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_STORE_PATH));
    Store::open(&path).with_context(|| format!("opening store at {}", path.display()))
}

fn guest_name(store: &Store, action: Option<GuestAction>) -> anyhow::Result<()> {
    match action {
        None => match store.guest_name()? {
            Some(name) => println!("{name}"),
            None => println!("(no guest name)"),
        },
        Some(GuestAction::Set { name }) => {
            let name = validate::guest_name(&name)?;
            store.set_guest_name(&name)?;
            info!("Guest name set to {}", name);
        }
        Some(GuestAction::Clear) => {
            store.clear_guest_name()?;
            info!("Guest name cleared");
        }
    }
    Ok(())
}

fn favorites(store: &Store, action: FavoriteAction) -> anyhow::Result<()> {
    match action {
        FavoriteAction::List => {
            for id in store.favorites()? {
                println!("{id}");
            }
        }
        FavoriteAction::Add { id } => {
            if !store.add_favorite(id)? {
                info!("{} is already a favourite", id);
            }
        }
        FavoriteAction::Remove { id } => {
            if !store.remove_favorite(id)? {
                info!("{} was not a favourite", id);
            }
        }
        FavoriteAction::Toggle { id } => {
            let now = store.toggle_favorite(id)?;
            println!("{}", if now { "added" } else { "removed" });
        }
    }
    Ok(())
}

async fn replay(path: PathBuf, now: DateTime<Utc>) -> anyhow::Result<()> {
    let file = tokio::fs::File::open(&path)
        .await
        .with_context(|| format!("opening {}", path.display()))?;
    let mut lines = BufReader::new(file).lines();

    let mut replay = Replay::new();
    let mut line_no = 0;
    while let Some(line) = lines.next_line().await? {
        line_no += 1;
        replay.feed_line(line_no, &line);
    }

    let summary = replay.finish(now);
    info!(
        "Replayed {} events: {} places left, {} expired, {} skipped lines",
        summary.events,
        summary.places.len(),
        summary.expired.len(),
        summary.skipped
    );
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}
