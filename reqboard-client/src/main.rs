//! Request board client (reqboard) - Main entry point
//!
//! Command-line client for the live request board. Audience commands list,
//! request and watch; operator commands edit the catalog, hide songs and
//! reset requests.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tokio::signal;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use reqboard_client::board::{BoardClient, FileLedgerStore, RequestTarget, SqliteBoard};
use reqboard_client::render::render_view;
use reqboard_common::config::{self as board_config, ConfigResolver};
use reqboard_common::db::init_database;
use reqboard_common::events::ChangeBus;

/// Command-line arguments for reqboard
#[derive(Parser, Debug)]
#[command(name = "reqboard")]
#[command(about = "Live song request board client")]
#[command(version)]
struct Args {
    /// Board database path
    #[arg(long, env = "REQBOARD_DB")]
    db: Option<PathBuf>,

    /// Directory holding this client's local state
    #[arg(long, env = "REQBOARD_STATE_DIR")]
    state_dir: Option<PathBuf>,

    /// Configuration file (TOML)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override the per-user request limit
    #[arg(long)]
    max_requests: Option<u32>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show the current board
    List {
        /// Case-insensitive filter on title or artist
        #[arg(short, long, default_value = "")]
        search: String,
    },
    /// Request a cataloged song
    Request { song_id: i64 },
    /// Submit a free-text request
    Custom {
        title: String,
        #[arg(long)]
        artist: Option<String>,
    },
    /// Keep the board on screen, refreshing as it changes
    Watch {
        #[arg(short, long, default_value = "")]
        search: String,
    },
    /// Operator: add a song to the catalog
    AddSong {
        title: String,
        #[arg(long)]
        artist: Option<String>,
    },
    /// Operator: hide a song from every client
    Hide { song_id: i64 },
    /// Operator: make a hidden song visible again
    Unhide { song_id: i64 },
    /// Operator: delete a single request
    DeleteRequest { request_id: i64 },
    /// Operator: clear all requests
    Reset,
}

impl Command {
    /// Commands acting on this client's own requests and view
    fn is_audience(&self) -> bool {
        matches!(
            self,
            Command::List { .. }
                | Command::Request { .. }
                | Command::Custom { .. }
                | Command::Watch { .. }
        )
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "reqboard_client=info,reqboard_common=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();

    let config = ConfigResolver::new()
        .with_config_path(args.config.clone())
        .with_max_requests(args.max_requests)
        .resolve()
        .context("Invalid configuration")?;

    let db_path = args.db.clone().unwrap_or_else(board_config::default_db_path);
    let state_dir = args
        .state_dir
        .clone()
        .unwrap_or_else(board_config::default_state_dir);

    let pool = init_database(&db_path)
        .await
        .context("Failed to open board database")?;
    let board = Arc::new(
        SqliteBoard::new(pool, ChangeBus::new(config.notification_capacity))
            .await
            .context("Failed to read the change log")?,
    );

    let store = Box::new(FileLedgerStore::new(state_dir));
    let client = Arc::new(BoardClient::new(Arc::clone(&board), store, config));

    if args.command.is_audience() {
        // Resets that happened since this client last ran
        client
            .catch_up_resets()
            .await
            .context("Failed to check for resets")?;
    }

    match args.command {
        Command::List { search } => {
            client.refresh().await.context("Failed to load the board")?;
            print!("{}", render_view(&client.view(), &search));
            println!("{} requests left", client.remaining_quota().await);
        }
        Command::Request { song_id } => {
            submit(&client, RequestTarget::Song(song_id)).await?;
        }
        Command::Custom { title, artist } => {
            submit(&client, RequestTarget::Custom { title, artist }).await?;
        }
        Command::Watch { search } => {
            watch(&board, client, search).await;
        }
        Command::AddSong { title, artist } => {
            let id = board.add_song(&title, artist.as_deref()).await?;
            println!("Added song #{}", id);
        }
        Command::Hide { song_id } => {
            if board.hide_song(song_id).await? {
                println!("Song #{} hidden", song_id);
            } else {
                println!("Song #{} was already hidden", song_id);
            }
        }
        Command::Unhide { song_id } => {
            if board.unhide_song(song_id).await? {
                println!("Song #{} visible again", song_id);
            } else {
                println!("Song #{} was not hidden", song_id);
            }
        }
        Command::DeleteRequest { request_id } => {
            if !board.delete_request(request_id).await? {
                bail!("No request with id {}", request_id);
            }
            println!("Request {} deleted", request_id);
        }
        Command::Reset => {
            let removed = board.clear_requests().await?;
            println!("Cleared {} requests", removed);
        }
    }

    Ok(())
}

async fn submit(client: &BoardClient<SqliteBoard>, target: RequestTarget) -> Result<()> {
    match client.submit(target).await {
        Ok(submission) => {
            println!(
                "Request sent ({} of {} used)",
                submission.ledger_size,
                client.config().max_requests_per_user
            );
            Ok(())
        }
        Err(e) if e.is_retryable() => bail!("{} - please try again", e),
        Err(e) => bail!("{}", e),
    }
}

async fn watch(board: &SqliteBoard, client: Arc<BoardClient<SqliteBoard>>, search: String) {
    let feed = board.spawn_change_feed(client.config().change_poll_interval());
    let mut views = client.subscribe_view();
    let printer = tokio::spawn(async move {
        while views.changed().await.is_ok() {
            let view = views.borrow_and_update().clone();
            println!("{}", render_view(&view, &search));
        }
    });

    client.run(shutdown_signal()).await;
    printer.abort();
    feed.abort();
    info!("Watch finished");
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
