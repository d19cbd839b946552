//! bookmarks-daemon: Interactive harness for the reconciliation engine.
//!
//! Wires the engine to the in-memory backend and loopback change feed, with
//! every committed mutation echoed back through the feed - the issuer
//! receives its own insert/delete events, the same shape a hosted realtime
//! channel delivers. Useful for poking at the optimistic-update behavior
//! without a server.

use anyhow::Result;
use clap::Parser;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

use bookmarks_daemon::commands::{Command, HELP};

use bookmarks_core::{
    BookmarkClient, BookmarkBackend, BookmarkId, ChangeFeedTransport, LoopbackFeed,
    MemoryBackend, MutationError, UserId,
};

#[derive(Parser, Debug)]
#[command(name = "bookmarks-daemon")]
#[command(about = "Interactive bookmark collection sync harness")]
struct Args {
    /// Sign in as this user on startup
    #[arg(short, long)]
    user: Option<String>,

    /// Enable verbose logging
    #[arg(long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let default_filter = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .init();

    let feed = Arc::new(LoopbackFeed::new());
    let backend = Arc::new(MemoryBackend::with_feed(Arc::clone(&feed)));
    let mut client = BookmarkClient::new(
        backend as Arc<dyn BookmarkBackend>,
        feed as Arc<dyn ChangeFeedTransport>,
    );

    // Trace every engine event; `--verbose` makes them visible.
    let _events = client.subscribe_events(|event| {
        debug!(
            "event: {}",
            serde_json::to_string(&event).unwrap_or_else(|_| format!("{event:?}"))
        );
    });

    if let Some(user) = &args.user {
        client.sign_in(UserId::from(user.as_str())).await?;
    }

    println!("bookmarks-daemon ready (try `help`)");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        match Command::parse(&line) {
            Ok(Command::Quit) => break,
            Ok(command) => run_command(&mut client, command).await,
            Err(reason) => println!("{reason}"),
        }
    }
    Ok(())
}

async fn run_command(client: &mut BookmarkClient, command: Command) {
    match command {
        Command::SignIn(user) => match client.sign_in(UserId::from(user.as_str())).await {
            Ok(()) => println!("signed in as {user} ({} bookmarks)", client.bookmarks().len()),
            Err(e) => warn!("sign-in failed: {}", e),
        },
        Command::SignOut => {
            client.sign_out();
            println!("signed out");
        }
        Command::Add { url, title } => match client.create(&url, &title).await {
            Ok(record) => println!("added {} ({})", record.id, record.title),
            Err(MutationError::CreateRejected { url, title, source }) => {
                // Optimistic record already rolled back; hand the input back.
                println!("add failed ({source}), restored input: {url} {title}");
            }
            Err(e) => println!("add failed: {e}"),
        },
        Command::Remove(id) => match id.parse::<BookmarkId>() {
            Ok(id) => match client.delete(&id).await {
                Ok(()) => println!("removed {id}"),
                Err(e) => println!("remove failed: {e}"),
            },
            Err(e) => println!("bad id: {e}"),
        },
        Command::List => {
            let bookmarks = client.bookmarks();
            if bookmarks.is_empty() {
                println!("(empty)");
            }
            for record in bookmarks {
                let marker = if record.id.is_provisional() { "~" } else { " " };
                println!(
                    "{marker} {} {} {} ({})",
                    record.created_at.format("%Y-%m-%d %H:%M:%S"),
                    record.id,
                    record.title,
                    record.url
                );
            }
        }
        Command::Export => match serde_json::to_string_pretty(&client.bookmarks()) {
            Ok(json) => println!("{json}"),
            Err(e) => warn!("export failed: {}", e),
        },
        Command::State => {
            let owner = client
                .owner()
                .map(|o| o.to_string())
                .unwrap_or_else(|| "(signed out)".into());
            println!("owner: {owner}, feed: {}", client.feed_state());
        }
        Command::Refresh => match client.refresh().await {
            Ok(count) => println!("refreshed, {count} bookmarks"),
            Err(e) => println!("refresh failed: {e}"),
        },
        Command::Resubscribe => match client.restart_feed().await {
            Ok(()) => println!("feed: {}", client.feed_state()),
            Err(e) => println!("resubscribe failed: {e}"),
        },
        Command::Help => println!("{HELP}"),
        Command::Quit => unreachable!("handled by the loop"),
    }
}
