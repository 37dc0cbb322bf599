mod config;

use anyhow::{Context, Result};
use chrono::{DateTime, Local, Utc};
use clap::Parser;
use client_core::{
    ChatClient, ClientError, CommandSender, Feed, HistorySnapshot, Message, MessageKind,
    ReplyTracker,
};
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::{load_settings, Cli};

const QUIT: &str = "/quit";

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = load_settings(&cli)?;
    let cancel = CancellationToken::new();
    let client = ChatClient::new(config, cancel.clone()).context("failed to start chat client")?;

    let printer = tokio::spawn(print_feed(client.register_feed(), cli.debug));
    let logger = tokio::spawn(log_feed(client.register_feed()));
    let notifier = tokio::spawn(notify_feed(client.register_feed()));
    tokio::spawn(watch_resyncs(client.history_updates(), cancel.clone()));
    tokio::spawn(read_input(client.commands(), cancel.clone()));
    let run = tokio::spawn(client.run());

    tokio::select! {
        _ = tokio::signal::ctrl_c() => info!("interrupted, shutting down"),
        _ = cancel.cancelled() => {}
    }
    cancel.cancel();

    run.await.context("client task panicked")??;
    let _ = tokio::join!(printer, logger, notifier);
    Ok(())
}

fn clock(timestamp: i64) -> String {
    DateTime::<Utc>::from_timestamp(timestamp, 0)
        .map(|at| at.with_timezone(&Local).format("%H:%M:%S").to_string())
        .unwrap_or_else(|| "--:--:--".to_string())
}

fn render(msg: &Message) -> String {
    match msg.kind {
        MessageKind::Chat => {
            let mark = if msg.is_mention { "*" } else { " " };
            let edited = if msg.is_edited() { " (edited)" } else { "" };
            format!(
                "[{}]{mark}<{}> {}{edited}",
                clock(msg.revised_at()),
                msg.author_name(),
                msg.body_raw
            )
        }
        MessageKind::System => format!("[{}] -!- {}", clock(msg.created_at), msg.body),
        MessageKind::Debug => format!("[{}] -?- {}", clock(msg.created_at), msg.body),
    }
}

async fn print_feed(mut feed: Feed, show_debug: bool) {
    while let Some(msg) = feed.recv().await {
        if msg.kind == MessageKind::Debug && !show_debug {
            continue;
        }
        println!("{}", render(&msg));
    }
    if feed.dropped() > 0 {
        warn!(dropped = feed.dropped(), "printer: fell behind");
    }
}

async fn log_feed(mut feed: Feed) {
    while let Some(msg) = feed.recv().await {
        if !msg.is_chat() {
            continue;
        }
        info!(
            target: "chatlog",
            id = %msg.id,
            room = %msg.room,
            author = msg.author_name(),
            edited = msg.is_edited(),
            "{}",
            msg.body_raw
        );
    }
}

async fn notify_feed(mut feed: Feed) {
    let mut replies = ReplyTracker::new();
    while let Some(msg) = feed.recv().await {
        if replies.observe(&msg) {
            info!(target: "notify", from = msg.author_name(), "{}", msg.body_raw);
        }
    }
}

async fn watch_resyncs(mut history: watch::Receiver<HistorySnapshot>, cancel: CancellationToken) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            changed = history.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }
        let snapshot = history.borrow_and_update().clone();
        println!("-- history resynced, {} messages --", snapshot.len());
        for msg in snapshot.messages() {
            println!("{}", render(msg));
        }
    }
}

/// Stdin is read on a plain thread so a pending read never holds up runtime shutdown.
fn spawn_stdin_reader() -> mpsc::Receiver<String> {
    let (tx, rx) = mpsc::channel(16);
    std::thread::spawn(move || {
        for line in std::io::stdin().lines() {
            let line = match line {
                Ok(line) => line,
                Err(err) => {
                    warn!(error = %err, "input: failed to read stdin");
                    break;
                }
            };
            if tx.blocking_send(line).is_err() {
                break;
            }
        }
    });
    rx
}

async fn read_input(commands: CommandSender, cancel: CancellationToken) {
    let mut lines = spawn_stdin_reader();
    loop {
        let line = tokio::select! {
            _ = cancel.cancelled() => break,
            line = lines.recv() => match line {
                Some(line) => line,
                None => break,
            },
        };
        if line.trim() == QUIT {
            cancel.cancel();
            break;
        }
        match commands.send(&line).await {
            Ok(()) | Err(ClientError::EmptyCommand) => {}
            Err(err) => {
                warn!(error = %err, "input: command not queued");
                break;
            }
        }
    }
}
