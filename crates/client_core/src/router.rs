use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::{
    error::ClientError,
    feed::FeedHub,
    history::{History, Ingest},
    pool::ObjectPool,
    registry::UserRegistry,
    types::{HistorySnapshot, Message, MessageKind, User},
};

pub enum RouterInput {
    Message(Message),
    Snapshot(oneshot::Sender<HistorySnapshot>),
}

/// Sending side of the router's input queue.
#[derive(Clone)]
pub struct RouterHandle {
    tx: mpsc::Sender<RouterInput>,
}

impl RouterHandle {
    /// Queues a decoded message, waiting for room if the router is behind.
    pub async fn submit(&self, msg: Message) -> Result<(), ClientError> {
        self.tx
            .send(RouterInput::Message(msg))
            .await
            .map_err(|_| ClientError::Closed)
    }

    /// Queues a message only if there is room right now.
    pub fn offer(&self, msg: Message) -> bool {
        self.tx.try_send(RouterInput::Message(msg)).is_ok()
    }

    /// Current history, read through the router task.
    pub async fn snapshot(&self) -> Result<HistorySnapshot, ClientError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(RouterInput::Snapshot(reply))
            .await
            .map_err(|_| ClientError::Closed)?;
        rx.await.map_err(|_| ClientError::Closed)
    }
}

/// Emits locally produced status lines as `System`/`Debug` messages.
///
/// Status is best effort: if the router queue is full the line is only logged.
#[derive(Clone)]
pub struct StatusReporter {
    router: RouterHandle,
    pool: Arc<ObjectPool>,
    author: Arc<User>,
}

impl StatusReporter {
    pub fn new(router: RouterHandle, pool: Arc<ObjectPool>, author: Arc<User>) -> Self {
        Self {
            router,
            pool,
            author,
        }
    }

    pub fn info(&self, text: impl Into<String>) {
        self.emit(MessageKind::System, text.into());
    }

    pub fn debug(&self, text: impl Into<String>) {
        self.emit(MessageKind::Debug, text.into());
    }

    fn emit(&self, kind: MessageKind, text: String) {
        let mut msg = self.pool.new_message();
        msg.author = Some(Arc::clone(&self.author));
        msg.kind = kind;
        msg.created_at = chrono::Utc::now().timestamp();
        msg.body_raw.push_str(&text);
        msg.body = text;
        if !self.router.offer(msg) {
            debug!(kind = ?kind, "router: queue full, status line not delivered");
        }
    }
}

pub struct Router {
    history: History,
    feeds: FeedHub,
    snapshots: watch::Sender<HistorySnapshot>,
    registry: Arc<UserRegistry>,
    pool: Arc<ObjectPool>,
    input: mpsc::Receiver<RouterInput>,
}

impl Router {
    pub fn new(
        hist_len: usize,
        feeds: FeedHub,
        registry: Arc<UserRegistry>,
        pool: Arc<ObjectPool>,
    ) -> (Self, RouterHandle, watch::Receiver<HistorySnapshot>) {
        let (tx, input) = mpsc::channel(hist_len.max(1));
        let (snapshots, snapshot_rx) = watch::channel(HistorySnapshot::default());
        let router = Self {
            history: History::new(hist_len, Arc::clone(&pool)),
            feeds,
            snapshots,
            registry,
            pool,
            input,
        };
        (router, RouterHandle { tx }, snapshot_rx)
    }

    pub async fn run(mut self, cancel: CancellationToken) {
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                input = self.input.recv() => match input {
                    Some(input) => self.handle(input),
                    None => break,
                },
            }
        }
        self.feeds.close_all();
        info!(retained = self.history.len(), "router: stopped");
    }

    pub fn handle(&mut self, input: RouterInput) {
        match input {
            RouterInput::Message(msg) => self.route(msg),
            RouterInput::Snapshot(reply) => {
                let _ = reply.send(self.history.snapshot());
            }
        }
    }

    /// Applies `msg` to the history before any consumer sees it.
    fn route(&mut self, mut msg: Message) {
        if !msg.is_chat() {
            self.feeds.deliver(&msg);
            self.pool.release_message(msg);
            return;
        }

        self.flag_mention(&mut msg);
        match self.history.ingest(msg) {
            Ingest::Appended => {
                if let Some(appended) = self.history.latest() {
                    self.feeds.deliver(appended);
                }
            }
            Ingest::Edited(index) => {
                if let Some(edited) = self.history.get(index) {
                    debug!(message_id = edited.id.0, index, "router: edit spliced");
                    self.feeds.deliver(edited);
                }
                self.snapshots.send_replace(self.history.snapshot());
            }
            Ingest::Orphaned => {}
        }
    }

    fn flag_mention(&self, msg: &mut Message) {
        if msg.is_mention {
            return;
        }
        let name = self.registry.client_name();
        if name.is_empty() {
            return;
        }
        msg.is_mention = msg.body_raw.contains(&format!("@{name}"));
    }
}

#[cfg(test)]
#[path = "tests/router_tests.rs"]
mod tests;
