use std::sync::Arc;

use anyhow::{Context, Result};
use reqwest::{Client, Proxy};
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::info;

pub mod config;
pub mod decoder;
pub mod dial;
pub mod error;
pub mod feed;
pub mod history;
pub mod markup;
pub mod notify;
pub mod outbound;
pub mod pool;
pub mod registry;
pub mod router;
pub mod session;
pub mod transport;
pub mod types;

pub use config::{ClientConfig, Endpoint, RetryPolicy};
pub use dial::{DirectDialer, Dialer, SocksDialer};
pub use error::{ClientError, ProtocolError, TransportError};
pub use feed::{Feed, FeedCloser};
pub use notify::ReplyTracker;
pub use outbound::CommandSender;
pub use session::{HttpSessionRefresher, SessionRefresher, StaticSession};
pub use transport::ConnectionState;
pub use types::{HistorySnapshot, Message, MessageKind, User, UserColor};

use decoder::Decoder;
use feed::FeedHub;
use outbound::OutboundPolicy;
use pool::ObjectPool;
use registry::UserRegistry;
use router::{Router, RouterHandle, StatusReporter};
use session::Session;
use transport::{Transport, TransportLinks};

/// Raw frames waiting for the decoder.
const FRAME_QUEUE: usize = 64;
/// Outgoing lines waiting for the socket.
const COMMAND_QUEUE: usize = 32;

/// Composition root: owns the registry, pool, router, decoder and transport
/// and hands out the narrow handles consumers need.
///
/// Handles (feeds, commands, history updates, the router handle) are taken
/// before [`ChatClient::run`] consumes the client.
pub struct ChatClient {
    registry: Arc<UserRegistry>,
    pool: Arc<ObjectPool>,
    feeds: FeedHub,
    router_handle: RouterHandle,
    history: watch::Receiver<HistorySnapshot>,
    state: watch::Receiver<ConnectionState>,
    commands: CommandSender,
    cancel: CancellationToken,
    tasks: ClientTasks,
}

struct ClientTasks {
    router: Router,
    decoder: Decoder,
    transport: Transport,
    frames: mpsc::Receiver<String>,
    status: StatusReporter,
}

/// Socket dialer and HTTP client that share the configured route.
pub fn network_route(config: &ClientConfig) -> Result<(Arc<dyn Dialer>, Client), ClientError> {
    let Some(proxy) = config.proxy_url()? else {
        return Ok((Arc::new(DirectDialer), Client::new()));
    };
    let dialer = SocksDialer::from_url(&proxy).map_err(|err| ClientError::config(err.to_string()))?;
    let http = Client::builder()
        .proxy(Proxy::all(proxy.as_str()).map_err(|err| ClientError::config(err.to_string()))?)
        .build()
        .map_err(|err| ClientError::config(err.to_string()))?;
    info!(proxy = dialer.proxy(), "routing chat traffic through socks5 proxy");
    Ok((Arc::new(dialer), http))
}

impl ChatClient {
    /// Connects directly or through the configured proxy; expired sessions are
    /// renewed over HTTP against the chat host along the same route.
    pub fn new(config: ClientConfig, cancel: CancellationToken) -> Result<Self, ClientError> {
        let endpoint = config.validate()?;
        let (dialer, http) = network_route(&config)?;
        let refresher =
            HttpSessionRefresher::for_endpoint(http, &endpoint, config.user_agent.clone())
                .map_err(|err| ClientError::config(err.to_string()))?;
        Self::new_with_dependencies(config, dialer, Arc::new(refresher), cancel)
    }

    pub fn new_with_dependencies(
        config: ClientConfig,
        dialer: Arc<dyn Dialer>,
        refresher: Arc<dyn SessionRefresher>,
        cancel: CancellationToken,
    ) -> Result<Self, ClientError> {
        let endpoint = config.validate()?;

        let pool = Arc::new(ObjectPool::default());
        let registry = Arc::new(UserRegistry::new(config.user_id, Arc::clone(&pool)));
        let feeds = FeedHub::new(config.feed_capacity);
        let (router, router_handle, history) = Router::new(
            config.hist_len,
            feeds.clone(),
            Arc::clone(&registry),
            Arc::clone(&pool),
        );
        let status = StatusReporter::new(
            router_handle.clone(),
            Arc::clone(&pool),
            registry.system_user(),
        );

        let (frames_tx, frames) = mpsc::channel(FRAME_QUEUE);
        let (commands_tx, outbound) = mpsc::channel(COMMAND_QUEUE);
        let (state_tx, state) = watch::channel(ConnectionState::Disconnected);
        let transport = Transport::new(
            endpoint,
            Session::from_config(&config),
            dialer,
            refresher,
            config.retry.clone(),
            OutboundPolicy {
                read_only: config.read_only,
            },
            TransportLinks {
                frames: frames_tx,
                status: status.clone(),
                outbound,
                state: state_tx,
            },
        );

        Ok(Self {
            tasks: ClientTasks {
                router,
                decoder: Decoder::new(Arc::clone(&registry), Arc::clone(&pool)),
                transport,
                frames,
                status,
            },
            registry,
            pool,
            feeds,
            router_handle,
            history,
            state,
            commands: CommandSender::new(commands_tx, cancel.clone()),
            cancel,
        })
    }

    /// New live feed. Dropping or closing it unregisters it lazily.
    pub fn register_feed(&self) -> Feed {
        self.feeds.register()
    }

    /// Full history, re-published whenever an edit changes an existing entry.
    pub fn history_updates(&self) -> watch::Receiver<HistorySnapshot> {
        self.history.clone()
    }

    pub fn state(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }

    pub fn commands(&self) -> CommandSender {
        self.commands.clone()
    }

    pub fn router(&self) -> RouterHandle {
        self.router_handle.clone()
    }

    /// Current history, read through the router.
    pub async fn snapshot(&self) -> Result<HistorySnapshot, ClientError> {
        self.router_handle.snapshot().await
    }

    pub fn registry(&self) -> Arc<UserRegistry> {
        Arc::clone(&self.registry)
    }

    pub fn pool(&self) -> Arc<ObjectPool> {
        Arc::clone(&self.pool)
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Runs the router, decoder and transport tasks until the cancellation
    /// token fires, then waits for all three to wind down.
    pub async fn run(self) -> Result<()> {
        let ClientTasks {
            router,
            decoder,
            transport,
            frames,
            status,
        } = self.tasks;

        let router_task = tokio::spawn(router.run(self.cancel.clone()));
        let decoder_task = tokio::spawn(decoder.run(
            frames,
            self.router_handle.clone(),
            status,
            self.cancel.clone(),
        ));
        let transport_task = tokio::spawn(transport.run(self.cancel.clone()));

        transport_task.await.context("transport task failed")?;
        decoder_task.await.context("decoder task failed")?;
        router_task.await.context("router task failed")?;
        info!(users = self.registry.len(), "client: stopped");
        Ok(())
    }
}

#[cfg(test)]
#[path = "tests/support.rs"]
mod test_support;

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
