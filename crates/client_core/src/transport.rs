use std::{collections::VecDeque, sync::Arc, time::Duration};

use futures::{
    stream::{SplitSink, SplitStream},
    SinkExt, StreamExt,
};
use shared::{
    domain::RoomId,
    protocol::{classify_frame, FrameKind},
};
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::{
    client_async_tls,
    tungstenite::{
        client::IntoClientRequest,
        handshake::client::Request,
        http::{header, HeaderValue},
        Message as WsMessage,
    },
    MaybeTlsStream, WebSocketStream,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::{
    config::{Endpoint, RetryPolicy},
    dial::{BoxedStream, Dialer},
    error::{ClientError, TransportError},
    outbound::{OutboundCommand, OutboundPolicy},
    router::StatusReporter,
    session::{Session, SessionRefresher},
};

pub type WsStream = WebSocketStream<MaybeTlsStream<BoxedStream>>;
type WsSink = SplitSink<WsStream, WsMessage>;
type WsSource = SplitStream<WsStream>;

const CLOSE_GRACE: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Joined,
    Streaming,
    Reconnecting,
    CoolingDown,
    Closed,
}

/// Channels connecting the transport to the rest of the client.
pub struct TransportLinks {
    /// Raw JSON frames for the decoder.
    pub frames: mpsc::Sender<String>,
    pub status: StatusReporter,
    /// Text queued through a `CommandSender`.
    pub outbound: mpsc::Receiver<String>,
    pub state: watch::Sender<ConnectionState>,
}

/// Why a socket stopped being served.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Served {
    Cancelled,
    Dropped,
    Expired,
}

/// Outgoing side of the connection. Lives in the writer task while a socket
/// is up and comes back to the transport between connections.
struct Outbox {
    rx: mpsc::Receiver<String>,
    open: bool,
    pending: VecDeque<OutboundCommand>,
    policy: OutboundPolicy,
}

impl Outbox {
    fn enqueue(&mut self, text: &str) {
        let command = match OutboundCommand::parse(text) {
            Ok(command) => command,
            Err(err) => {
                debug!(error = %err, "transport: ignoring outgoing text");
                return;
            }
        };
        if !self.policy.admits(&command) {
            debug!("transport: read-only, outgoing text dropped");
            return;
        }
        self.pending.push_back(command);
    }

    /// A failed chat line goes back to the front; a failed join does not,
    /// the reconnect queues its own.
    fn requeue(&mut self, command: OutboundCommand) {
        if !command.is_join() {
            self.pending.push_front(command);
        }
    }
}

enum WriterExit {
    Stopped,
    Failed(TransportError),
}

/// Write loop for one socket.
struct Writer {
    outbox: Outbox,
    sink: WsSink,
    room: RoomId,
}

impl Writer {
    /// Drains the outbox until `stop` fires or a write fails. A failed write
    /// cancels `stop` so the reader gives the socket up too. Hands the outbox
    /// and the last joined room back.
    async fn run(
        mut self,
        stop: CancellationToken,
        shutdown: CancellationToken,
    ) -> (Outbox, RoomId) {
        match self.pump(&stop).await {
            WriterExit::Failed(err) => {
                warn!(
                    error = %err,
                    pending = self.outbox.pending.len(),
                    "transport: write failed"
                );
                stop.cancel();
            }
            WriterExit::Stopped if shutdown.is_cancelled() => {
                let _ = tokio::time::timeout(CLOSE_GRACE, self.sink.close()).await;
            }
            WriterExit::Stopped => {}
        }
        (self.outbox, self.room)
    }

    async fn pump(&mut self, stop: &CancellationToken) -> WriterExit {
        loop {
            while let Some(command) = self.outbox.pending.pop_front() {
                // The room counts as requested once the join is on its way.
                if let OutboundCommand::Join(room) = command {
                    self.room = room;
                }
                let sent = tokio::select! {
                    biased;
                    _ = stop.cancelled() => None,
                    sent = self.sink.send(WsMessage::Text(command.payload())) => Some(sent),
                };
                match sent {
                    Some(Ok(())) => {}
                    Some(Err(err)) => {
                        self.outbox.requeue(command);
                        return WriterExit::Failed(TransportError::Write(err));
                    }
                    None => {
                        self.outbox.requeue(command);
                        return WriterExit::Stopped;
                    }
                }
            }

            let text = tokio::select! {
                biased;
                _ = stop.cancelled() => return WriterExit::Stopped,
                text = self.outbox.rx.recv(), if self.outbox.open => text,
            };
            match text {
                Some(text) => self.outbox.enqueue(&text),
                None => self.outbox.open = false,
            }
        }
    }
}

/// Owns the socket: connects, reconnects within the retry budget, refreshes
/// the session on expiry and runs the read and write loops of each connection.
pub struct Transport {
    endpoint: Endpoint,
    session: Session,
    dialer: Arc<dyn Dialer>,
    refresher: Arc<dyn SessionRefresher>,
    retry: RetryPolicy,
    frames: mpsc::Sender<String>,
    status: StatusReporter,
    // `None` only while a writer task holds it.
    outbox: Option<Outbox>,
    state: watch::Sender<ConnectionState>,
    // Set by a session expiry, cleared by the next valid JSON frame.
    expired: bool,
}

impl Transport {
    pub fn new(
        endpoint: Endpoint,
        session: Session,
        dialer: Arc<dyn Dialer>,
        refresher: Arc<dyn SessionRefresher>,
        retry: RetryPolicy,
        policy: OutboundPolicy,
        links: TransportLinks,
    ) -> Self {
        Self {
            endpoint,
            session,
            dialer,
            refresher,
            retry,
            frames: links.frames,
            status: links.status,
            outbox: Some(Outbox {
                rx: links.outbound,
                open: true,
                pending: VecDeque::new(),
                policy,
            }),
            state: links.state,
            expired: false,
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Runs until `cancel` fires. Connection failures never end the loop.
    pub async fn run(mut self, cancel: CancellationToken) {
        let mut socket = self.reconnect(&cancel, false).await;
        while let Some(ws) = socket {
            socket = match self.serve(ws, &cancel).await {
                Served::Cancelled => None,
                Served::Dropped => self.reconnect(&cancel, true).await,
                Served::Expired => {
                    if self.expired {
                        self.status
                            .info("Unable to join chat. Cookies possibly expired.");
                        self.set_state(ConnectionState::CoolingDown);
                        if !pause(&cancel, self.retry.cooldown()).await {
                            break;
                        }
                    }
                    self.expired = true;
                    self.refresh_session(&cancel).await;
                    self.reconnect(&cancel, false).await
                }
            };
        }

        self.dialer.shutdown().await;
        self.set_state(ConnectionState::Closed);
        info!(dialer = self.dialer.name(), "transport: closed");
    }

    /// Dials and performs the websocket handshake, then queues the room join.
    pub async fn connect(&mut self) -> Result<WsStream, ClientError> {
        self.set_state(ConnectionState::Connecting);
        self.status.debug("Opening socket...");

        let (host, port) = (self.endpoint.host(), self.endpoint.port());
        let stream = self
            .dialer
            .dial(host, port)
            .await
            .map_err(|source| TransportError::Dial {
                addr: format!("{host}:{port}"),
                source,
            })?;
        let request = self.handshake_request()?;
        let (ws, _) = client_async_tls(request, stream)
            .await
            .map_err(TransportError::Handshake)?;

        let room = self.session.room;
        if let Some(outbox) = self.outbox.as_mut() {
            outbox.pending.push_front(OutboundCommand::Join(room));
        }
        self.set_state(ConnectionState::Joined);
        info!(
            url = %self.endpoint.url(),
            room = %room,
            dialer = self.dialer.name(),
            "transport: connected"
        );
        self.status.info("Connected.");
        Ok(ws)
    }

    fn handshake_request(&self) -> Result<Request, TransportError> {
        let mut request = self
            .endpoint
            .url()
            .as_str()
            .into_client_request()
            .map_err(TransportError::Handshake)?;
        let headers = request.headers_mut();
        headers.insert(
            header::USER_AGENT,
            header_value("User-Agent", &self.session.user_agent)?,
        );
        if !self.session.cookie.is_empty() {
            headers.insert(header::COOKIE, header_value("Cookie", &self.session.cookie)?);
        }
        Ok(request)
    }

    /// Connects within the retry budget. Exhausting the budget waits out the
    /// cooldown and starts a fresh budget. `None` only once cancelled.
    async fn reconnect(&mut self, cancel: &CancellationToken, settle: bool) -> Option<WsStream> {
        if settle {
            self.set_state(ConnectionState::Reconnecting);
            if !pause(cancel, self.retry.retry_delay()).await {
                return None;
            }
        }

        let mut failures = 0u32;
        loop {
            let attempt = tokio::select! {
                biased;
                _ = cancel.cancelled() => return None,
                attempt = self.connect() => attempt,
            };
            let err = match attempt {
                Ok(ws) => return Some(ws),
                Err(err) => err,
            };

            failures += 1;
            warn!(
                attempt = failures,
                budget = self.retry.max_attempts,
                error = %err,
                "transport: connect failed"
            );
            let wait = if failures >= self.retry.max_attempts {
                self.status.info(format!(
                    "Failed to connect {failures} times. Waiting {}s before retrying.",
                    self.retry.cooldown_secs
                ));
                failures = 0;
                self.set_state(ConnectionState::CoolingDown);
                self.retry.cooldown()
            } else {
                self.set_state(ConnectionState::Reconnecting);
                self.retry.retry_delay()
            };
            if !pause(cancel, wait).await {
                return None;
            }
        }
    }

    /// Hands the sink to a writer task and reads on this one. Either side
    /// ending cancels the connection's `stop` token and the other follows.
    async fn serve(&mut self, ws: WsStream, cancel: &CancellationToken) -> Served {
        let Some(outbox) = self.outbox.take() else {
            error!("transport: outgoing queue lost");
            return Served::Cancelled;
        };
        self.set_state(ConnectionState::Streaming);

        let (sink, mut source) = ws.split();
        let stop = cancel.child_token();
        let writer = Writer {
            outbox,
            sink,
            room: self.session.room,
        };
        let writer = tokio::spawn(writer.run(stop.clone(), cancel.clone()));

        let served = self.read_loop(&mut source, &stop, cancel).await;
        stop.cancel();

        match writer.await {
            Ok((outbox, room)) => {
                self.outbox = Some(outbox);
                self.session.room = room;
                served
            }
            Err(err) => {
                error!(error = %err, "transport: writer task failed");
                Served::Cancelled
            }
        }
    }

    async fn read_loop(
        &mut self,
        source: &mut WsSource,
        stop: &CancellationToken,
        cancel: &CancellationToken,
    ) -> Served {
        loop {
            let frame = tokio::select! {
                biased;
                _ = stop.cancelled() => return stopped(cancel),
                frame = source.next() => frame,
            };

            match frame {
                Some(Ok(WsMessage::Text(text))) => {
                    if let Some(served) = self.on_text(text, stop, cancel).await {
                        return served;
                    }
                }
                Some(Ok(WsMessage::Close(_))) | None => {
                    warn!(error = %TransportError::ClosedByPeer, "transport: read failed");
                    self.status.info("Failed to read from socket.");
                    return Served::Dropped;
                }
                Some(Ok(_)) => {}
                Some(Err(err)) => {
                    warn!(error = %TransportError::Read(err), "transport: read failed");
                    self.status.info("Failed to read from socket.");
                    return Served::Dropped;
                }
            }
        }
    }

    async fn on_text(
        &mut self,
        text: String,
        stop: &CancellationToken,
        cancel: &CancellationToken,
    ) -> Option<Served> {
        match classify_frame(&text) {
            FrameKind::Json => {
                self.expired = false;
                let forwarded = tokio::select! {
                    biased;
                    _ = stop.cancelled() => None,
                    sent = self.frames.send(text) => Some(sent.is_ok()),
                };
                match forwarded {
                    None => Some(stopped(cancel)),
                    Some(false) => {
                        debug!("transport: decoder gone");
                        Some(Served::Cancelled)
                    }
                    Some(true) => None,
                }
            }
            FrameKind::SessionExpired => {
                warn!(error = %ClientError::SessionExpired(text), "transport: session rejected");
                Some(Served::Expired)
            }
            FrameKind::Notice => {
                self.status.info(text);
                None
            }
        }
    }

    async fn refresh_session(&mut self, cancel: &CancellationToken) {
        let refreshed = tokio::select! {
            biased;
            _ = cancel.cancelled() => return,
            refreshed = self.refresher.refresh_session(&self.session.cookie) => refreshed,
        };
        match refreshed {
            Ok(cookie) => {
                info!("transport: session refreshed");
                self.session.cookie = cookie;
            }
            Err(err) => warn!(error = %err, "transport: session refresh failed"),
        }
    }

    fn set_state(&self, state: ConnectionState) {
        let previous = self.state.send_replace(state);
        if previous != state {
            debug!(from = ?previous, to = ?state, "transport: state changed");
        }
    }
}

/// Outcome when the connection's stop token fired: shutdown or a failed write.
fn stopped(cancel: &CancellationToken) -> Served {
    if cancel.is_cancelled() {
        Served::Cancelled
    } else {
        Served::Dropped
    }
}

fn header_value(name: &'static str, value: &str) -> Result<HeaderValue, TransportError> {
    HeaderValue::from_str(value).map_err(|err| TransportError::Header {
        name,
        reason: err.to_string(),
    })
}

/// Sleeps for `wait`; false if cancelled first.
async fn pause(cancel: &CancellationToken, wait: Duration) -> bool {
    tokio::select! {
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(wait) => true,
    }
}

#[cfg(test)]
#[path = "tests/transport_tests.rs"]
mod tests;
