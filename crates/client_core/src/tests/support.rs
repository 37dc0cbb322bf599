use std::{net::SocketAddr, time::Duration};

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    http::{header, HeaderMap, HeaderName},
    response::IntoResponse,
    routing::get,
    Router,
};
use futures::{SinkExt, StreamExt};
use tokio::{net::TcpListener, sync::mpsc};

use crate::{feed::Feed, types::Message as ChatMessage};

/// Text the scripted server closes the socket on.
pub const KICK: &str = "/kick";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Seen {
    Handshake { cookie: String, user_agent: String },
    Text(String),
}

/// Frames pushed once the client's first text arrives, chosen by request cookie.
pub type Script = fn(&str) -> Vec<String>;

#[derive(Clone)]
struct ChatServer {
    seen: mpsc::UnboundedSender<Seen>,
    script: Script,
}

pub async fn spawn_chat_server(
    script: Script,
) -> anyhow::Result<(SocketAddr, mpsc::UnboundedReceiver<Seen>)> {
    std::env::set_var("NO_PROXY", "127.0.0.1,localhost");
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let (seen, seen_rx) = mpsc::unbounded_channel();
    let app = Router::new()
        .route("/chat.ws", get(ws_handler))
        .with_state(ChatServer { seen, script });
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    Ok((addr, seen_rx))
}

fn header_text(headers: &HeaderMap, name: HeaderName) -> String {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
        .to_string()
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    headers: HeaderMap,
    State(server): State<ChatServer>,
) -> impl IntoResponse {
    let cookie = header_text(&headers, header::COOKIE);
    let _ = server.seen.send(Seen::Handshake {
        cookie: cookie.clone(),
        user_agent: header_text(&headers, header::USER_AGENT),
    });
    ws.on_upgrade(move |socket| serve_chat(server, socket, cookie))
}

async fn serve_chat(server: ChatServer, socket: WebSocket, cookie: String) {
    let (mut sender, mut receiver) = socket.split();
    let mut scripted = false;

    while let Some(Ok(msg)) = receiver.next().await {
        let Message::Text(text) = msg else {
            continue;
        };
        let kicked = text == KICK;
        let _ = server.seen.send(Seen::Text(text));
        if kicked {
            let _ = sender.close().await;
            return;
        }
        if !scripted {
            scripted = true;
            for frame in (server.script)(&cookie) {
                if sender.send(Message::Text(frame)).await.is_err() {
                    return;
                }
            }
        }
    }
}

pub async fn next_seen(seen: &mut mpsc::UnboundedReceiver<Seen>) -> Seen {
    tokio::time::timeout(Duration::from_secs(5), seen.recv())
        .await
        .expect("server saw nothing in time")
        .expect("server gone")
}

/// Reads `feed` until a message with `body` shows up.
pub async fn wait_for_body(feed: &mut Feed, body: &str) -> ChatMessage {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let msg = feed.recv().await.expect("feed closed");
            if msg.body == body {
                return msg;
            }
        }
    })
    .await
    .expect("message never delivered")
}

pub fn no_frames(_cookie: &str) -> Vec<String> {
    Vec::new()
}
