use std::io;

use async_trait::async_trait;
use tokio::{
    io::{AsyncRead, AsyncWrite},
    net::TcpStream,
};
use tokio_socks::tcp::Socks5Stream;
use tracing::debug;
use url::Url;

/// Byte stream the websocket handshake runs over.
pub trait DialStream: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T> DialStream for T where T: AsyncRead + AsyncWrite + Send + Unpin {}

pub type BoxedStream = Box<dyn DialStream>;

/// Opens raw connections for the transport.
///
/// The transport does not care how the bytes get there: directly, through a
/// SOCKS5 proxy, or through an embedded Tor client all look the same.
#[async_trait]
pub trait Dialer: Send + Sync {
    async fn dial(&self, host: &str, port: u16) -> io::Result<BoxedStream>;

    /// Releases resources owned by the dialer (proxy sessions, a Tor process).
    /// Called once when the client shuts down.
    async fn shutdown(&self) {}

    fn name(&self) -> &'static str;
}

pub struct DirectDialer;

#[async_trait]
impl Dialer for DirectDialer {
    async fn dial(&self, host: &str, port: u16) -> io::Result<BoxedStream> {
        let stream = TcpStream::connect((host, port)).await?;
        stream.set_nodelay(true)?;
        Ok(Box::new(stream))
    }

    fn name(&self) -> &'static str {
        "direct"
    }
}

/// Tunnels every connection through a SOCKS5 proxy. Target names are
/// resolved by the proxy.
#[derive(Debug, Clone)]
pub struct SocksDialer {
    proxy: String,
    credentials: Option<(String, String)>,
}

impl SocksDialer {
    pub fn new(proxy: impl Into<String>) -> Self {
        Self {
            proxy: proxy.into(),
            credentials: None,
        }
    }

    pub fn with_credentials(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.credentials = Some((username.into(), password.into()));
        self
    }

    /// From a `socks5://[user:pass@]host:port` URL.
    pub fn from_url(url: &Url) -> io::Result<Self> {
        let host = url
            .host_str()
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "proxy has no host"))?;
        let port = url
            .port()
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "proxy has no port"))?;
        let dialer = Self::new(format!("{host}:{port}"));
        Ok(match url.username() {
            "" => dialer,
            user => dialer.with_credentials(user, url.password().unwrap_or_default()),
        })
    }

    pub fn proxy(&self) -> &str {
        &self.proxy
    }
}

#[async_trait]
impl Dialer for SocksDialer {
    async fn dial(&self, host: &str, port: u16) -> io::Result<BoxedStream> {
        debug!(proxy = %self.proxy, host, port, "dial: opening socks5 tunnel");
        let stream = match &self.credentials {
            Some((user, password)) => {
                Socks5Stream::connect_with_password(
                    self.proxy.as_str(),
                    (host, port),
                    user,
                    password,
                )
                .await
            }
            None => Socks5Stream::connect(self.proxy.as_str(), (host, port)).await,
        }
        .map_err(io::Error::other)?;
        Ok(Box::new(stream))
    }

    fn name(&self) -> &'static str {
        "socks5"
    }
}

#[cfg(test)]
#[path = "tests/dial_tests.rs"]
mod tests;
