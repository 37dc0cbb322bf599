use std::time::Duration;

use serde::Deserialize;
use shared::{
    domain::{RoomId, UserId},
    protocol::SOCKET_PATH,
};
use url::Url;

use crate::error::ClientError;

pub const DEFAULT_HIST_LEN: usize = 512;
pub const DEFAULT_FEED_CAPACITY: usize = 512;
pub const DEFAULT_PORT: u16 = 9443;
pub const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 6.1; rv:60.0) Gecko/20100101 Firefox/60.0";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Connection attempts per budget before cooling down.
    pub max_attempts: u32,
    pub retry_delay_secs: u64,
    pub cooldown_secs: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 8,
            retry_delay_secs: 5,
            cooldown_secs: 60,
        }
    }
}

impl RetryPolicy {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_secs)
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub host: String,
    pub port: u16,
    pub room: RoomId,
    pub read_only: bool,
    pub user_id: Option<UserId>,
    pub hist_len: usize,
    pub feed_capacity: usize,
    pub cookies: String,
    pub user_agent: String,
    /// `socks5://[user:pass@]host:port`; the socket and the session refresh
    /// both go through it.
    pub proxy: Option<String>,
    pub retry: RetryPolicy,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: "localhost".into(),
            port: DEFAULT_PORT,
            room: RoomId(1),
            read_only: false,
            user_id: None,
            hist_len: DEFAULT_HIST_LEN,
            feed_capacity: DEFAULT_FEED_CAPACITY,
            cookies: String::new(),
            user_agent: USER_AGENT.into(),
            proxy: None,
            retry: RetryPolicy::default(),
        }
    }
}

impl ClientConfig {
    /// Checks the settings that cannot be recovered from at runtime and resolves the socket endpoint.
    pub fn validate(&self) -> Result<Endpoint, ClientError> {
        if self.hist_len == 0 {
            return Err(ClientError::config("hist_len must be at least 1"));
        }
        if self.feed_capacity == 0 {
            return Err(ClientError::config("feed_capacity must be at least 1"));
        }
        if self.retry.max_attempts == 0 {
            return Err(ClientError::config("retry.max_attempts must be at least 1"));
        }
        self.proxy_url()?;
        Endpoint::resolve(&self.host, self.port)
    }

    /// Parsed proxy URL. Only SOCKS5 proxies with an explicit host and port are accepted.
    pub fn proxy_url(&self) -> Result<Option<Url>, ClientError> {
        let Some(proxy) = self.proxy.as_deref().map(str::trim).filter(|p| !p.is_empty()) else {
            return Ok(None);
        };
        let url = Url::parse(proxy)
            .map_err(|err| ClientError::config(format!("invalid proxy {proxy:?}: {err}")))?;
        if !matches!(url.scheme(), "socks5" | "socks5h") {
            return Err(ClientError::config(format!(
                "unsupported proxy scheme {:?}, expected socks5",
                url.scheme()
            )));
        }
        if url.host_str().is_none() || url.port().is_none() {
            return Err(ClientError::config(format!(
                "proxy {proxy:?} needs a host and a port"
            )));
        }
        Ok(Some(url))
    }
}

/// Where the chat socket lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    url: Url,
    host: String,
    port: u16,
}

impl Endpoint {
    /// Builds `ws[s]://host:port/chat.ws` from a bare host or an http(s)/ws(s) URL.
    pub fn resolve(host: &str, port: u16) -> Result<Self, ClientError> {
        if port == 0 {
            return Err(ClientError::config("port must not be 0"));
        }

        let host = host.trim().trim_end_matches('/');
        if host.is_empty() {
            return Err(ClientError::config("host is not defined"));
        }
        let with_scheme = if host.contains("://") {
            host.to_string()
        } else {
            format!("https://{host}")
        };
        let parsed = Url::parse(&with_scheme)
            .map_err(|err| ClientError::config(format!("invalid host {host:?}: {err}")))?;

        let scheme = match parsed.scheme() {
            "https" | "wss" => "wss",
            "http" | "ws" => "ws",
            other => {
                return Err(ClientError::config(format!(
                    "unsupported scheme {other:?} in host {host:?}"
                )))
            }
        };
        let hostname = parsed
            .host_str()
            .ok_or_else(|| ClientError::config(format!("host {host:?} has no hostname")))?
            .to_string();

        let url = Url::parse(&format!("{scheme}://{hostname}:{port}{SOCKET_PATH}"))
            .map_err(|err| ClientError::config(format!("invalid socket url: {err}")))?;

        Ok(Self {
            url,
            host: hostname,
            port,
        })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn is_secure(&self) -> bool {
        self.url.scheme() == "wss"
    }
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
