use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::{
    header::{COOKIE, SET_COOKIE, USER_AGENT},
    Client,
};
use shared::domain::RoomId;
use tracing::info;
use url::Url;

use crate::config::{ClientConfig, Endpoint};

/// Transport-level session state. The active room survives reconnects so the
/// client rejoins whatever room was last requested.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub room: RoomId,
    pub cookie: String,
    pub user_agent: String,
}

impl Session {
    pub fn from_config(config: &ClientConfig) -> Self {
        Self {
            room: config.room,
            cookie: config.cookies.trim().to_string(),
            user_agent: config.user_agent.clone(),
        }
    }
}

/// Obtains a fresh session cookie once the server reports the current one expired.
#[async_trait]
pub trait SessionRefresher: Send + Sync {
    async fn refresh_session(&self, cookie: &str) -> Result<String>;
}

/// A fixed cookie that cannot be renewed.
pub struct StaticSession;

#[async_trait]
impl SessionRefresher for StaticSession {
    async fn refresh_session(&self, _cookie: &str) -> Result<String> {
        Err(anyhow!("session refresh is not configured"))
    }
}

/// Renews the session by loading the site root with the current cookie and
/// keeping whatever cookies the server sets in response.
pub struct HttpSessionRefresher {
    http: Client,
    site: Url,
    user_agent: String,
}

impl HttpSessionRefresher {
    pub fn new(http: Client, site: Url, user_agent: impl Into<String>) -> Self {
        Self {
            http,
            site,
            user_agent: user_agent.into(),
        }
    }

    /// Site root derived from the socket endpoint.
    pub fn for_endpoint(http: Client, endpoint: &Endpoint, user_agent: impl Into<String>) -> Result<Self> {
        let scheme = if endpoint.is_secure() { "https" } else { "http" };
        let site = Url::parse(&format!("{scheme}://{}:{}/", endpoint.host(), endpoint.port()))
            .with_context(|| format!("invalid site url for host {}", endpoint.host()))?;
        Ok(Self::new(http, site, user_agent))
    }
}

#[async_trait]
impl SessionRefresher for HttpSessionRefresher {
    async fn refresh_session(&self, cookie: &str) -> Result<String> {
        let res = self
            .http
            .get(self.site.clone())
            .header(COOKIE, cookie)
            .header(USER_AGENT, &self.user_agent)
            .send()
            .await
            .with_context(|| format!("failed to refresh session at {}", self.site))?
            .error_for_status()?;

        let issued: Vec<String> = res
            .headers()
            .get_all(SET_COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .map(str::to_string)
            .collect();
        if issued.is_empty() {
            return Err(anyhow!("server did not issue a new session cookie"));
        }

        info!(cookies = issued.len(), "session: refreshed");
        Ok(merge_cookies(cookie, issued.iter().map(String::as_str)))
    }
}

/// Applies `Set-Cookie` header values to a `Cookie` header string, keeping the original order.
pub fn merge_cookies<'a>(current: &str, set_cookies: impl IntoIterator<Item = &'a str>) -> String {
    let mut jar: Vec<(String, String)> = current
        .split(';')
        .filter_map(|pair| pair.trim().split_once('='))
        .map(|(name, value)| (name.trim().to_string(), value.trim().to_string()))
        .collect();

    for header in set_cookies {
        let Some((name, value)) = header
            .split(';')
            .next()
            .and_then(|pair| pair.trim().split_once('='))
        else {
            continue;
        };
        let (name, value) = (name.trim(), value.trim());
        match jar.iter_mut().find(|(existing, _)| existing == name) {
            Some(entry) => entry.1 = value.to_string(),
            None => jar.push((name.to_string(), value.to_string())),
        }
    }

    jar.iter()
        .map(|(name, value)| format!("{name}={value}"))
        .collect::<Vec<_>>()
        .join("; ")
}

#[cfg(test)]
#[path = "tests/session_tests.rs"]
mod tests;
