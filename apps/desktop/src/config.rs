use std::{
    fs,
    path::{Path, PathBuf},
    str::FromStr,
};

use anyhow::{Context, Result};
use clap::Parser;
use client_core::ClientConfig;
use shared::domain::{RoomId, UserId};

/// Read when `--config` is not given and the file exists.
pub const DEFAULT_CONFIG_FILE: &str = "sockchat.toml";

#[derive(Parser, Debug, Default)]
#[command(name = "sockchat", about = "Headless chat client")]
pub struct Cli {
    /// TOML settings file.
    #[arg(long)]
    pub config: Option<PathBuf>,
    #[arg(long)]
    pub host: Option<String>,
    #[arg(long)]
    pub port: Option<u16>,
    #[arg(long)]
    pub room: Option<u32>,
    /// Numeric ID of the account the cookies belong to.
    #[arg(long)]
    pub user_id: Option<u32>,
    #[arg(long)]
    pub hist_len: Option<usize>,
    /// SOCKS5 proxy for the socket and session refresh, e.g. `socks5://127.0.0.1:9050`.
    #[arg(long)]
    pub proxy: Option<String>,
    /// Lurk: only room joins are sent.
    #[arg(long)]
    pub read_only: bool,
    /// Show debug status lines.
    #[arg(long)]
    pub debug: bool,
    /// Session cookie header value.
    pub cookies: Option<String>,
}

/// Defaults, then the settings file, then `SC_*` environment variables, then flags.
pub fn load_settings(cli: &Cli) -> Result<ClientConfig> {
    let mut config = match &cli.config {
        Some(path) => read_file(path)?,
        None if Path::new(DEFAULT_CONFIG_FILE).exists() => read_file(Path::new(DEFAULT_CONFIG_FILE))?,
        None => ClientConfig::default(),
    };
    apply_env(&mut config, |key| std::env::var(key).ok())?;
    apply_cli(&mut config, cli);
    Ok(config)
}

fn read_file(path: &Path) -> Result<ClientConfig> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read settings file '{}'", path.display()))?;
    toml::from_str(&raw).with_context(|| format!("invalid settings file '{}'", path.display()))
}

fn parse_var<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    lookup(key)
        .map(|raw| raw.trim().parse::<T>().with_context(|| format!("invalid {key}={raw:?}")))
        .transpose()
}

pub fn apply_env(config: &mut ClientConfig, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
    if let Some(v) = lookup("SC_HOST") {
        config.host = v;
    }
    if let Some(v) = parse_var(&lookup, "SC_PORT")? {
        config.port = v;
    }
    if let Some(v) = parse_var(&lookup, "SC_ROOM")? {
        config.room = RoomId(v);
    }
    if let Some(v) = parse_var(&lookup, "SC_USER_ID")? {
        config.user_id = Some(UserId(v));
    }
    if let Some(v) = parse_var(&lookup, "SC_HIST_LEN")? {
        config.hist_len = v;
    }
    if let Some(v) = lookup("SC_READ_ONLY") {
        config.read_only = matches!(v.trim(), "1" | "true" | "yes");
    }
    if let Some(v) = lookup("SC_COOKIES") {
        config.cookies = v;
    }
    if let Some(v) = lookup("SC_PROXY") {
        config.proxy = Some(v);
    }
    Ok(())
}

pub fn apply_cli(config: &mut ClientConfig, cli: &Cli) {
    if let Some(host) = &cli.host {
        config.host = host.clone();
    }
    if let Some(port) = cli.port {
        config.port = port;
    }
    if let Some(room) = cli.room {
        config.room = RoomId(room);
    }
    if let Some(user_id) = cli.user_id {
        config.user_id = Some(UserId(user_id));
    }
    if let Some(hist_len) = cli.hist_len {
        config.hist_len = hist_len;
    }
    if cli.read_only {
        config.read_only = true;
    }
    if let Some(cookies) = &cli.cookies {
        config.cookies = cookies.clone();
    }
    if let Some(proxy) = &cli.proxy {
        config.proxy = Some(proxy.clone());
    }
}
