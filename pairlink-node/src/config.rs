//! Load config from file and environment.

use serde::Deserialize;
use std::path::PathBuf;

/// Node configuration. File: ~/.config/pairlink/config.toml or
/// /etc/pairlink/config.toml. Env overrides: PAIRLINK_LISTEN_PORT,
/// PAIRLINK_PEER_HOST, PAIRLINK_PEER_PORT.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Acceptor bind port (default 45690).
    #[serde(default = "default_listen_port")]
    pub listen_port: u16,
    /// Peer to dial. Leave unset to run the acceptor side only.
    #[serde(default)]
    pub peer_host: Option<String>,
    #[serde(default)]
    pub peer_port: Option<u16>,
    /// Outbound connect timeout (default 10000 ms).
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    /// Per-frame read timeout. Unset blocks indefinitely (an idle chat peer
    /// is legitimate).
    #[serde(default)]
    pub read_timeout_ms: Option<u64>,
    /// Deliver messages that fail signature verification instead of
    /// rejecting them (the legacy protocol behavior).
    #[serde(default)]
    pub accept_unverified: bool,
}

fn default_listen_port() -> u16 {
    45690
}
fn default_connect_timeout_ms() -> u64 {
    10_000
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_port: default_listen_port(),
            peer_host: None,
            peer_port: None,
            connect_timeout_ms: default_connect_timeout_ms(),
            read_timeout_ms: None,
            accept_unverified: false,
        }
    }
}

/// Load config: merge default, then config file (if present), then env vars.
pub fn load() -> Config {
    let mut c = load_file().unwrap_or_default();
    if let Ok(s) = std::env::var("PAIRLINK_LISTEN_PORT") {
        if let Ok(p) = s.parse::<u16>() {
            c.listen_port = p;
        }
    }
    if let Ok(s) = std::env::var("PAIRLINK_PEER_HOST") {
        if !s.is_empty() {
            c.peer_host = Some(s);
        }
    }
    if let Ok(s) = std::env::var("PAIRLINK_PEER_PORT") {
        if let Ok(p) = s.parse::<u16>() {
            c.peer_port = Some(p);
        }
    }
    c
}

fn config_paths() -> Vec<PathBuf> {
    let home = std::env::var_os("HOME").map(PathBuf::from);
    let mut out = Vec::new();
    if let Some(h) = home {
        out.push(h.join(".config/pairlink/config.toml"));
    }
    out.push(PathBuf::from("/etc/pairlink/config.toml"));
    out
}

fn load_file() -> Option<Config> {
    for p in config_paths() {
        if p.exists() {
            if let Ok(s) = std::fs::read_to_string(&p) {
                if let Ok(c) = toml::from_str::<Config>(&s) {
                    return Some(c);
                }
            }
            break;
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let c = Config::default();
        assert_eq!(c.listen_port, 45690);
        assert!(c.peer_host.is_none());
        assert!(c.read_timeout_ms.is_none());
        assert!(!c.accept_unverified);
    }

    #[test]
    fn file_values_override_defaults() {
        let c: Config = toml::from_str(
            r#"
            listen_port = 5000
            peer_host = "192.168.1.20"
            peer_port = 5001
            read_timeout_ms = 30000
            "#,
        )
        .unwrap();
        assert_eq!(c.listen_port, 5000);
        assert_eq!(c.peer_host.as_deref(), Some("192.168.1.20"));
        assert_eq!(c.peer_port, Some(5001));
        assert_eq!(c.read_timeout_ms, Some(30_000));
        assert_eq!(c.connect_timeout_ms, 10_000);
    }

    #[test]
    fn unknown_fields_rejected() {
        assert!(toml::from_str::<Config>("mystery = true").is_err());
    }
}
