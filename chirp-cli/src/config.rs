//! Load config from file and environment.

use std::net::Ipv4Addr;
use std::path::PathBuf;

use serde::Deserialize;

use chirp_core::ServiceIdentifier;

/// Daemon configuration. File: ~/.config/chirp/config.toml or /etc/chirp/config.toml.
/// Env overrides: CHIRP_GROUP, CHIRP_NAME, CHIRP_BROADCAST_ADDR, CHIRP_ANY_ADDR.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Logical group; only peers with the same group name see each other.
    #[serde(default = "default_group")]
    pub group: String,
    /// Instance name; must differ between processes of the same group.
    #[serde(default = "default_name")]
    pub name: String,
    /// Broadcast destination. 255.255.255.255 needs a configured interface on
    /// most stacks; a subnet-directed address (e.g. 192.168.1.255) is the
    /// portable choice; 0.0.0.0 stays on the local host.
    #[serde(default = "default_broadcast_addr")]
    pub broadcast_addr: Ipv4Addr,
    /// Receive bind address, normally 0.0.0.0.
    #[serde(default = "default_any_addr")]
    pub any_addr: Ipv4Addr,
    /// Services to register at startup.
    #[serde(default)]
    pub services: Vec<ServiceEntry>,
    /// Service kinds to request from peers at startup.
    #[serde(default)]
    pub watch: Vec<String>,
}

/// One `[[services]]` entry: kind (well-known name or raw byte) and TCP port.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServiceEntry {
    pub kind: String,
    pub port: u16,
}

impl ServiceEntry {
    pub fn identifier(&self) -> Option<ServiceIdentifier> {
        self.kind.parse().ok()
    }
}

fn default_group() -> String {
    "chirp".into()
}

fn default_name() -> String {
    // Per-process default so two daemons on one host do not echo-filter
    // each other away.
    match std::env::var("HOSTNAME") {
        Ok(host) => format!("{host}-{}", std::process::id()),
        Err(_) => format!("chirp-{}", std::process::id()),
    }
}

fn default_broadcast_addr() -> Ipv4Addr {
    Ipv4Addr::BROADCAST
}

fn default_any_addr() -> Ipv4Addr {
    Ipv4Addr::UNSPECIFIED
}

impl Default for Config {
    fn default() -> Self {
        Self {
            group: default_group(),
            name: default_name(),
            broadcast_addr: default_broadcast_addr(),
            any_addr: default_any_addr(),
            services: Vec::new(),
            watch: Vec::new(),
        }
    }
}

/// Load config: merge default, then config file (if present), then env vars.
pub fn load() -> Config {
    let mut c = load_file().unwrap_or_default();
    if let Ok(s) = std::env::var("CHIRP_GROUP") {
        c.group = s;
    }
    if let Ok(s) = std::env::var("CHIRP_NAME") {
        c.name = s;
    }
    if let Ok(s) = std::env::var("CHIRP_BROADCAST_ADDR") {
        if let Ok(addr) = s.parse() {
            c.broadcast_addr = addr;
        }
    }
    if let Ok(s) = std::env::var("CHIRP_ANY_ADDR") {
        if let Ok(addr) = s.parse() {
            c.any_addr = addr;
        }
    }
    c
}

fn config_paths() -> Vec<PathBuf> {
    let home = std::env::var_os("HOME").map(PathBuf::from);
    let mut out = Vec::new();
    if let Some(h) = home {
        out.push(h.join(".config/chirp/config.toml"));
    }
    out.push(PathBuf::from("/etc/chirp/config.toml"));
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
