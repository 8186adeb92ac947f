use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use crate::hub::{HubConfig, HubLimits, SessionDefaults};

// =============================================================================
// Unified config (figment-deserialized from defaults / codepair.toml / env vars)
// =============================================================================
//
// Three equivalent ways to configure:
//
//   codepair.toml:   [session]
//                    grace_period_secs = 60
//
//   env var:         CODEPAIR_SESSION__GRACE_PERIOD_SECS=60   (double underscore = nesting)
//
//   CLI:             --host / --port win over both

/// Top-level tunable configuration, deserialized by figment.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct FileConfig {
    #[serde(default)]
    pub server: ServerFileConfig,
    #[serde(default)]
    pub session: SessionFileConfig,
}

/// Listener settings (lives under `[server]` in codepair.toml).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerFileConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Allow any origin to call the HTTP API
    #[serde(default = "default_cors_permissive")]
    pub cors_permissive: bool,
}

impl Default for ServerFileConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_permissive: default_cors_permissive(),
        }
    }
}

/// Session tunables (lives under `[session]` in codepair.toml).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SessionFileConfig {
    /// How long an empty session is kept before it is reclaimed
    #[serde(default = "default_grace_period_secs")]
    pub grace_period_secs: u64,
    #[serde(default = "default_content")]
    pub default_content: String,
    #[serde(default = "default_mode")]
    pub default_mode: String,
    #[serde(default = "default_max_content_kb")]
    pub max_content_kb: usize,
    #[serde(default = "default_max_mode_len")]
    pub max_mode_len: usize,
    /// Per-connection queue of outgoing frames
    #[serde(default = "default_outbox_capacity")]
    pub outbox_capacity: usize,
    /// Queue of commands waiting for the hub actor
    #[serde(default = "default_command_capacity")]
    pub command_capacity: usize,
}

impl Default for SessionFileConfig {
    fn default() -> Self {
        Self {
            grace_period_secs: default_grace_period_secs(),
            default_content: default_content(),
            default_mode: default_mode(),
            max_content_kb: default_max_content_kb(),
            max_mode_len: default_max_mode_len(),
            outbox_capacity: default_outbox_capacity(),
            command_capacity: default_command_capacity(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_cors_permissive() -> bool {
    true
}

fn default_grace_period_secs() -> u64 {
    3600
}

fn default_content() -> String {
    SessionDefaults::default().content
}

fn default_mode() -> String {
    SessionDefaults::default().mode
}

fn default_max_content_kb() -> usize {
    1024
}

fn default_max_mode_len() -> usize {
    64
}

fn default_outbox_capacity() -> usize {
    256
}

fn default_command_capacity() -> usize {
    1024
}

/// Build a figment that layers: defaults → codepair.toml → CODEPAIR_* env vars.
///
/// A missing TOML file is not an error; its layer is simply empty.
pub fn load_config(path: &Path) -> figment::Figment {
    use figment::{
        Figment,
        providers::{Env, Format, Serialized, Toml},
    };

    Figment::from(Serialized::defaults(FileConfig::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("CODEPAIR_").split("__"))
}

// =============================================================================
// Runtime config structs (derived from FileConfig, used throughout the server)
// =============================================================================

/// Listener configuration (runtime view).
#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub cors_permissive: bool,
}

impl ServerConfig {
    pub fn from_file(fc: &ServerFileConfig) -> Self {
        Self {
            host: fc.host.clone(),
            port: fc.port,
            cors_permissive: fc.cors_permissive,
        }
    }

    /// Apply CLI flags, which take precedence over file and env values.
    pub fn with_overrides(mut self, host: Option<String>, port: Option<u16>) -> Self {
        if let Some(host) = host {
            self.host = host;
        }
        if let Some(port) = port {
            self.port = port;
        }
        self
    }

    pub fn bind_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .with_context(|| format!("Invalid listen address {}:{}", self.host, self.port))
    }
}

/// Session hub configuration (runtime view).
#[derive(Clone, Debug)]
pub struct SessionConfig {
    pub hub: HubConfig,
    pub outbox_capacity: usize,
    pub command_capacity: usize,
    /// Largest inbound WebSocket message accepted before the socket is closed.
    pub max_frame_bytes: usize,
}

/// Room for the JSON envelope and escaping around the largest allowed edit.
const FRAME_OVERHEAD_BYTES: usize = 64 * 1024;

impl SessionConfig {
    pub fn from_file(fc: &SessionFileConfig) -> Self {
        let max_content_bytes = fc.max_content_kb.saturating_mul(1024);
        Self {
            hub: HubConfig {
                defaults: SessionDefaults {
                    content: fc.default_content.clone(),
                    mode: fc.default_mode.clone(),
                },
                grace_period: Duration::from_secs(fc.grace_period_secs),
                limits: HubLimits {
                    max_content_bytes,
                    max_mode_len: fc.max_mode_len,
                },
            },
            // A zero-capacity mpsc channel panics on creation
            outbox_capacity: fc.outbox_capacity.max(1),
            command_capacity: fc.command_capacity.max(1),
            max_frame_bytes: max_content_bytes
                .saturating_mul(2)
                .saturating_add(FRAME_OVERHEAD_BYTES),
        }
    }
}
