use std::path::Path;
use std::time::Duration;

use channel_mux::Endpoint;
use channel_mux::transport::WebSocketConnector;
use serde::{Deserialize, Serialize};

use crate::error::SessionError;
use crate::events::opt_id;

// =============================================================================
// File config (figment-deserialized from defaults / chat.toml / env vars)
// =============================================================================
//
//   chat.toml:   [socket]
//                endpoint = "wss://chat.example.com/socket/websocket"
//
//   env var:     CHAT_SOCKET__ENDPOINT=wss://...   (double underscore = nesting)

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct FileConfig {
    #[serde(default)]
    pub socket: SocketFileConfig,
    #[serde(default)]
    pub identity: IdentityFileConfig,
}

/// Lives under `[socket]`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SocketFileConfig {
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    /// 0 disables heartbeats.
    #[serde(default = "default_heartbeat_secs")]
    pub heartbeat_secs: u64,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
}

impl Default for SocketFileConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            heartbeat_secs: default_heartbeat_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
        }
    }
}

/// Lives under `[identity]`. Both fields can be overridden on the command line.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct IdentityFileConfig {
    #[serde(default, deserialize_with = "opt_id")]
    pub user_id: Option<String>,
    #[serde(default)]
    pub token: Option<String>,
}

fn default_endpoint() -> String {
    "ws://127.0.0.1:4000/socket/websocket".to_string()
}
fn default_heartbeat_secs() -> u64 {
    30
}
fn default_connect_timeout_secs() -> u64 {
    10
}

/// Layer defaults → `path` (if it exists) → `CHAT_*` env vars.
///
///   `CHAT_SOCKET__HEARTBEAT_SECS=0`  →  `socket.heartbeat_secs = 0`
///   `CHAT_IDENTITY__TOKEN=abc`       →  `identity.token = "abc"`
pub fn load_config(path: &Path) -> figment::Figment {
    use figment::{
        Figment,
        providers::{Env, Format, Serialized, Toml},
    };

    Figment::from(Serialized::defaults(FileConfig::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("CHAT_").split("__"))
}

// =============================================================================
// Runtime view
// =============================================================================

#[derive(Clone, Debug)]
pub struct ClientConfig {
    pub endpoint: Endpoint,
    pub heartbeat: Option<Duration>,
    pub connect_timeout: Duration,
    pub user_id: Option<String>,
    pub token: Option<String>,
}

impl ClientConfig {
    pub fn from_file(fc: &FileConfig) -> Result<Self, SessionError> {
        Ok(Self {
            endpoint: Endpoint::parse(&fc.socket.endpoint)?,
            heartbeat: match fc.socket.heartbeat_secs {
                0 => None,
                secs => Some(Duration::from_secs(secs)),
            },
            connect_timeout: Duration::from_secs(fc.socket.connect_timeout_secs),
            user_id: fc.identity.user_id.clone().filter(|s| !s.is_empty()),
            token: fc.identity.token.clone().filter(|s| !s.is_empty()),
        })
    }

    pub fn connector(&self) -> WebSocketConnector {
        WebSocketConnector::with_heartbeat(self.heartbeat)
    }

    /// Command-line values win over the config file.
    pub fn credentials(
        &self,
        cli_user_id: Option<&str>,
        cli_token: Option<&str>,
    ) -> Result<(String, String), SessionError> {
        let user_id = cli_user_id
            .map(str::to_string)
            .or_else(|| self.user_id.clone())
            .ok_or(SessionError::MissingCredential("user id"))?;
        let token = cli_token
            .map(str::to_string)
            .or_else(|| self.token.clone())
            .ok_or(SessionError::MissingCredential("token"))?;
        Ok((user_id, token))
    }
}
