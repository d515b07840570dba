//! # Configuration Utilities
//!
//! Configuration structures for the relay server, loaded from a TOML file.
//!
//! Every section has serde defaults, so an empty file (or no file at all) yields
//! a server that listens on port 3000, talks to the public PokéAPI and targets a
//! 128x64 SSD1306 display.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::time::Duration;

/// Load a TOML configuration file and deserialize it into the specified type.
///
/// # Arguments
/// - `path`: Path to the TOML configuration file
///
/// # Returns
/// - `Ok(T)`: Successfully loaded and parsed configuration
/// - `Err`: File I/O or parsing error
///
/// # Example
/// ```ignore
/// let config: RelayConfig = load_config("config/server.toml")?;
/// ```
pub fn load_config<T>(path: &str) -> Result<T>
where
    T: for<'de> Deserialize<'de>,
{
    let content =
        fs::read_to_string(path).with_context(|| format!("failed to read config {}", path))?;
    let config: T =
        toml::from_str(&content).with_context(|| format!("failed to parse config {}", path))?;
    Ok(config)
}

/// Complete relay configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    pub server: ServerInfo,
    pub relay: RelaySettings,
    pub display: DisplayConfig,
    pub upstream: UpstreamConfig,
    pub chat: ChatConfig,
}

/// Where the HTTP/WebSocket listener binds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerInfo {
    /// Listen address (e.g., "0.0.0.0:3000")
    pub address: String,
}

impl Default for ServerInfo {
    fn default() -> Self {
        Self {
            address: "0.0.0.0:3000".to_string(),
        }
    }
}

/// Relay behaviour: device signatures used to classify peers, and how much
/// outbound traffic a peer may have queued.
///
/// Signature matching is substring-based and case-sensitive, the same way the
/// firmware announces itself in its `User-Agent`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RelaySettings {
    /// `User-Agent` fragments that mark a device at handshake time
    pub device_user_agents: Vec<String>,
    /// `Origin` fragments that mark a device at handshake time
    pub device_origins: Vec<String>,
    /// Value of `client` in an identify envelope that reclassifies a peer as a device
    pub identify_client: String,
    /// Messages queued per peer before further sends to it are dropped
    pub outbound_capacity: usize,
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self {
            device_user_agents: vec!["ESP32".to_string(), "arduino".to_string()],
            device_origins: vec!["esp32".to_string()],
            identify_client: "ESP32".to_string(),
            outbound_capacity: 100,
        }
    }
}

/// Bounding box of the target monochrome display.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    pub max_width: u32,
    pub max_height: u32,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            max_width: 128,
            max_height: 64,
        }
    }
}

/// Upstream HTTP sources (PokéAPI and sprite hosts).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UpstreamConfig {
    pub pokeapi_base_url: String,
    /// Per-request timeout applied to every metadata, HEAD and image fetch
    pub request_timeout_secs: u64,
}

impl UpstreamConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            pokeapi_base_url: "https://pokeapi.co/api/v2".to_string(),
            request_timeout_secs: 10,
        }
    }
}

/// OpenAI-compatible chat completion backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    pub api_base_url: String,
    pub model: String,
    /// Name of the environment variable holding the API key
    pub api_key_env: String,
    pub request_timeout_secs: u64,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            api_base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o-mini".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            request_timeout_secs: 60,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_empty_file_uses_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "").unwrap();

        let config: RelayConfig = load_config(file.path().to_str().unwrap()).unwrap();

        assert_eq!(config.server.address, "0.0.0.0:3000");
        assert_eq!(config.display.max_width, 128);
        assert_eq!(config.display.max_height, 64);
        assert_eq!(config.relay.identify_client, "ESP32");
        assert_eq!(config.relay.outbound_capacity, 100);
        assert_eq!(config.upstream.request_timeout(), Duration::from_secs(10));
    }

    #[test]
    fn test_partial_sections_override() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[server]
address = "127.0.0.1:8080"

[relay]
device_user_agents = ["NamiBoard"]
outbound_capacity = 8

[display]
max_height = 32
"#
        )
        .unwrap();

        let config: RelayConfig = load_config(file.path().to_str().unwrap()).unwrap();

        assert_eq!(config.server.address, "127.0.0.1:8080");
        assert_eq!(config.relay.device_user_agents, vec!["NamiBoard".to_string()]);
        // Unset fields inside a present section keep their defaults
        assert_eq!(config.relay.identify_client, "ESP32");
        assert_eq!(config.relay.outbound_capacity, 8);
        assert_eq!(config.display.max_width, 128);
        assert_eq!(config.display.max_height, 32);
    }

    #[test]
    fn test_missing_file_is_error() {
        let result: Result<RelayConfig> = load_config("/nonexistent/relay.toml");
        assert!(result.is_err());
    }
}
