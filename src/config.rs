//! Server configuration: a TOML file loaded leniently (defaults on any
//! error) with CLI flags taking precedence.

use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::warn;

/// Default config file location relative to the working directory.
pub const DEFAULT_CONFIG_PATH: &str = "config/server.toml";

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address the listener binds to.
    pub bind_address: String,
    /// World directory.
    pub world_path: String,
    /// Maximum simultaneous players.
    pub max_players: usize,
    /// Description shown in the server list.
    pub server_description: String,
    /// When non-empty, logins are refused with this message.
    pub maintenance_message: String,
    /// Relax keep-alive id checks (replayed sessions).
    pub ping_id_relaxed: bool,
    /// Experimental mob spawning.
    pub spawn_mobs: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            bind_address: "0.0.0.0:25565".to_string(),
            world_path: "world".to_string(),
            max_players: 16,
            server_description: "A shardcraft server".to_string(),
            maintenance_message: String::new(),
            ping_id_relaxed: false,
            spawn_mobs: false,
        }
    }
}

impl ServerConfig {
    /// Load from an explicit path, falling back to defaults on errors.
    pub fn load_from_path(path: &Path) -> ServerConfig {
        match std::fs::read_to_string(path) {
            Ok(contents) => match toml::from_str::<ServerConfig>(&contents) {
                Ok(config) => config,
                Err(err) => {
                    warn!("Failed to parse {}: {err}. Using defaults", path.display());
                    ServerConfig::default()
                }
            },
            Err(err) => {
                if err.kind() != std::io::ErrorKind::NotFound {
                    warn!("Failed to read {}: {err}. Using defaults", path.display());
                }
                ServerConfig::default()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let config = ServerConfig::load_from_path(Path::new("/nonexistent/server.toml"));
        assert_eq!(config.max_players, 16);
        assert_eq!(config.bind_address, "0.0.0.0:25565");
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("server.toml");
        std::fs::write(&path, "max_players = 4\nserver_description = \"test\"\n").unwrap();

        let config = ServerConfig::load_from_path(&path);
        assert_eq!(config.max_players, 4);
        assert_eq!(config.server_description, "test");
        assert_eq!(config.world_path, "world");
    }

    #[test]
    fn malformed_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("server.toml");
        std::fs::write(&path, "max_players = \"many\"").unwrap();

        let config = ServerConfig::load_from_path(&path);
        assert_eq!(config.max_players, 16);
    }
}
