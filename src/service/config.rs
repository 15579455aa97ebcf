use std::path::Path;

use serde::{Deserialize, Serialize};

use super::AppResult;

#[derive(Debug, Default, Serialize, Deserialize, Clone)]
pub struct GeneralConfig {
    pub name: String,
    pub id: i32,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct NetworkConfig {
    pub ip: String,
    pub port: u16,
    pub max_connection: usize,
    pub max_packet_size: usize,
    /// Capacity of the per-connection outbound queue and of each session's
    /// dispatch queue; this bound is the backpressure boundary.
    pub max_queue_size: usize,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        NetworkConfig {
            ip: "0.0.0.0".to_string(),
            port: 0,
            max_connection: 3000,
            max_packet_size: 1024 * 1024,
            max_queue_size: 1024,
        }
    }
}

/// Outbound link settings. The keep-alive durations are carried as plain
/// data for WebSocket peers that deadline per burst.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ClientConfig {
    /// Dial timeout in seconds; 0 retries forever.
    pub connect_timeout: u64,
    pub write_wait: u64,
    pub pong_wait: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            connect_timeout: 0,
            write_wait: 10,
            pong_wait: 60,
        }
    }
}

#[derive(Debug, Default, Serialize, Deserialize, Clone)]
pub struct RemoteConfig {
    pub name: String,
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Default, Serialize, Deserialize, Clone)]
pub struct ServerConfig {
    pub general: GeneralConfig,
    pub network: NetworkConfig,
    pub client: ClientConfig,
    #[serde(default)]
    pub remotes: Vec<RemoteConfig>,
}

impl ServerConfig {
    pub fn set_up_config<P: AsRef<Path>>(path: P) -> AppResult<ServerConfig> {
        let path_str = path.as_ref().to_str().ok_or_else(|| {
            super::AppError::InvalidValue(format!(
                "config file path: {}",
                path.as_ref().to_string_lossy()
            ))
        })?;
        let config = config::Config::builder()
            .add_source(config::File::with_name(path_str))
            .build()?;

        let server_config: ServerConfig = config.try_deserialize()?;

        Ok(server_config)
    }
}
