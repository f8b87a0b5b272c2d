use crate::handler::DEFAULT_MAX_TRACKED_JOBS;
use batch_persistence::StoreConfig;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub server: NetworkConfig,
    pub persistence: PersistenceConfig,
    pub monitoring: MonitoringConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    pub host: String,
    pub port: u16,
    /// Name this server answers to in destinations
    pub server_name: String,
    pub max_connections: usize,
    /// Jobs tracked at once before new ones are refused
    #[serde(default = "default_max_tracked_jobs")]
    pub max_tracked_jobs: usize,
}

fn default_max_tracked_jobs() -> usize {
    DEFAULT_MAX_TRACKED_JOBS
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistenceConfig {
    pub data_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitoringConfig {
    pub prometheus_port: u16,
    pub log_level: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            server: NetworkConfig {
                host: "0.0.0.0".to_string(),
                port: 15001,
                server_name: "localhost".to_string(),
                max_connections: 1000,
                max_tracked_jobs: DEFAULT_MAX_TRACKED_JOBS,
            },
            persistence: PersistenceConfig {
                data_dir: PathBuf::from("./data"),
            },
            monitoring: MonitoringConfig {
                prometheus_port: 9091,
                log_level: "info".to_string(),
            },
        }
    }
}

impl ServerConfig {
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    pub fn from_yaml(contents: &str) -> anyhow::Result<Self> {
        let config: ServerConfig = serde_yaml::from_str(contents)?;
        Ok(config)
    }

    pub fn to_store_config(&self) -> StoreConfig {
        StoreConfig {
            data_dir: self.persistence.data_dir.clone(),
        }
    }

    pub fn listen_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}
