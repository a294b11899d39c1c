//! Node configuration loading.
//!
//! TOML is the sole configuration source (aside from `LOG_LEVEL` for the
//! logging ambient concern, handled by the `services/node` binary, not
//! here). Missing optional keys fall back to the defaults named throughout
//! the component design; `listen_addr` is the only field whose absence is a
//! fatal, logged startup error.

use kv_coordinator::QuorumPolicy;
use kv_wire::EndpointId;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct NodeConfig {
    pub conn: ConnConfig,
    pub partitioner: PartitionerConfig,
    pub storager: StoragerConfig,
    pub server: ServerConfig,
}

#[derive(Debug, Clone)]
pub struct ConnConfig {
    pub listen_addr: EndpointId,
    pub bootstrapper: Option<EndpointId>,
    pub seeds: Vec<EndpointId>,
    pub max_connections: u32,
    pub max_retry: u32,
    pub gossip_interval: Duration,
}

#[derive(Debug, Clone)]
pub struct PartitionerConfig {
    pub vnode: usize,
    pub replica: usize,
}

#[derive(Debug, Clone)]
pub struct StoragerConfig {
    pub datafile_dir: PathBuf,
    pub max_indices_in_memory: i64,
    pub max_data_per_sstable: u64,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub interval: Duration,
    pub response_timeout: Duration,
    pub response_protocol: QuorumPolicy,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("reading config file '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("parsing config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("missing required field: {0}")]
    MissingField(String),
    #[error("invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },
}

#[derive(Debug, Deserialize, Default)]
struct RawConfig {
    conn: Option<RawConnConfig>,
    partitioner: Option<RawPartitionerConfig>,
    storager: Option<RawStoragerConfig>,
    server: Option<RawServerConfig>,
}

#[derive(Debug, Deserialize, Default)]
struct RawConnConfig {
    listen_addr: Option<String>,
    bootstrapper: Option<String>,
    seeds: Option<Vec<String>>,
    max_connections: Option<u32>,
    max_retry: Option<u32>,
    gossip_interval_secs: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct RawPartitionerConfig {
    vnode: Option<usize>,
    replica: Option<usize>,
}

#[derive(Debug, Deserialize, Default)]
struct RawStoragerConfig {
    datafile_dir: Option<String>,
    max_indices_in_memory: Option<i64>,
    max_data_per_sstable: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct RawServerConfig {
    interval: Option<u64>,
    response_timeout: Option<u64>,
    response_protocol: Option<String>,
}

pub fn load_config_from_path(path: &Path) -> Result<NodeConfig, ConfigError> {
    let toml_str = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;
    load_config_from_str(&toml_str)
}

pub fn load_config_from_str(toml_str: &str) -> Result<NodeConfig, ConfigError> {
    let raw: RawConfig = toml::from_str(toml_str)?;

    let raw_conn = raw.conn.unwrap_or_default();
    let listen_addr_str = raw_conn
        .listen_addr
        .ok_or_else(|| ConfigError::MissingField("conn.listen_addr".to_owned()))?;
    let listen_addr = parse_endpoint(&listen_addr_str, "conn.listen_addr")?;

    let bootstrapper = raw_conn
        .bootstrapper
        .map(|s| parse_endpoint(&s, "conn.bootstrapper"))
        .transpose()?;

    let seeds = raw_conn
        .seeds
        .unwrap_or_default()
        .iter()
        .map(|s| parse_endpoint(s, "conn.seeds"))
        .collect::<Result<Vec<_>, _>>()?;

    let conn = ConnConfig {
        listen_addr,
        bootstrapper,
        seeds,
        max_connections: raw_conn.max_connections.unwrap_or(1024),
        max_retry: raw_conn.max_retry.unwrap_or(5),
        gossip_interval: Duration::from_secs(raw_conn.gossip_interval_secs.unwrap_or(5)),
    };

    let raw_partitioner = raw.partitioner.unwrap_or_default();
    let partitioner = PartitionerConfig {
        vnode: raw_partitioner.vnode.unwrap_or(3),
        replica: raw_partitioner.replica.unwrap_or(3),
    };

    let raw_storager = raw.storager.unwrap_or_default();
    let storager = StoragerConfig {
        datafile_dir: raw_storager
            .datafile_dir
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("data")),
        max_indices_in_memory: raw_storager.max_indices_in_memory.unwrap_or(-1),
        max_data_per_sstable: raw_storager.max_data_per_sstable.unwrap_or(1 << 20),
    };

    let raw_server = raw.server.unwrap_or_default();
    let response_protocol_str = raw_server.response_protocol.unwrap_or_else(|| "all".to_owned());
    let response_protocol =
        QuorumPolicy::parse(&response_protocol_str).map_err(|e| ConfigError::InvalidValue {
            field: "server.response_protocol".to_owned(),
            reason: e.to_string(),
        })?;
    let server = ServerConfig {
        interval: Duration::from_secs(raw_server.interval.unwrap_or(5)),
        response_timeout: Duration::from_secs(raw_server.response_timeout.unwrap_or(10)),
        response_protocol,
    };

    Ok(NodeConfig {
        conn,
        partitioner,
        storager,
        server,
    })
}

fn parse_endpoint(s: &str, field: &str) -> Result<EndpointId, ConfigError> {
    EndpointId::from_str(s).map_err(|e| ConfigError::InvalidValue {
        field: field.to_owned(),
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_listen_addr_is_fatal() {
        let err = load_config_from_str("").unwrap_err();
        assert!(matches!(err, ConfigError::MissingField(_)));
    }

    #[test]
    fn minimal_config_applies_defaults() {
        let config = load_config_from_str(
            r#"
            [conn]
            listen_addr = "127.0.0.1:9042"
            "#,
        )
        .unwrap();
        assert_eq!(config.conn.listen_addr.as_str(), "127.0.0.1:9042");
        assert_eq!(config.partitioner.vnode, 3);
        assert_eq!(config.partitioner.replica, 3);
        assert_eq!(config.storager.max_indices_in_memory, -1);
        assert_eq!(config.server.response_protocol, QuorumPolicy::All);
    }

    #[test]
    fn full_config_overrides_defaults() {
        let config = load_config_from_str(
            r#"
            [conn]
            listen_addr = "127.0.0.1:9042"
            bootstrapper = "127.0.0.1:9043"
            seeds = ["127.0.0.1:9043", "127.0.0.1:9044"]
            max_connections = 64
            max_retry = 3

            [partitioner]
            vnode = 8
            replica = 2

            [storager]
            datafile_dir = "/tmp/kv-data"
            max_indices_in_memory = 0
            max_data_per_sstable = 4096

            [server]
            interval = 10
            response_timeout = 30
            response_protocol = "any"
            "#,
        )
        .unwrap();
        assert_eq!(config.conn.seeds.len(), 2);
        assert_eq!(config.partitioner.vnode, 8);
        assert_eq!(config.storager.max_data_per_sstable, 4096);
        assert_eq!(config.server.response_protocol, QuorumPolicy::Any);
    }

    #[test]
    fn malformed_listen_addr_is_rejected() {
        let err = load_config_from_str(
            r#"
            [conn]
            listen_addr = "not-an-address"
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }
}
