//! Node configuration.
//!
//! Settings come from an optional TOML file and are then overridden by command-line
//! flags. Every node of a cluster must be given the same member list and partition
//! count, otherwise nodes disagree on partition ownership.

use crate::cluster::types::{Node, NodeId};
use crate::compute::types::{JobSettings, MalformedRecordPolicy};
use crate::storage::partitioner::DEFAULT_PARTITIONS;

use clap::Parser;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Cannot read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Invalid config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("Invalid peer '{0}', expected <id>=<addr:port>")]
    InvalidPeer(String),
    #[error("Missing required setting: {0}")]
    Missing(&'static str),
    #[error("num_partitions must be greater than zero")]
    NoPartitions,
}

/// Run a balance-grid storage and compute node
#[derive(Parser, Debug, Default)]
#[command(name = "balance-grid")]
#[command(version)]
pub struct Cli {
    /// TOML configuration file
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Identifier of this node (must be unique in the cluster)
    #[arg(long)]
    pub node_id: Option<String>,

    /// HTTP address this node listens on
    #[arg(long, value_name = "ADDR:PORT")]
    pub bind: Option<SocketAddr>,

    /// Another cluster member, as <id>=<addr:port> (repeatable)
    #[arg(long = "peer", value_name = "ID=ADDR")]
    pub peers: Vec<String>,

    /// Number of partitions of the account keyspace
    #[arg(long)]
    pub partitions: Option<u32>,

    /// CSV file of accounts to load once the node is up
    #[arg(long, value_name = "FILE")]
    pub load: Option<PathBuf>,

    /// Enable verbose output (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ComputeConfig {
    /// 0 disables the job timeout.
    pub job_timeout_ms: u64,
    pub request_timeout_ms: u64,
    pub malformed_records: MalformedRecordPolicy,
}

impl Default for ComputeConfig {
    fn default() -> Self {
        Self {
            job_timeout_ms: 30_000,
            request_timeout_ms: 30_000,
            malformed_records: MalformedRecordPolicy::FailFast,
        }
    }
}

impl ComputeConfig {
    pub fn job_settings(&self) -> JobSettings {
        JobSettings {
            malformed_records: self.malformed_records,
            job_timeout: (self.job_timeout_ms > 0)
                .then(|| Duration::from_millis(self.job_timeout_ms)),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemberConfig {
    pub id: String,
    pub http_addr: SocketAddr,
}

/// Raw file contents; every field is optional so flags can fill the gaps.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FileConfig {
    node_id: Option<String>,
    bind: Option<SocketAddr>,
    num_partitions: Option<u32>,
    load: Option<PathBuf>,
    members: Vec<MemberConfig>,
    compute: ComputeConfig,
}

#[derive(Debug, Clone)]
pub struct NodeConfig {
    pub node_id: NodeId,
    pub bind: SocketAddr,
    pub num_partitions: u32,
    pub members: Vec<Node>,
    pub load: Option<PathBuf>,
    pub compute: ComputeConfig,
}

impl NodeConfig {
    pub fn local_node(&self) -> Node {
        Node::new(self.node_id.clone(), self.bind)
    }

    pub fn from_cli(cli: &Cli) -> Result<Self, ConfigError> {
        let file = match &cli.config {
            Some(path) => read_file(path)?,
            None => FileConfig::default(),
        };
        Self::merge(file, cli)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let file: FileConfig = toml::from_str(content).map_err(|source| ConfigError::Parse {
            path: PathBuf::from("<inline>"),
            source,
        })?;
        Self::merge(file, &Cli::default())
    }

    fn merge(file: FileConfig, cli: &Cli) -> Result<Self, ConfigError> {
        let bind = cli.bind.or(file.bind).ok_or(ConfigError::Missing("bind"))?;
        let node_id = cli
            .node_id
            .clone()
            .or(file.node_id)
            .map(NodeId)
            .unwrap_or_else(|| NodeId(bind.to_string()));

        let num_partitions = cli
            .partitions
            .or(file.num_partitions)
            .unwrap_or(DEFAULT_PARTITIONS);
        if num_partitions == 0 {
            return Err(ConfigError::NoPartitions);
        }

        let mut members: Vec<Node> = file
            .members
            .into_iter()
            .map(|m| Node::new(NodeId(m.id), m.http_addr))
            .collect();
        for peer in &cli.peers {
            members.push(parse_peer(peer)?);
        }
        if !members.iter().any(|m| m.id == node_id) {
            members.push(Node::new(node_id.clone(), bind));
        }

        Ok(Self {
            node_id,
            bind,
            num_partitions,
            members,
            load: cli.load.clone().or(file.load),
            compute: file.compute,
        })
    }
}

fn read_file(path: &Path) -> Result<FileConfig, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&content).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

pub fn parse_peer(value: &str) -> Result<Node, ConfigError> {
    let (id, addr) = value
        .split_once('=')
        .ok_or_else(|| ConfigError::InvalidPeer(value.to_string()))?;
    let addr: SocketAddr = addr
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidPeer(value.to_string()))?;
    let id = id.trim();
    if id.is_empty() {
        return Err(ConfigError::InvalidPeer(value.to_string()));
    }
    Ok(Node::new(id, addr))
}
