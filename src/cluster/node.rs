//! Node inventory: identity, role, health, and addressing for one cluster
//! member.

use std::fmt;

use crate::error::{ClientError, Result};

/// A host:port pair identifying a node's client-facing address.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NodeEndpoint {
  pub host: String,
  pub port: u16,
}

impl NodeEndpoint {
  pub fn new(host: impl Into<String>, port: u16) -> Self {
    Self { host: host.into(), port }
  }
}

impl fmt::Display for NodeEndpoint {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}:{}", self.host, self.port)
  }
}

/// The unique node id a server reports in `CLUSTER SHARDS`/`CLUSTER SLOTS`.
pub type NodeId = String;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeRole {
  Primary,
  Replica,
}

impl NodeRole {
  pub fn parse(raw: &str) -> Result<Self> {
    match raw {
      "master" | "primary" => Ok(NodeRole::Primary),
      "replica" | "slave" => Ok(NodeRole::Replica),
      other => Err(ClientError::InvalidNodeRole(other.to_string())),
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeHealth {
  Online,
  Loading,
  Failed,
}

impl NodeHealth {
  pub fn parse(raw: &str) -> Result<Self> {
    match raw {
      "online" => Ok(NodeHealth::Online),
      "loading" => Ok(NodeHealth::Loading),
      "failed" => Ok(NodeHealth::Failed),
      other => Err(ClientError::InvalidNodeHealth(other.to_string())),
    }
  }
}

/// One node entry as reported by cluster discovery.
#[derive(Debug, Clone)]
pub struct NodeInfo {
  pub id: NodeId,
  pub endpoint: NodeEndpoint,
  pub role: NodeRole,
  pub health: NodeHealth,
  pub replication_offset: u64,
}
