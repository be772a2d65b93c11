//! Parsing `CLUSTER SHARDS` (and the older `CLUSTER SLOTS`) replies into a
//! [`ClusterTopology`].

use std::collections::HashMap;

use crate::cluster::node::{NodeEndpoint, NodeHealth, NodeInfo, NodeRole};
use crate::cluster::slot::Slot;
use crate::cluster::topology::{ClusterTopology, Shard};
use crate::error::{ClientError, Result};
use crate::resp::decode::{decode_pairs, FromToken};
use crate::resp::token::Token;

fn as_field_map(token: Token) -> Result<HashMap<String, Token>> {
  decode_pairs::<String, Token>(token).map(|pairs| pairs.into_iter().collect())
}

fn require_array(token: Token, err: ClientError) -> Result<Vec<Token>> {
  match token {
    Token::Array(agg) | Token::Set(agg) | Token::Push(agg) => agg.iter().collect(),
    _ => Err(err),
  }
}

/// Parse a `CLUSTER SHARDS` reply.
pub fn parse_shards(token: Token) -> Result<ClusterTopology> {
  let shard_tokens = require_array(token, ClientError::SlotsTokenIsNotAnArray)?;
  let mut shards = Vec::with_capacity(shard_tokens.len());
  for shard_token in shard_tokens {
    let mut fields = as_field_map(shard_token)?;
    let slots_token = fields.remove("slots").ok_or(ClientError::SlotsTokenIsNotAnArray)?;
    let slot_ranges = parse_slot_ranges(slots_token)?;
    let nodes_token = fields.remove("nodes").ok_or(ClientError::NodesTokenIsNotAnArray)?;
    let node_tokens = require_array(nodes_token, ClientError::NodesTokenIsNotAnArray)?;

    let mut primary = None;
    let mut replicas = Vec::new();
    for node_token in node_tokens {
      let node = parse_node(node_token)?;
      match node.role {
        NodeRole::Primary => primary = Some(node),
        NodeRole::Replica => replicas.push(node),
      }
    }
    let primary = primary.ok_or_else(|| ClientError::DataMalformed("shard had no primary node".into()))?;
    shards.push(Shard { primary, replicas, slot_ranges });
  }
  Ok(ClusterTopology::from_shards(shards))
}

fn parse_slot_ranges(token: Token) -> Result<Vec<(Slot, Slot)>> {
  let flat: Vec<i64> = Vec::<i64>::from_token(token)?;
  if flat.len() % 2 != 0 {
    return Err(ClientError::DataMalformed("slots array had odd length".into()));
  }
  flat
    .chunks_exact(2)
    .map(|pair| {
      let lo = Slot::try_from(pair[0]).map_err(|_| ClientError::DataMalformed("slot out of range".into()))?;
      let hi = Slot::try_from(pair[1]).map_err(|_| ClientError::DataMalformed("slot out of range".into()))?;
      Ok((lo, hi))
    })
    .collect()
}

fn parse_node(token: Token) -> Result<NodeInfo> {
  let mut fields = as_field_map(token)?;
  let id = take_string(&mut fields, "id")?;
  let role_raw = take_string(&mut fields, "role")?;
  let role = NodeRole::parse(&role_raw)?;
  let health_raw = take_string_opt(&mut fields, "health").unwrap_or_else(|| "online".to_string());
  let health = NodeHealth::parse(&health_raw)?;
  let host = take_string_opt(&mut fields, "endpoint")
    .or_else(|| take_string_opt(&mut fields, "ip"))
    .or_else(|| take_string_opt(&mut fields, "hostname"))
    .ok_or_else(|| ClientError::DataMalformed("node had no address field".into()))?;
  let port = fields
    .remove("port")
    .map(i64::from_token)
    .transpose()?
    .ok_or_else(|| ClientError::DataMalformed("node had no port field".into()))?;
  let replication_offset = fields
    .remove("replication-offset")
    .map(i64::from_token)
    .transpose()?
    .unwrap_or(0);
  Ok(NodeInfo {
    id,
    endpoint: NodeEndpoint::new(host, port as u16),
    role,
    health,
    replication_offset: replication_offset as u64,
  })
}

fn take_string(fields: &mut HashMap<String, Token>, key: &str) -> Result<String> {
  fields
    .remove(key)
    .ok_or_else(|| ClientError::DataMalformed(format!("missing field {:?}", key)))
    .and_then(String::from_token)
}

fn take_string_opt(fields: &mut HashMap<String, Token>, key: &str) -> Option<String> {
  fields.remove(key).and_then(|t| String::from_token(t).ok())
}

#[cfg(test)]
mod tests {
  use super::*;
  use bytes::Bytes;
  use crate::resp::parser::parse_one;

  fn parse(wire: &[u8]) -> Token {
    let mut buf = Bytes::copy_from_slice(wire);
    parse_one(&mut buf, 1, 100).unwrap().unwrap()
  }

  #[test]
  fn invalid_role_is_rejected() {
    let wire = b"*1\r\n%2\r\n$5\r\nslots\r\n*2\r\n:0\r\n:1\r\n$5\r\nnodes\r\n*1\r\n%3\r\n$2\r\nid\r\n$1\r\na\r\n$4\r\nrole\r\n$7\r\ninvalid\r\n$4\r\nport\r\n:7000\r\n";
    let token = parse(wire);
    let err = parse_shards(token).unwrap_err();
    assert!(matches!(err, ClientError::InvalidNodeRole(_)));
  }
}
