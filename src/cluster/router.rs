//! Node selection for routing a keyed command to a concrete endpoint.

use std::sync::atomic::{AtomicUsize, Ordering};

use crate::cluster::node::NodeInfo;
use crate::cluster::slot::{key_slot, Slot};
use crate::cluster::topology::{ClusterTopology, Shard};
use crate::error::{ClientError, Result};

/// How a read-only command picks a node among a shard's replicas. Writes
/// always go to the shard's primary regardless of policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NodeSelectionPolicy {
  #[default]
  Primary,
  CycleReplicas,
  CycleAllNodes,
}

/// Round-robin cursor for replica/all-node cycling. One instance is shared
/// by every command routed against a given client.
#[derive(Debug, Default)]
pub struct NodeSelector {
  cursor: AtomicUsize,
}

impl NodeSelector {
  pub fn new() -> Self {
    Self { cursor: AtomicUsize::new(0) }
  }

  /// Choose a node within `shard` for a command, honoring `policy` for
  /// reads. `write` forces primary selection regardless of policy.
  pub fn select<'a>(&self, shard: &'a Shard, policy: NodeSelectionPolicy, write: bool) -> &'a NodeInfo {
    if write || policy == NodeSelectionPolicy::Primary {
      return &shard.primary;
    }
    let candidates: Vec<&NodeInfo> = match policy {
      NodeSelectionPolicy::CycleReplicas if !shard.replicas.is_empty() => shard.replicas.iter().collect(),
      NodeSelectionPolicy::CycleAllNodes => {
        std::iter::once(&shard.primary).chain(shard.replicas.iter()).collect()
      }
      _ => return &shard.primary,
    };
    let idx = self.cursor.fetch_add(1, Ordering::Relaxed) % candidates.len();
    candidates[idx]
  }
}

/// Compute the slot for a set of routing keys, ensuring they all agree.
pub fn slot_for_keys<'a>(keys: impl IntoIterator<Item = &'a [u8]>) -> Result<Slot> {
  let mut slot: Option<Slot> = None;
  for key in keys {
    let s = key_slot(key);
    match slot {
      None => slot = Some(s),
      Some(existing) if existing != s => return Err(ClientError::CrossSlot),
      _ => {}
    }
  }
  slot.ok_or(ClientError::CrossSlot)
}

/// Resolve the target node for a command whose routing slot is known.
pub fn route<'a>(
  topology: &'a ClusterTopology,
  selector: &NodeSelector,
  slot: Slot,
  policy: NodeSelectionPolicy,
  write: bool,
) -> Option<&'a NodeInfo> {
  let shard = topology.shard_for_slot(slot)?;
  Some(selector.select(shard, policy, write))
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn cross_slot_keys_are_rejected() {
    let err = slot_for_keys(vec![&b"foo"[..], &b"bar"[..]]).unwrap_err();
    assert!(matches!(err, ClientError::CrossSlot));
  }

  #[test]
  fn hash_tagged_keys_share_a_slot() {
    let slot = slot_for_keys(vec![&b"{user}.profile"[..], &b"{user}.history"[..]]).unwrap();
    assert_eq!(slot, key_slot(b"user"));
  }
}
