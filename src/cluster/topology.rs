//! Slot-to-node map and shard inventory, plus MOVED/ASK application.

use std::collections::HashMap;

use crate::cluster::node::{NodeEndpoint, NodeId, NodeInfo, NodeRole};
use crate::cluster::slot::{Slot, SLOT_COUNT};

/// A shard: one primary plus zero or more replicas, and the slot ranges it
/// owns.
#[derive(Debug, Clone)]
pub struct Shard {
  pub primary: NodeInfo,
  pub replicas: Vec<NodeInfo>,
  pub slot_ranges: Vec<(Slot, Slot)>,
}

impl Shard {
  pub fn owns(&self, slot: Slot) -> bool {
    self.slot_ranges.iter().any(|&(lo, hi)| slot >= lo && slot <= hi)
  }
}

/// The client's current view of cluster layout.
#[derive(Debug, Clone, Default)]
pub struct ClusterTopology {
  shards: Vec<Shard>,
  slot_owner: HashMap<Slot, usize>,
}

impl ClusterTopology {
  pub fn empty() -> Self {
    Self::default()
  }

  /// Replace the topology atomically from a freshly discovered shard list.
  pub fn from_shards(shards: Vec<Shard>) -> Self {
    let mut slot_owner = HashMap::new();
    for (idx, shard) in shards.iter().enumerate() {
      for &(lo, hi) in &shard.slot_ranges {
        for slot in lo..=hi {
          slot_owner.insert(slot, idx);
        }
      }
    }
    Self { shards, slot_owner }
  }

  pub fn shards(&self) -> &[Shard] {
    &self.shards
  }

  pub fn shard_for_slot(&self, slot: Slot) -> Option<&Shard> {
    self.slot_owner.get(&slot).map(|&idx| &self.shards[idx])
  }

  pub fn primary_for_slot(&self, slot: Slot) -> Option<&NodeInfo> {
    self.shard_for_slot(slot).map(|s| &s.primary)
  }

  pub fn replicas_for_slot(&self, slot: Slot) -> &[NodeInfo] {
    self.shard_for_slot(slot).map(|s| s.replicas.as_slice()).unwrap_or(&[])
  }

  /// Every node endpoint currently known, primary or replica.
  pub fn all_endpoints(&self) -> Vec<&NodeEndpoint> {
    self
      .shards
      .iter()
      .flat_map(|s| std::iter::once(&s.primary.endpoint).chain(s.replicas.iter().map(|r| &r.endpoint)))
      .collect()
  }

  /// Apply a MOVED redirect: the slot is now definitively owned by
  /// `endpoint`. If `endpoint` matches no existing node, a bare record is
  /// installed as that slot's primary until the next full refresh fills in
  /// its id/health/replicas.
  pub fn record_moved(&mut self, slot: Slot, endpoint: NodeEndpoint) {
    if let Some(shard) = self.slot_owner.get(&slot).map(|&i| i) {
      if self.shards[shard].primary.endpoint == endpoint {
        return;
      }
    }
    let new_idx = self.shards.len();
    self.shards.push(Shard {
      primary: NodeInfo {
        id: endpoint.to_string(),
        endpoint,
        role: NodeRole::Primary,
        health: crate::cluster::node::NodeHealth::Online,
        replication_offset: 0,
      },
      replicas: Vec::new(),
      slot_ranges: vec![(slot, slot)],
    });
    self.slot_owner.insert(slot, new_idx);
  }

  pub fn slot_count_covered(&self) -> usize {
    self.slot_owner.len()
  }

  pub fn is_fully_covered(&self) -> bool {
    self.slot_owner.len() as u32 == SLOT_COUNT as u32
  }

  pub fn node_by_id(&self, id: &NodeId) -> Option<&NodeInfo> {
    self.shards.iter().flat_map(|s| std::iter::once(&s.primary).chain(s.replicas.iter())).find(|n| &n.id == id)
  }
}
