//! Pure state-machine actions for the one-node-to-replicas bootstrap
//! described in §4.6: deciding which node connection pools must start or
//! stop as the client's view of the deployment changes, without actually
//! starting or stopping anything itself.

use crate::cluster::node::NodeEndpoint;
use crate::cluster::ClientState;

/// What the caller (the manager owning a pool of per-node connections)
/// must do in response to a topology change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleAction {
  DoNothing,
  /// Start a connection pool for a freshly learned single primary.
  RunNode(NodeEndpoint),
  /// Start a connection pool for a freshly learned primary, then kick off
  /// replica discovery against it.
  RunNodeAndFindReplicas(NodeEndpoint),
  /// Reconcile a shard's replica set: start pools for `to_run`, drain and
  /// shut down pools for `to_shutdown`.
  AddReplicas { to_run: Vec<NodeEndpoint>, to_shutdown: Vec<NodeEndpoint> },
}

/// Decide the action for a newly observed primary endpoint. A redundant
/// `set_primary` call naming the node the client already treats as the
/// sole primary is a no-op.
pub fn set_primary(current: &ClientState, endpoint: NodeEndpoint, discover_replicas: bool) -> LifecycleAction {
  if let ClientState::OnePrimary(existing) = current {
    if *existing == endpoint {
      return LifecycleAction::DoNothing;
    }
  }
  if discover_replicas {
    LifecycleAction::RunNodeAndFindReplicas(endpoint)
  } else {
    LifecycleAction::RunNode(endpoint)
  }
}

/// Reconcile a shard's previously-known replica set against a freshly
/// discovered one.
pub fn add_replicas(known: &[NodeEndpoint], discovered: &[NodeEndpoint]) -> LifecycleAction {
  let to_run: Vec<NodeEndpoint> = discovered.iter().filter(|e| !known.contains(e)).cloned().collect();
  let to_shutdown: Vec<NodeEndpoint> = known.iter().filter(|e| !discovered.contains(e)).cloned().collect();
  if to_run.is_empty() && to_shutdown.is_empty() {
    LifecycleAction::DoNothing
  } else {
    LifecycleAction::AddReplicas { to_run, to_shutdown }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn ep(port: u16) -> NodeEndpoint {
    NodeEndpoint::new("127.0.0.1", port)
  }

  #[test]
  fn redundant_set_primary_is_a_no_op() {
    let state = ClientState::OnePrimary(ep(7000));
    assert_eq!(set_primary(&state, ep(7000), false), LifecycleAction::DoNothing);
  }

  #[test]
  fn new_primary_without_replica_discovery_just_runs_the_node() {
    let state = ClientState::Uninitialized;
    assert_eq!(set_primary(&state, ep(7000), false), LifecycleAction::RunNode(ep(7000)));
  }

  #[test]
  fn new_primary_with_replica_discovery_requests_replica_lookup() {
    let state = ClientState::Uninitialized;
    assert_eq!(
      set_primary(&state, ep(7000), true),
      LifecycleAction::RunNodeAndFindReplicas(ep(7000))
    );
  }

  #[test]
  fn add_replicas_computes_a_symmetric_difference() {
    let known = vec![ep(7001), ep(7002)];
    let discovered = vec![ep(7002), ep(7003)];
    let action = add_replicas(&known, &discovered);
    assert_eq!(
      action,
      LifecycleAction::AddReplicas { to_run: vec![ep(7003)], to_shutdown: vec![ep(7001)] }
    );
  }

  #[test]
  fn unchanged_replica_set_is_a_no_op() {
    let known = vec![ep(7001)];
    assert_eq!(add_replicas(&known, &known), LifecycleAction::DoNothing);
  }
}
