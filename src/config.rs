//! In-crate configuration, consumed by the parser, pipeline, subscription,
//! and cluster modules. Nothing here is parsed from a file or environment.

use crate::cluster::NodeSelectionPolicy;

/// Maximum recursion depth the RESP parser will descend into nested
/// aggregates before failing with [`crate::error::ClientError::TooDeeplyNestedAggregatedTypes`].
pub const DEFAULT_MAX_PARSE_DEPTH: usize = 100;

/// Tunables for a single connection or a cluster-aware client built on top
/// of it.
#[derive(Debug, Clone)]
pub struct ClientConfig {
  /// Recursion bound for nested arrays/sets/maps/pushes/attributes.
  pub max_parse_depth: usize,
  /// Soft capacity hint for the pending-reply queue; the queue itself is
  /// unbounded (pipelining must never deadlock), this only sizes its
  /// initial allocation.
  pub pending_queue_capacity: usize,
  /// Bound on the per-listener subscription message channel. When full,
  /// delivery blocks rather than drops.
  pub subscriber_channel_capacity: usize,
  /// Maximum number of MOVED/ASK redirects a single command will follow
  /// before failing with a terminal redirection error.
  pub max_redirects: u32,
  /// How a read-only command picks a node among a shard's replicas.
  pub node_selection_policy: NodeSelectionPolicy,
  /// Number of MOVED replies observed within `moved_storm_window` that
  /// triggers an unsolicited topology refresh.
  pub moved_storm_threshold: u32,
  /// `AUTH <user> <pass>` tokens appended to the `HELLO 3` handshake, when
  /// the server requires authentication.
  pub auth: Option<(String, String)>,
  /// `SETNAME <name>` token appended to the `HELLO 3` handshake, for
  /// naming this connection in `CLIENT LIST` on the server.
  pub client_name: Option<String>,
}

impl Default for ClientConfig {
  fn default() -> Self {
    Self {
      max_parse_depth: DEFAULT_MAX_PARSE_DEPTH,
      pending_queue_capacity: 64,
      subscriber_channel_capacity: 256,
      max_redirects: 5,
      node_selection_policy: NodeSelectionPolicy::Primary,
      moved_storm_threshold: 10,
      auth: None,
      client_name: None,
    }
  }
}
