//! Structured error type shared across the wire codec, connection pipeline,
//! subscription manager, and cluster router.

use thiserror::Error;

use crate::cluster::{NodeEndpoint, Slot};

/// Every way a request against this crate can fail.
///
/// Parsing and protocol variants close the connection that produced them;
/// `CommandError` and the cluster redirection variants are returned to the
/// caller that issued the offending command without disturbing anyone else
/// waiting on the same connection.
#[derive(Debug, Error)]
pub enum ClientError {
  #[error("invalid leading byte {0:#04x}")]
  InvalidLeadingByte(u8),

  #[error("can not parse integer token")]
  CanNotParseInteger,

  #[error("can not parse big number token")]
  CanNotParseBigNumber,

  #[error("can not parse double token")]
  CanNotParseDouble,

  #[error("aggregate type nested past the allowed depth")]
  TooDeeplyNestedAggregatedTypes,

  #[error("malformed RESP data: {0}")]
  DataMalformed(String),

  #[error("received a reply with no matching in-flight command")]
  UnsolicitedToken,

  #[error("malformed push frame: {0}")]
  SubscriptionError(String),

  #[error("server returned an error: {0}")]
  CommandError(String),

  #[error("connection closed")]
  ConnectionClosed,

  #[error("connection closed due to cancellation of an in-flight command")]
  ConnectionClosedDueToCancellation,

  #[error("command cancelled before it reached the wire")]
  Cancelled,

  #[error("key moved to {endpoint} (slot {slot})")]
  Moved { slot: Slot, endpoint: NodeEndpoint },

  #[error("ask redirect to {endpoint} (slot {slot})")]
  Ask { slot: Slot, endpoint: NodeEndpoint },

  #[error("command keys span more than one slot")]
  CrossSlot,

  #[error("unrecognized node role {0:?}")]
  InvalidNodeRole(String),

  #[error("unrecognized node health {0:?}")]
  InvalidNodeHealth(String),

  #[error("CLUSTER SLOTS reply's slots field was not an array")]
  SlotsTokenIsNotAnArray,

  #[error("CLUSTER SHARDS reply's nodes field was not an array")]
  NodesTokenIsNotAnArray,

  #[error("could not decode value from token: {0}")]
  DecodeError(String),

  #[error("exceeded the configured redirect budget without settling")]
  RedirectBudgetExceeded,
}

pub type Result<T> = std::result::Result<T, ClientError>;
