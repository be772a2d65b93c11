//! The generic command/key-extraction contract.
//!
//! `keys_affected` is a concrete `Vec<Bytes>` on [`RoutableCommand`], not a
//! method generic over the command type, so heterogeneous commands can
//! share one queue.

use bytes::Bytes;

use crate::resp::encoder::CommandEncoder;

/// Anything that can produce an outbound RESP array of bulk strings via
/// the encoder.
pub trait CommandArgs {
  fn encode(&self, enc: &mut CommandEncoder);
}

/// The simplest possible `CommandArgs`: an owned, ordered argument list.
/// Callers (or a higher-level command catalog, out of scope here) can
/// build a command without implementing a bespoke type per command.
#[derive(Debug, Clone)]
pub struct ArgList(pub Vec<Bytes>);

impl ArgList {
  pub fn new() -> Self {
    Self(Vec::new())
  }

  pub fn push(mut self, arg: impl Into<Bytes>) -> Self {
    self.0.push(arg.into());
    self
  }
}

impl Default for ArgList {
  fn default() -> Self {
    Self::new()
  }
}

impl CommandArgs for ArgList {
  fn encode(&self, enc: &mut CommandEncoder) {
    for a in &self.0 {
      enc.arg(a);
    }
  }
}

/// Pairs an encoded command with the concrete set of keys it touches, so
/// the cluster router can compute a routing slot without needing to know
/// anything about the command's own type.
pub struct RoutableCommand {
  args: Box<dyn CommandArgs + Send + Sync>,
  keys_affected: Vec<Bytes>,
}

impl RoutableCommand {
  pub fn new(args: impl CommandArgs + Send + Sync + 'static, keys_affected: Vec<Bytes>) -> Self {
    Self { args: Box::new(args), keys_affected }
  }

  /// A command that touches no keys (e.g. `PING`, `CLUSTER SHARDS`):
  /// routed to any node, never subject to cross-slot checks.
  pub fn keyless(args: impl CommandArgs + Send + Sync + 'static) -> Self {
    Self::new(args, Vec::new())
  }

  pub fn keys_affected(&self) -> &[Bytes] {
    &self.keys_affected
  }

  pub fn encode(&self) -> CommandEncoder {
    let mut enc = CommandEncoder::new();
    self.args.encode(&mut enc);
    enc
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn arg_list_encodes_as_a_resp_array_of_bulk_strings() {
    let args = ArgList::new().push(&b"GET"[..]).push(&b"foo"[..]);
    let mut enc = CommandEncoder::new();
    args.encode(&mut enc);
    assert_eq!(&enc.finish()[..], b"*2\r\n$3\r\nGET\r\n$3\r\nfoo\r\n");
  }

  #[test]
  fn routable_command_carries_its_keys_for_slot_computation() {
    let cmd = RoutableCommand::new(
      ArgList::new().push(&b"GET"[..]).push(&b"foo"[..]),
      vec![Bytes::from_static(b"foo")],
    );
    assert_eq!(cmd.keys_affected(), &[Bytes::from_static(b"foo")]);
  }
}
