//! An in-flight command: its wire bytes and a sink for the eventual reply.

use tokio::sync::oneshot;

use crate::error::Result;
use crate::resp::token::Token;

pub type ReplySender = oneshot::Sender<Result<Token>>;
pub type ReplyReceiver = oneshot::Receiver<Result<Token>>;

/// How the pipeline dispatcher should treat the next reply token bound for
/// this frame.
pub enum FrameKind {
  /// A single command awaiting a single reply.
  Normal(ReplySender),
  /// The `HELLO` handshake frame; identical to `Normal` but its failure
  /// means the connection never became usable.
  Hello(ReplySender),
  /// A `MULTI`/queued-command ack inside a transaction. The caller isn't
  /// waiting on this reply directly: it's consumed internally and
  /// discarded unless it's an error, in which case the transaction is
  /// already doomed to abort at `EXEC`.
  TransactionControl,
  /// The `EXEC` frame. Its array reply (or error, on `EXECABORT`) is
  /// decomposed across every queued command's own reply sender.
  TransactionExec(Vec<ReplySender>),
}

pub struct CommandFrame {
  pub id: u64,
  pub bytes: bytes::Bytes,
  pub kind: FrameKind,
}

impl CommandFrame {
  pub fn new(id: u64, bytes: bytes::Bytes, kind: FrameKind) -> Self {
    Self { id, bytes, kind }
  }

  /// Complete this frame with a terminal error, e.g. on connection close.
  pub fn fail(self, err: crate::error::ClientError) {
    match self.kind {
      FrameKind::Normal(tx) | FrameKind::Hello(tx) => {
        let _ = tx.send(Err(err));
      }
      FrameKind::TransactionControl => {}
      FrameKind::TransactionExec(members) => {
        for tx in members {
          let _ = tx.send(Err(clone_err(&err)));
        }
      }
    }
  }
}

fn clone_err(err: &crate::error::ClientError) -> crate::error::ClientError {
  // ClientError doesn't derive Clone (some variants wrap non-Clone data in
  // spirit, though today all fields happen to be Clone). Re-derive the
  // same shape explicitly so fan-out failures don't require `Clone`.
  use crate::error::ClientError::*;
  match err {
    ConnectionClosed => ConnectionClosed,
    ConnectionClosedDueToCancellation => ConnectionClosedDueToCancellation,
    Cancelled => Cancelled,
    UnsolicitedToken => UnsolicitedToken,
    CommandError(s) => CommandError(s.clone()),
    other => CommandError(other.to_string()),
  }
}
