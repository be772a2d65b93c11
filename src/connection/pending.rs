//! The pending-reply queue and the pure dispatch logic over it.
//!
//! [`PipelineState`] holds no I/O: it only decides, given an inbound
//! token, which frame (if any) it completes and whether the connection
//! must close. This makes the core in-order/push-isolation/cancellation
//! behavior unit-testable without a transport.

use std::collections::VecDeque;

use crate::connection::frame::{CommandFrame, FrameKind};
use crate::error::ClientError;
use crate::resp::token::Token;

/// What the caller of [`PipelineState`] must do in response to a dispatch.
pub enum Outcome {
  /// Nothing further needed; keep reading.
  Continue,
  /// This was a push token; hand it to the subscription manager.
  RouteToSubscriptions(Token),
  /// The connection must close with the given reason; every remaining
  /// pending frame has already been failed with it.
  Close(ClientError),
}

#[derive(Default)]
pub struct PipelineState {
  pending: VecDeque<CommandFrame>,
  in_transaction: bool,
  closed: bool,
}

impl PipelineState {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn is_closed(&self) -> bool {
    self.closed
  }

  pub fn pending_len(&self) -> usize {
    self.pending.len()
  }

  /// Enqueue a newly-submitted frame. Transaction bookkeeping: a
  /// `TransactionExec` frame marks the end of the in-flight transaction.
  pub fn submit(&mut self, frame: CommandFrame) {
    if matches!(frame.kind, FrameKind::TransactionExec(_)) {
      self.in_transaction = false;
    } else if matches!(frame.kind, FrameKind::TransactionControl) {
      self.in_transaction = true;
    }
    self.pending.push_back(frame);
  }

  /// Dispatch one inbound token.
  pub fn on_token(&mut self, token: Token) -> Outcome {
    if self.closed {
      return Outcome::Continue;
    }
    if token.is_push() {
      return Outcome::RouteToSubscriptions(token);
    }
    let frame = match self.pending.pop_front() {
      Some(f) => f,
      None => return self.close(ClientError::UnsolicitedToken),
    };
    match frame.kind {
      FrameKind::Normal(tx) => {
        let result = if token.is_error() {
          Err(ClientError::CommandError(token.error_message().unwrap_or_default()))
        } else {
          Ok(token)
        };
        let _ = tx.send(result);
        Outcome::Continue
      }
      FrameKind::Hello(tx) => {
        let failed = token.is_error();
        let result = if failed {
          Err(ClientError::CommandError(token.error_message().unwrap_or_default()))
        } else {
          Ok(token)
        };
        let _ = tx.send(result);
        if failed {
          return self.close(ClientError::ConnectionClosed);
        }
        Outcome::Continue
      }
      FrameKind::TransactionControl => Outcome::Continue,
      FrameKind::TransactionExec(members) => {
        if token.is_error() {
          let msg = token.error_message().unwrap_or_default();
          for tx in members {
            let _ = tx.send(Err(ClientError::CommandError(msg.clone())));
          }
          return Outcome::Continue;
        }
        match token {
          Token::Array(agg) | Token::Set(agg) => {
            if agg.len() != members.len() {
              for tx in members {
                let _ = tx.send(Err(ClientError::DecodeError(
                  "EXEC reply arity did not match the number of queued commands".into(),
                )));
              }
              return Outcome::Continue;
            }
            for (child, tx) in agg.iter().zip(members) {
              let result = match child {
                Ok(t) if t.is_error() => Err(ClientError::CommandError(t.error_message().unwrap_or_default())),
                Ok(t) => Ok(t),
                Err(e) => Err(e),
              };
              let _ = tx.send(result);
            }
            Outcome::Continue
          }
          Token::Null => {
            for tx in members {
              let _ = tx.send(Err(ClientError::CommandError("EXECABORT".into())));
            }
            Outcome::Continue
          }
          other => {
            for tx in members {
              let _ = tx.send(Err(ClientError::DecodeError(format!(
                "expected EXEC to reply with an array, found {:?}",
                other
              ))));
            }
            Outcome::Continue
          }
        }
      }
    }
  }

  /// A caller cancelled its wait on `id` after the frame was already
  /// enqueued. Per the cancellation model this closes the connection and
  /// fails every other in-flight frame; the cancelled frame itself is
  /// simply dropped (nothing is listening to its reply anymore).
  pub fn on_cancel(&mut self, id: u64) -> Outcome {
    if self.closed {
      return Outcome::Continue;
    }
    if let Some(pos) = self.pending.iter().position(|f| f.id == id) {
      self.pending.remove(pos);
      return self.close(ClientError::ConnectionClosedDueToCancellation);
    }
    Outcome::Continue
  }

  fn close(&mut self, reason: ClientError) -> Outcome {
    self.closed = true;
    while let Some(frame) = self.pending.pop_front() {
      frame.fail(clone_for_fanout(&reason));
    }
    Outcome::Close(reason)
  }
}

fn clone_for_fanout(err: &ClientError) -> ClientError {
  match err {
    ClientError::UnsolicitedToken => ClientError::UnsolicitedToken,
    ClientError::ConnectionClosed => ClientError::ConnectionClosed,
    ClientError::ConnectionClosedDueToCancellation => ClientError::ConnectionClosedDueToCancellation,
    other => ClientError::CommandError(other.to_string()),
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use bytes::Bytes;
  use tokio::sync::oneshot;

  fn normal_frame(id: u64) -> (CommandFrame, oneshot::Receiver<crate::error::Result<Token>>) {
    let (tx, rx) = oneshot::channel();
    (CommandFrame::new(id, Bytes::new(), FrameKind::Normal(tx)), rx)
  }

  #[test]
  fn replies_are_delivered_in_submission_order() {
    let mut state = PipelineState::new();
    let (f1, r1) = normal_frame(1);
    let (f2, r2) = normal_frame(2);
    state.submit(f1);
    state.submit(f2);

    assert!(matches!(state.on_token(Token::Number(1)), Outcome::Continue));
    assert!(matches!(state.on_token(Token::Number(2)), Outcome::Continue));

    assert_eq!(r1.try_recv().unwrap().ok().map(|t| matches!(t, Token::Number(1))), Some(true));
    assert_eq!(r2.try_recv().unwrap().ok().map(|t| matches!(t, Token::Number(2))), Some(true));
  }

  #[test]
  fn push_tokens_never_consume_a_pending_slot() {
    let mut state = PipelineState::new();
    let (f1, r1) = normal_frame(1);
    state.submit(f1);

    let push = Token::Push(crate::resp::token::Aggregate::new(Bytes::new(), 0, 0, 1, 100));
    assert!(matches!(state.on_token(push), Outcome::RouteToSubscriptions(_)));
    assert_eq!(state.pending_len(), 1);

    assert!(matches!(state.on_token(Token::Number(7)), Outcome::Continue));
    assert!(matches!(r1.try_recv().unwrap().unwrap(), Token::Number(7)));
  }

  #[test]
  fn unsolicited_reply_closes_the_connection() {
    let mut state = PipelineState::new();
    let outcome = state.on_token(Token::SimpleString(Bytes::from_static(b"OK")));
    assert!(matches!(outcome, Outcome::Close(ClientError::UnsolicitedToken)));
    assert!(state.is_closed());
  }

  #[test]
  fn cancelling_an_in_flight_frame_closes_the_connection_and_fails_the_rest() {
    let mut state = PipelineState::new();
    let (f1, _r1) = normal_frame(1);
    let (f2, r2) = normal_frame(2);
    state.submit(f1);
    state.submit(f2);

    let outcome = state.on_cancel(1);
    assert!(matches!(outcome, Outcome::Close(ClientError::ConnectionClosedDueToCancellation)));
    assert!(matches!(
      r2.try_recv().unwrap().unwrap_err(),
      ClientError::ConnectionClosedDueToCancellation
    ));
  }
}
