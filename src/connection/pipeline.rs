//! The async connection actor: owns the transport, the inbound read
//! buffer, and drives [`PipelineState`] from parsed tokens while forwarding
//! push tokens to the subscription manager.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::{mpsc, oneshot};

use crate::config::ClientConfig;
use crate::connection::frame::{CommandFrame, FrameKind, ReplyReceiver};
use crate::connection::pending::{Outcome, PipelineState};
use crate::error::{ClientError, Result};
use crate::pubsub::registry::{Delivery, Kind, ListenerId, SubscriptionRegistry};
use crate::resp::encoder::CommandEncoder;
use crate::resp::parser;
use crate::resp::token::Token;

const READ_CHUNK: usize = 16 * 1024;

enum Message {
  Submit(CommandFrame),
  Cancel(u64),
  /// A fire-and-forget write with no pending-queue entry: SUBSCRIBE and
  /// UNSUBSCRIBE family commands are acknowledged by a push, which is
  /// routed to the subscription manager before it ever reaches the
  /// pending queue, so they never occupy a reply slot.
  WriteRaw(Bytes),
}

/// A cheap, cloneable handle to a running connection actor.
#[derive(Clone)]
pub struct ConnectionHandle {
  sender: mpsc::UnboundedSender<Message>,
  next_id: Arc<AtomicU64>,
  subscriptions: Arc<SubscriptionRegistry>,
}

/// Guards a reply receiver. Dropping it before the reply arrives tells the
/// pipeline this call was cancelled post-submission, which closes the
/// connection per the cancellation model in the connection handler design.
#[must_use = "a dropped PendingCall cancels the command and closes the connection"]
pub struct PendingCall {
  id: u64,
  sender: mpsc::UnboundedSender<Message>,
  rx: Option<ReplyReceiver>,
}

impl PendingCall {
  pub async fn wait(mut self) -> Result<Token> {
    let rx = self.rx.take().expect("wait() consumes the receiver exactly once");
    match rx.await {
      Ok(result) => result,
      Err(_) => Err(ClientError::ConnectionClosed),
    }
  }
}

impl Drop for PendingCall {
  fn drop(&mut self) {
    if self.rx.is_some() {
      let _ = self.sender.send(Message::Cancel(self.id));
    }
  }
}

impl ConnectionHandle {
  fn next_id(&self) -> u64 {
    self.next_id.fetch_add(1, Ordering::Relaxed)
  }

  fn submit_raw(&self, bytes: Bytes, kind_of: impl FnOnce(oneshot::Sender<Result<Token>>) -> FrameKind) -> PendingCall {
    let id = self.next_id();
    let (tx, rx) = oneshot::channel();
    let frame = CommandFrame::new(id, bytes, kind_of(tx));
    let _ = self.sender.send(Message::Submit(frame));
    PendingCall { id, sender: self.sender.clone(), rx: Some(rx) }
  }

  /// A transaction-internal frame (`MULTI`, or a queued member command)
  /// whose ack the caller never observes directly.
  fn submit_control(&self, bytes: Bytes) {
    let id = self.next_id();
    let frame = CommandFrame::new(id, bytes, FrameKind::TransactionControl);
    let _ = self.sender.send(Message::Submit(frame));
  }

  /// Encode and submit one command, returning a guard that resolves to its
  /// reply. Dropping the guard before it resolves closes the connection.
  pub fn call(&self, args: &[&[u8]]) -> PendingCall {
    let mut enc = CommandEncoder::with_capacity(args.len());
    for a in args {
      enc.arg(a);
    }
    self.submit_raw(enc.finish().freeze(), FrameKind::Normal)
  }

  fn hello(&self, args: &[&[u8]]) -> PendingCall {
    let mut enc = CommandEncoder::with_capacity(args.len());
    for a in args {
      enc.arg(a);
    }
    self.submit_raw(enc.finish().freeze(), FrameKind::Hello)
  }

  /// Run a `MULTI`/.../`EXEC` transaction, returning one result per member
  /// command in order. If the server aborts the transaction, every member
  /// result carries that failure.
  pub async fn transaction(&self, commands: &[&[&[u8]]]) -> Vec<Result<Token>> {
    self.submit_control(CommandEncoder::new().pure_token("MULTI").finish().freeze());

    for cmd in commands {
      let mut enc = CommandEncoder::with_capacity(cmd.len());
      for a in *cmd {
        enc.arg(a);
      }
      self.submit_control(enc.finish().freeze());
    }

    let mut member_txs = Vec::with_capacity(commands.len());
    let mut member_rxs = Vec::with_capacity(commands.len());
    for _ in commands {
      let (tx, rx) = oneshot::channel();
      member_txs.push(tx);
      member_rxs.push(rx);
    }

    let exec_id = self.next_id();
    let exec_bytes = CommandEncoder::new().pure_token("EXEC").finish().freeze();
    let exec_frame = CommandFrame::new(exec_id, exec_bytes, FrameKind::TransactionExec(member_txs));
    let _ = self.sender.send(Message::Submit(exec_frame));

    let mut out = Vec::with_capacity(member_rxs.len());
    for rx in member_rxs {
      out.push(rx.await.unwrap_or(Err(ClientError::ConnectionClosed)));
    }
    out
  }

  pub fn subscriptions(&self) -> &Arc<SubscriptionRegistry> {
    &self.subscriptions
  }

  /// Subscribe to a channel/pattern/shard-channel. Coalesces with any
  /// other outstanding listener on the same key: only the first add on an
  /// empty key writes a wire command.
  pub fn subscribe(&self, kind: Kind, key: &str) -> Subscription {
    let (verb, id, rx) = self.subscriptions.add(kind, key);
    if let Some(verb) = verb {
      let mut enc = CommandEncoder::new();
      enc.arg_str(verb);
      enc.arg_str(key);
      let _ = self.sender.send(Message::WriteRaw(enc.finish().freeze()));
    }
    Subscription { handle: self.clone(), kind, key: key.to_string(), id: Some(id), rx }
  }
}

/// An active subscription. Dropping it unsubscribes the listener; if it
/// was the last listener on this key, the UNSUBSCRIBE family command is
/// written to the wire.
pub struct Subscription {
  handle: ConnectionHandle,
  kind: Kind,
  key: String,
  id: Option<ListenerId>,
  rx: mpsc::Receiver<Delivery>,
}

impl Subscription {
  /// Receive the next message for this subscription, or `None` once the
  /// connection has closed and every in-flight delivery has drained.
  pub async fn next(&mut self) -> Option<Delivery> {
    self.rx.recv().await
  }
}

impl Drop for Subscription {
  fn drop(&mut self) {
    if let Some(id) = self.id.take() {
      if let Some(verb) = self.handle.subscriptions.remove(self.kind, &self.key, id) {
        let mut enc = CommandEncoder::new();
        enc.arg_str(verb);
        enc.arg_str(&self.key);
        let _ = self.handle.sender.send(Message::WriteRaw(enc.finish().freeze()));
      }
    }
  }
}

/// Spawn a connection actor over `transport`, performing the `HELLO 3`
/// handshake before returning a usable handle. `transport` is any
/// bidirectional byte channel; TLS and DNS resolution happen before this
/// call, outside the scope of this crate.
pub async fn connect<T>(mut transport: T, config: ClientConfig) -> Result<ConnectionHandle>
where
  T: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin + Send + 'static,
{
  let (tx, mut inbox) = mpsc::unbounded_channel::<Message>();
  let subscriptions = Arc::new(SubscriptionRegistry::new(config.subscriber_channel_capacity));
  let handle = ConnectionHandle { sender: tx, next_id: Arc::new(AtomicU64::new(1)), subscriptions: subscriptions.clone() };

  let mut hello_args: Vec<&[u8]> = vec![b"HELLO", b"3"];
  if let Some((user, pass)) = &config.auth {
    hello_args.push(b"AUTH");
    hello_args.push(user.as_bytes());
    hello_args.push(pass.as_bytes());
  }
  if let Some(name) = &config.client_name {
    hello_args.push(b"SETNAME");
    hello_args.push(name.as_bytes());
  }
  let hello = handle.hello(&hello_args);
  let max_depth = config.max_parse_depth;

  tokio::spawn(async move {
    let mut state = PipelineState::new();
    let mut read_buf = BytesMut::with_capacity(READ_CHUNK);
    let mut parse_buf = Bytes::new();

    'outer: loop {
      tokio::select! {
        biased;
        msg = inbox.recv() => {
          match msg {
            None => break,
            Some(Message::Submit(frame)) => {
              if let Err(e) = transport.write_all(&frame.bytes).await {
                log::warn!("write failed: {e}");
                frame.fail(ClientError::ConnectionClosed);
                break;
              }
              state.submit(frame);
            }
            Some(Message::Cancel(id)) => {
              if let Outcome::Close(reason) = state.on_cancel(id) {
                log::warn!("connection closing due to cancellation: {reason}");
                break;
              }
            }
            Some(Message::WriteRaw(bytes)) => {
              if let Err(e) = transport.write_all(&bytes).await {
                log::warn!("write failed: {e}");
                break;
              }
            }
          }
        }
        n = transport.read(&mut scratch_buf(&mut read_buf, READ_CHUNK)) => {
          match n {
            Ok(0) => {
              log::debug!("transport closed by peer");
              break;
            }
            Ok(read) => {
              let chunk = read_buf.split_to(read).freeze();
              parse_buf = concat(parse_buf, chunk);
              loop {
                match parser::parse_one(&mut parse_buf, 1, max_depth) {
                  Ok(None) => break,
                  Ok(Some(token)) => match state.on_token(token) {
                    Outcome::Continue => {}
                    Outcome::RouteToSubscriptions(push) => {
                      match subscriptions.on_push(push).await {
                        Ok(Some((verb, key))) => {
                          let mut enc = CommandEncoder::new();
                          enc.arg_str(verb);
                          enc.arg_str(&key);
                          if let Err(e) = transport.write_all(&enc.finish().freeze()).await {
                            log::warn!("write failed: {e}");
                            break 'outer;
                          }
                        }
                        Ok(None) => {}
                        Err(e) => {
                          log::warn!("malformed push frame, closing connection: {e}");
                          break 'outer;
                        }
                      }
                    }
                    Outcome::Close(reason) => {
                      log::warn!("connection closing: {reason}");
                      break 'outer;
                    }
                  },
                  Err(e) => {
                    log::warn!("parse error, closing connection: {e}");
                    break 'outer;
                  }
                }
              }
            }
            Err(e) => {
              log::warn!("read failed: {e}");
              break;
            }
          }
        }
      }
    }
    subscriptions.close(ClientError::ConnectionClosed);
  });

  match hello.wait().await {
    Ok(_) => {
      log::debug!("connection handshake complete");
      Ok(handle)
    }
    Err(e) => {
      log::warn!("HELLO handshake failed: {e}");
      Err(e)
    }
  }
}

fn scratch_buf(buf: &mut BytesMut, chunk: usize) -> &mut [u8] {
  buf.clear();
  buf.resize(chunk, 0);
  &mut buf[..]
}

fn concat(head: Bytes, tail: Bytes) -> Bytes {
  if head.is_empty() {
    return tail;
  }
  let mut combined = BytesMut::with_capacity(head.len() + tail.len());
  combined.extend_from_slice(&head);
  combined.extend_from_slice(&tail);
  combined.freeze()
}
