//! A single-connection client: the thin, typed-decode-friendly surface
//! callers actually hold. Wraps [`crate::connection::pipeline::ConnectionHandle`]
//! with `FromToken`-typed results instead of raw [`Token`]s.

use crate::config::ClientConfig;
use crate::connection::pipeline::{self, ConnectionHandle, Subscription};
use crate::error::Result;
use crate::resp::decode::FromToken;
use crate::resp::token::Token;

/// A connected client speaking RESP3 over a single transport.
#[derive(Clone)]
pub struct Client {
  handle: ConnectionHandle,
}

impl Client {
  /// Perform the `HELLO 3` handshake over `transport` and return a usable
  /// client. TLS and DNS resolution are the caller's responsibility.
  pub async fn connect<T>(transport: T, config: ClientConfig) -> Result<Self>
  where
    T: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin + Send + 'static,
  {
    let handle = pipeline::connect(transport, config).await?;
    Ok(Self { handle })
  }

  /// Send one command and decode its reply as `R`.
  pub async fn call<R: FromToken>(&self, args: &[&[u8]]) -> Result<R> {
    let token = self.handle.call(args).wait().await?;
    R::from_token(token)
  }

  /// Send one command and return the raw reply token, undecoded.
  pub async fn call_raw(&self, args: &[&[u8]]) -> Result<Token> {
    self.handle.call(args).wait().await
  }

  /// Run `MULTI`/.../`EXEC`, returning one raw result per member command.
  pub async fn transaction(&self, commands: &[&[&[u8]]]) -> Vec<Result<Token>> {
    self.handle.transaction(commands).await
  }

  pub fn subscribe(&self, channel: &str) -> Subscription {
    self.handle.subscribe(crate::pubsub::Kind::Channel, channel)
  }

  pub fn psubscribe(&self, pattern: &str) -> Subscription {
    self.handle.subscribe(crate::pubsub::Kind::Pattern, pattern)
  }

  pub fn ssubscribe(&self, shard_channel: &str) -> Subscription {
    self.handle.subscribe(crate::pubsub::Kind::Shard, shard_channel)
  }

  /// The underlying connection handle, for callers that need lower-level
  /// access (e.g. the cluster client building commands against a
  /// specific node).
  pub fn handle(&self) -> &ConnectionHandle {
    &self.handle
  }
}
