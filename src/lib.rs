#![allow(clippy::cognitive_complexity, clippy::large_enum_variant)]
#![warn(missing_debug_implementations, rust_2018_idioms, unreachable_pub)]
#![doc(test(
  no_crate_inject,
  attr(deny(warnings, rust_2018_idioms), allow(dead_code, unused_variables))
))]

//! # valkey-client-core
//!
//! A transport-agnostic core client library for a Valkey/Redis-compatible
//! in-memory data server: a RESP2/RESP3 wire codec, a single-connection
//! pipelined request/response multiplexer with pub/sub support, and a
//! cluster-aware router that follows `MOVED`/`ASK` redirects.
//!
//! This crate deliberately does not open sockets, resolve DNS, or terminate
//! TLS: callers hand it any `AsyncRead + AsyncWrite` transport and this
//! crate speaks the protocol over it.
//!
//! ## Single connection
//!
//! ```rust,no_run
//! use valkey_client_core::{Client, ClientConfig};
//!
//! # async fn run(stream: tokio::net::TcpStream) -> valkey_client_core::error::Result<()> {
//! let client = Client::connect(stream, ClientConfig::default()).await?;
//! let reply: String = client.call(&[b"GET", b"foo"]).await?;
//! println!("foo = {reply}");
//! # Ok(())
//! # }
//! ```
//!
//! ## Pub/sub
//!
//! ```rust,no_run
//! # async fn run(client: valkey_client_core::Client) {
//! let mut sub = client.subscribe("news");
//! while let Some(delivery) = sub.next().await {
//!     println!("{delivery:?}");
//! }
//! # }
//! ```
//!
//! ## Cluster routing
//!
//! Build a [`cluster_client::ClusterClient`] over a caller-supplied
//! [`cluster_client::Connector`] to route keyed commands to slot owners and
//! follow `MOVED`/`ASK` redirects automatically.

pub mod client;
pub mod cluster;
pub mod cluster_client;
pub mod command;
pub mod config;
pub mod connection;
pub mod error;
pub mod pubsub;
pub mod resp;

pub use client::Client;
pub use command::{ArgList, CommandArgs, RoutableCommand};
pub use config::ClientConfig;
pub use error::{ClientError, Result};
