//! The subscription registry: per-channel listener sets driven by the pure
//! state machine in [`crate::pubsub::state`], plus push-token decoding and
//! fan-out to listener streams.

use std::collections::HashMap;
use std::sync::Mutex;

use tokio::sync::mpsc;

use crate::error::{ClientError, Result};
use crate::pubsub::push::{decode_push, PushMessage};
use crate::pubsub::state::{ChannelState, Event, Instruction};
use crate::resp::token::Token;

/// One message delivered to a subscriber.
#[derive(Debug, Clone)]
pub struct Delivery {
  pub channel: String,
  pub payload: bytes::Bytes,
  pub pattern: Option<String>,
}

/// Identifies one listener's slot within a channel entry, returned by
/// [`SubscriptionRegistry::add`] and required to later [`SubscriptionRegistry::remove`] it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListenerId(u64);

struct Listener {
  id: ListenerId,
  sender: mpsc::Sender<Delivery>,
}

struct ChannelEntry {
  state: ChannelState,
  listeners: Vec<Listener>,
}

impl ChannelEntry {
  fn new() -> Self {
    Self { state: ChannelState::Empty, listeners: Vec::new() }
  }
}

/// Tracks channel, pattern, and shard subscriptions as three independent
/// keyspaces over the same per-key state machine, plus a fixed always-on
/// slot for key-invalidation pushes.
#[derive(Default)]
struct Tables {
  channels: HashMap<String, ChannelEntry>,
  patterns: HashMap<String, ChannelEntry>,
  shard_channels: HashMap<String, ChannelEntry>,
}

pub struct SubscriptionRegistry {
  tables: Mutex<Tables>,
  listener_capacity: usize,
  invalidation: Mutex<Vec<mpsc::Sender<Delivery>>>,
  next_listener_id: std::sync::atomic::AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
  Channel,
  Pattern,
  Shard,
}

impl Kind {
  fn subscribe_verb(self) -> &'static str {
    match self {
      Kind::Channel => "SUBSCRIBE",
      Kind::Pattern => "PSUBSCRIBE",
      Kind::Shard => "SSUBSCRIBE",
    }
  }

  fn unsubscribe_verb(self) -> &'static str {
    match self {
      Kind::Channel => "UNSUBSCRIBE",
      Kind::Pattern => "PUNSUBSCRIBE",
      Kind::Shard => "SUNSUBSCRIBE",
    }
  }
}

impl SubscriptionRegistry {
  pub fn new(listener_capacity: usize) -> Self {
    Self {
      tables: Mutex::new(Tables::default()),
      listener_capacity,
      invalidation: Mutex::new(Vec::new()),
      next_listener_id: std::sync::atomic::AtomicU64::new(1),
    }
  }

  /// Register a new listener for `key`, returning the wire command (if
  /// any) the caller must now send, this listener's id, and the receiver
  /// the listener reads from.
  pub fn add(&self, kind: Kind, key: &str) -> (Option<&'static str>, ListenerId, mpsc::Receiver<Delivery>) {
    let (tx, rx) = mpsc::channel(self.listener_capacity);
    let id = ListenerId(self.next_listener_id.fetch_add(1, std::sync::atomic::Ordering::Relaxed));
    let mut tables = self.tables.lock().unwrap();
    let table = Self::table_mut(&mut tables, kind);
    let entry = table.entry(key.to_string()).or_insert_with(ChannelEntry::new);
    let (next_state, instruction) = entry.state.transition(Event::Add);
    entry.state = next_state;
    entry.listeners.push(Listener { id, sender: tx });
    let cmd = match instruction {
      Instruction::Subscribe => Some(kind.subscribe_verb()),
      _ => None,
    };
    (cmd, id, rx)
  }

  /// A listener for `key` has departed. Returns the wire verb to send (as
  /// `Some(verb)`) when this was the last listener for the key.
  pub fn remove(&self, kind: Kind, key: &str, listener: ListenerId) -> Option<&'static str> {
    let mut tables = self.tables.lock().unwrap();
    let table = Self::table_mut(&mut tables, kind);
    let entry = table.get_mut(key)?;
    entry.listeners.retain(|l| l.id != listener);
    let last = entry.listeners.is_empty();
    let (next_state, instruction) = entry.state.transition(Event::Close { last_listener_departed: last });
    entry.state = next_state;
    match instruction {
      Instruction::Unsubscribe => Some(kind.unsubscribe_verb()),
      _ => None,
    }
  }

  fn table_mut<'a>(tables: &'a mut Tables, kind: Kind) -> &'a mut HashMap<String, ChannelEntry> {
    match kind {
      Kind::Channel => &mut tables.channels,
      Kind::Pattern => &mut tables.patterns,
      Kind::Shard => &mut tables.shard_channels,
    }
  }

  /// Register the always-on key-invalidation listener slot.
  pub fn add_invalidation_listener(&self) -> mpsc::Receiver<Delivery> {
    let (tx, rx) = mpsc::channel(self.listener_capacity);
    self.invalidation.lock().unwrap().push(tx);
    rx
  }

  /// Dispatch one inbound push token. Delivery to a full listener channel
  /// suspends the caller instead of dropping the message.
  ///
  /// Returns the wire command the caller must now send, if this push's
  /// state transition demands one.
  pub async fn on_push(&self, token: Token) -> Result<Option<(&'static str, String)>> {
    match decode_push(token)? {
      PushMessage::SubscribeAck { channel, .. } => {
        self.ack_subscribed(Kind::Channel, &channel);
        Ok(None)
      }
      PushMessage::PatternSubscribeAck { channel, .. } => {
        self.ack_subscribed(Kind::Pattern, &channel);
        Ok(None)
      }
      PushMessage::ShardSubscribeAck { channel, .. } => {
        self.ack_subscribed(Kind::Shard, &channel);
        Ok(None)
      }
      PushMessage::UnsubscribeAck { channel, kind }
      | PushMessage::PatternUnsubscribeAck { channel, kind }
      | PushMessage::ShardUnsubscribeAck { channel, kind } => {
        Ok(self.ack_unsubscribed(kind, &channel).map(|verb| (verb, channel)))
      }
      PushMessage::Message { channel, payload } => {
        self.deliver(Kind::Channel, &channel, Delivery { channel: channel.clone(), payload, pattern: None }).await;
        Ok(None)
      }
      PushMessage::PatternMessage { pattern, channel, payload } => {
        self.deliver(Kind::Pattern, &pattern.clone(), Delivery { channel, payload, pattern: Some(pattern) }).await;
        Ok(None)
      }
      PushMessage::ShardMessage { channel, payload } => {
        self.deliver(Kind::Shard, &channel, Delivery { channel: channel.clone(), payload, pattern: None }).await;
        Ok(None)
      }
      PushMessage::Invalidate { .. } => {
        let senders: Vec<_> = self.invalidation.lock().unwrap().clone();
        for tx in senders {
          let _ = tx.send(Delivery { channel: "__invalidate__".into(), payload: bytes::Bytes::new(), pattern: None }).await;
        }
        Ok(None)
      }
    }
  }

  fn ack_subscribed(&self, kind: Kind, channel: &str) {
    let mut tables = self.tables.lock().unwrap();
    let table = Self::table_mut(&mut tables, kind);
    if let Some(entry) = table.get_mut(channel) {
      let (next_state, _instruction) = entry.state.transition(Event::Added);
      entry.state = next_state;
    }
  }

  /// Returns `Some(verb)` when the unsubscribe ack's transition demands a
  /// fresh wire command: the key is now fully empty, or a listener
  /// re-subscribed while the unsubscribe was in flight and must be
  /// resubscribed for real.
  fn ack_unsubscribed(&self, kind: Kind, channel: &str) -> Option<&'static str> {
    let mut tables = self.tables.lock().unwrap();
    let table = Self::table_mut(&mut tables, kind);
    let entry = table.get_mut(channel)?;
    let (next_state, instruction) = entry.state.transition(Event::Closed);
    entry.state = next_state;
    match instruction {
      Instruction::RemoveChannel => {
        table.remove(channel);
        None
      }
      Instruction::Subscribe => Some(kind.subscribe_verb()),
      _ => None,
    }
  }

  async fn deliver(&self, kind: Kind, key: &str, delivery: Delivery) {
    // Snapshot the senders, then release the lock before awaiting a
    // potentially-blocked channel: holding a std Mutex across an await
    // point would poison every other registry operation until the slow
    // subscriber drains.
    let senders: Vec<mpsc::Sender<Delivery>> = {
      let mut tables = self.tables.lock().unwrap();
      let table = Self::table_mut(&mut tables, kind);
      match table.get_mut(key) {
        Some(entry) => {
          let (next_state, _) = entry.state.transition(Event::ReceivedMessage);
          entry.state = next_state;
          entry.listeners.iter().map(|l| l.sender.clone()).collect()
        }
        None => return,
      }
    };
    for tx in senders {
      // Blocks the connection's read loop until the listener drains.
      // Deliberate: never drop a message, in order, per listener.
      let _ = tx.send(delivery.clone()).await;
    }
  }

  /// Connection is going away: drop every table so in-flight listener
  /// senders are dropped too, which fails their receivers with a stream
  /// close the caller surfaces as `connectionClosed`.
  pub fn close(&self, _reason: ClientError) {
    let mut tables = self.tables.lock().unwrap();
    tables.channels.clear();
    tables.patterns.clear();
    tables.shard_channels.clear();
    self.invalidation.lock().unwrap().clear();
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[tokio::test]
  async fn two_overlapping_subscribes_coalesce_to_one_subscribe_command() {
    let registry = SubscriptionRegistry::new(8);
    let (cmd1, _id1, _rx1) = registry.add(Kind::Channel, "news");
    assert_eq!(cmd1, Some("SUBSCRIBE"));
    let (cmd2, _id2, _rx2) = registry.add(Kind::Channel, "news");
    assert_eq!(cmd2, None);
  }

  #[tokio::test]
  async fn last_unsubscribe_after_ack_emits_exactly_one_unsubscribe() {
    let registry = SubscriptionRegistry::new(8);
    let (_cmd, id1, _rx1) = registry.add(Kind::Channel, "news");
    let (_cmd, id2, _rx2) = registry.add(Kind::Channel, "news");
    registry.ack_subscribed(Kind::Channel, "news");

    assert_eq!(registry.remove(Kind::Channel, "news", id1), None);
    assert_eq!(registry.remove(Kind::Channel, "news", id2), Some("UNSUBSCRIBE"));
  }

  #[tokio::test]
  async fn message_push_is_forwarded_to_active_listener() {
    let registry = SubscriptionRegistry::new(8);
    let (_cmd, _id, mut rx) = registry.add(Kind::Channel, "news");
    registry.ack_subscribed(Kind::Channel, "news");

    let wire = b">3\r\n$7\r\nmessage\r\n$4\r\nnews\r\n$5\r\nhello\r\n";
    let mut buf = bytes::Bytes::copy_from_slice(wire);
    let token = crate::resp::parser::parse_one(&mut buf, 1, 100).unwrap().unwrap();
    registry.on_push(token).await.unwrap();

    let delivery = rx.recv().await.unwrap();
    assert_eq!(delivery.channel, "news");
    assert_eq!(&delivery.payload[..], b"hello");
  }
}
