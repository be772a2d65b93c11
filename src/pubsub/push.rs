//! Decoding inbound push tokens (RESP3 `>` arrays, and RESP2 arrays with a
//! textual leading element) into a typed [`PushMessage`].

use bytes::Bytes;

use crate::error::{ClientError, Result};
use crate::pubsub::registry::Kind;
use crate::resp::token::{Aggregate, Token};

#[derive(Debug, Clone)]
pub enum PushMessage {
  SubscribeAck { channel: String, count: i64 },
  PatternSubscribeAck { channel: String, count: i64 },
  ShardSubscribeAck { channel: String, count: i64 },
  UnsubscribeAck { channel: String, kind: Kind },
  PatternUnsubscribeAck { channel: String, kind: Kind },
  ShardUnsubscribeAck { channel: String, kind: Kind },
  Message { channel: String, payload: Bytes },
  PatternMessage { pattern: String, channel: String, payload: Bytes },
  ShardMessage { channel: String, payload: Bytes },
  Invalidate { keys: Vec<Bytes> },
}

fn elements(agg: &Aggregate) -> Result<Vec<Token>> {
  agg.iter().collect()
}

fn as_str(token: Token) -> Result<String> {
  match token {
    Token::SimpleString(b) | Token::BulkString(b) => {
      String::from_utf8(b.to_vec()).map_err(|_| ClientError::SubscriptionError("push type tag was not utf-8".into()))
    }
    other => Err(ClientError::SubscriptionError(format!("expected a string push element, found {:?}", other))),
  }
}

fn as_bytes(token: Token) -> Result<Bytes> {
  match token {
    Token::SimpleString(b) | Token::BulkString(b) => Ok(b),
    other => Err(ClientError::SubscriptionError(format!("expected a byte string push element, found {:?}", other))),
  }
}

fn as_int(token: Token) -> Result<i64> {
  match token {
    Token::Number(n) => Ok(n),
    other => Err(ClientError::SubscriptionError(format!("expected an integer push element, found {:?}", other))),
  }
}

/// Decode one inbound push (or RESP2 pub/sub array) into a typed message.
pub fn decode_push(token: Token) -> Result<PushMessage> {
  let agg = match token {
    Token::Push(agg) | Token::Array(agg) => agg,
    other => return Err(ClientError::SubscriptionError(format!("push frame was not an array, found {:?}", other))),
  };
  let mut items = elements(&agg)?.into_iter();
  let kind_tag = items.next().ok_or_else(|| ClientError::SubscriptionError("empty push frame".into()))?;
  let tag = as_str(kind_tag)?;

  let rest: Vec<Token> = items.collect();
  match tag.as_str() {
    "subscribe" | "psubscribe" | "ssubscribe" => {
      let [channel, count] = take2(rest, &tag)?;
      let channel = as_str(channel)?;
      let count = as_int(count)?;
      Ok(match tag.as_str() {
        "subscribe" => PushMessage::SubscribeAck { channel, count },
        "psubscribe" => PushMessage::PatternSubscribeAck { channel, count },
        _ => PushMessage::ShardSubscribeAck { channel, count },
      })
    }
    "unsubscribe" | "punsubscribe" | "sunsubscribe" => {
      let [channel, _count] = take2(rest, &tag)?;
      let channel = as_str(channel)?;
      Ok(match tag.as_str() {
        "unsubscribe" => PushMessage::UnsubscribeAck { channel, kind: Kind::Channel },
        "punsubscribe" => PushMessage::PatternUnsubscribeAck { channel, kind: Kind::Pattern },
        _ => PushMessage::ShardUnsubscribeAck { channel, kind: Kind::Shard },
      })
    }
    "message" => {
      let [channel, payload] = take2(rest, &tag)?;
      Ok(PushMessage::Message { channel: as_str(channel)?, payload: as_bytes(payload)? })
    }
    "smessage" => {
      let [channel, payload] = take2(rest, &tag)?;
      Ok(PushMessage::ShardMessage { channel: as_str(channel)?, payload: as_bytes(payload)? })
    }
    "pmessage" => {
      if rest.len() != 3 {
        return Err(ClientError::SubscriptionError(format!("pmessage push had {} elements, expected 3", rest.len())));
      }
      let mut it = rest.into_iter();
      let pattern = as_str(it.next().unwrap())?;
      let channel = as_str(it.next().unwrap())?;
      let payload = as_bytes(it.next().unwrap())?;
      Ok(PushMessage::PatternMessage { pattern, channel, payload })
    }
    "invalidate" => {
      if rest.len() != 1 {
        return Err(ClientError::SubscriptionError(format!("invalidate push had {} elements, expected 1", rest.len())));
      }
      let keys = match rest.into_iter().next().unwrap() {
        Token::Null => Vec::new(),
        Token::Array(agg) | Token::Set(agg) => agg.iter().map(|t| as_bytes(t?)).collect::<Result<Vec<_>>>()?,
        other => vec![as_bytes(other)?],
      };
      Ok(PushMessage::Invalidate { keys })
    }
    other => Err(ClientError::SubscriptionError(format!("unrecognized push type {:?}", other))),
  }
}

fn take2(rest: Vec<Token>, tag: &str) -> Result<[Token; 2]> {
  let len = rest.len();
  rest
    .try_into()
    .map_err(|_| ClientError::SubscriptionError(format!("{:?} push had {} elements, expected 2", tag, len)))
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::resp::parser::parse_one;

  fn parse(wire: &[u8]) -> Token {
    let mut buf = Bytes::copy_from_slice(wire);
    parse_one(&mut buf, 1, 100).unwrap().unwrap()
  }

  #[test]
  fn message_push_decodes_channel_and_payload() {
    let wire = b">3\r\n$7\r\nmessage\r\n$4\r\ntest\r\n$8\r\nTesting!\r\n";
    let msg = decode_push(parse(wire)).unwrap();
    match msg {
      PushMessage::Message { channel, payload } => {
        assert_eq!(channel, "test");
        assert_eq!(&payload[..], b"Testing!");
      }
      other => panic!("unexpected {:?}", other),
    }
  }

  #[test]
  fn pmessage_push_carries_pattern_and_matched_channel() {
    let wire = b">4\r\n$8\r\npmessage\r\n$4\r\nnew*\r\n$5\r\nnews1\r\n$3\r\nfoo\r\n";
    let msg = decode_push(parse(wire)).unwrap();
    match msg {
      PushMessage::PatternMessage { pattern, channel, payload } => {
        assert_eq!(pattern, "new*");
        assert_eq!(channel, "news1");
        assert_eq!(&payload[..], b"foo");
      }
      other => panic!("unexpected {:?}", other),
    }
  }

  #[test]
  fn message_push_with_wrong_arity_fails() {
    let wire = b">2\r\n$7\r\nmessage\r\n$4\r\ntest\r\n";
    let err = decode_push(parse(wire)).unwrap_err();
    assert!(matches!(err, ClientError::SubscriptionError(_)));
  }

  #[test]
  fn unknown_push_tag_fails() {
    let wire = b">1\r\n$7\r\nunknown\r\n";
    let err = decode_push(parse(wire)).unwrap_err();
    assert!(matches!(err, ClientError::SubscriptionError(_)));
  }
}
