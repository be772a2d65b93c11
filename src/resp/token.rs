//! The RESP value model: a zero-copy view over a shared [`Bytes`] buffer.
//!
//! Aggregate variants (`Array`, `Set`, `Push`, `Map`, `Attribute`) do not
//! materialize their children eagerly. They record only the byte range that
//! covers the children and a count; [`Aggregate::iter`] re-parses children
//! lazily on demand, matching the source buffer's lifetime rather than
//! copying out of it.

use bytes::Bytes;
use std::fmt;

use crate::error::{ClientError, Result};
use crate::resp::parser;

/// A single decoded RESP value.
#[derive(Clone)]
pub enum Token {
  Null,
  SimpleString(Bytes),
  SimpleError(Bytes),
  BulkString(Bytes),
  BulkError(Bytes),
  VerbatimString { format: [u8; 3], content: Bytes },
  Number(i64),
  Double(f64),
  Boolean(bool),
  BigNumber(Bytes),
  Array(Aggregate),
  Set(Aggregate),
  Push(Aggregate),
  Map(Aggregate),
  Attribute(Aggregate),
}

impl Token {
  /// True for the RESP2/RESP3 spellings of a null value.
  pub fn is_null(&self) -> bool {
    matches!(self, Token::Null)
  }

  /// True for `simpleError`/`bulkError` tokens, i.e. a server-side command
  /// failure rather than a protocol-level problem.
  pub fn is_error(&self) -> bool {
    matches!(self, Token::SimpleError(_) | Token::BulkError(_))
  }

  /// True for the three push-eligible aggregate kinds the connection
  /// pipeline must route to the subscription manager instead of completing
  /// a pending command.
  pub fn is_push(&self) -> bool {
    matches!(self, Token::Push(_))
  }

  /// The bytes backing a simple/bulk error, for surfacing as
  /// [`ClientError::CommandError`].
  pub fn error_message(&self) -> Option<String> {
    match self {
      Token::SimpleError(b) | Token::BulkError(b) => {
        Some(String::from_utf8_lossy(b).into_owned())
      }
      _ => None,
    }
  }
}

impl fmt::Debug for Token {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Token::Null => write!(f, "Null"),
      Token::SimpleString(b) => f.debug_tuple("SimpleString").field(&lossy(b)).finish(),
      Token::SimpleError(b) => f.debug_tuple("SimpleError").field(&lossy(b)).finish(),
      // Payloads can carry user data; redact contents, keep the shape visible.
      Token::BulkString(b) => f.debug_tuple("BulkString").field(&redacted(b)).finish(),
      Token::BulkError(b) => f.debug_tuple("BulkError").field(&redacted(b)).finish(),
      Token::VerbatimString { format, .. } => f
        .debug_struct("VerbatimString")
        .field("format", &lossy(format))
        .field("content", &"***")
        .finish(),
      Token::Number(n) => f.debug_tuple("Number").field(n).finish(),
      Token::Double(d) => f.debug_tuple("Double").field(d).finish(),
      Token::Boolean(b) => f.debug_tuple("Boolean").field(b).finish(),
      Token::BigNumber(_) => write!(f, "BigNumber(***)"),
      Token::Array(a) => f.debug_tuple("Array").field(&a.count).finish(),
      Token::Set(a) => f.debug_tuple("Set").field(&a.count).finish(),
      Token::Push(a) => f.debug_tuple("Push").field(&a.count).finish(),
      Token::Map(a) => f.debug_tuple("Map").field(&a.count).finish(),
      Token::Attribute(a) => f.debug_tuple("Attribute").field(&a.count).finish(),
    }
  }
}

fn lossy(b: &[u8]) -> String {
  String::from_utf8_lossy(b).into_owned()
}

fn redacted(b: &[u8]) -> String {
  format!("***({} bytes)", b.len())
}

/// An aggregate RESP value: the byte range spanning exactly `count` encoded
/// children (or `2 * count` for maps/attributes), plus the parse depth and
/// depth budget needed to re-parse them on demand.
#[derive(Clone)]
pub struct Aggregate {
  children: Bytes,
  count: usize,
  token_count: usize,
  depth: usize,
  max_depth: usize,
}

impl Aggregate {
  /// `count` is the logical element count (key-value pairs for
  /// maps/attributes, raw element count otherwise); `token_count` is the
  /// number of RESP values actually laid out in `children` (`2 * count`
  /// for maps/attributes).
  pub(crate) fn new(
    children: Bytes,
    count: usize,
    token_count: usize,
    depth: usize,
    max_depth: usize,
  ) -> Self {
    Self { children, count, token_count, depth, max_depth }
  }

  /// Number of logical elements (for maps/attributes, the number of
  /// key-value pairs, not the doubled token count on the wire).
  pub fn len(&self) -> usize {
    self.count
  }

  pub fn is_empty(&self) -> bool {
    self.count == 0
  }

  /// Re-parse and yield each child token in order. For maps/attributes
  /// this yields keys and values as a flat, alternating sequence.
  pub fn iter(&self) -> AggregateIter<'_> {
    AggregateIter { agg: self, remaining: self.children.clone(), left: self.token_count }
  }
}

pub struct AggregateIter<'a> {
  agg: &'a Aggregate,
  remaining: Bytes,
  left: usize,
}

impl<'a> Iterator for AggregateIter<'a> {
  type Item = Result<Token>;

  fn next(&mut self) -> Option<Self::Item> {
    if self.left == 0 {
      return None;
    }
    match parser::parse_one(&mut self.remaining, self.agg.depth + 1, self.agg.max_depth) {
      Ok(Some(token)) => {
        self.left -= 1;
        Some(Ok(token))
      }
      Ok(None) => {
        // Truncated view: the slice recorded for this aggregate should
        // always hold exactly its children; reaching here means the
        // original parse mis-sized the range, which is a bug, not a user
        // error we can recover from by asking for more bytes.
        Some(Err(ClientError::DataMalformed(
          "aggregate child view truncated".into(),
        )))
      }
      Err(e) => Some(Err(e)),
    }
  }
}

impl fmt::Debug for Aggregate {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Aggregate").field("count", &self.count).finish()
  }
}
