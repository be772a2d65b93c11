//! Typed decoding from a [`Token`] tree.
//!
//! `FromToken` is the polymorphic "decode from Token" contract: primitives,
//! optionals, ordered sequences, sets, key-value maps, closed integer
//! ranges, and fixed-arity tuples each get an implementation here rather
//! than bespoke per-command parsing.

use std::collections::HashSet;
use std::hash::Hash;

use bytes::Bytes;

use crate::error::{ClientError, Result};
use crate::resp::token::Token;

pub trait FromToken: Sized {
  fn from_token(token: Token) -> Result<Self>;
}

fn decode_err(what: &str) -> ClientError {
  ClientError::DecodeError(what.to_string())
}

impl FromToken for Token {
  fn from_token(token: Token) -> Result<Self> {
    Ok(token)
  }
}

impl FromToken for i64 {
  fn from_token(token: Token) -> Result<Self> {
    match token {
      Token::Number(n) => Ok(n),
      Token::BigNumber(b) => std::str::from_utf8(&b)
        .ok()
        .and_then(|s| s.parse::<i64>().ok())
        .ok_or_else(|| decode_err("big number out of i64 range")),
      Token::SimpleError(_) | Token::BulkError(_) => Err(command_error(&token)),
      other => Err(decode_err(&format!("expected integer, found {:?}", other))),
    }
  }
}

impl FromToken for u64 {
  fn from_token(token: Token) -> Result<Self> {
    let n = i64::from_token(token)?;
    u64::try_from(n).map_err(|_| decode_err("negative integer where u64 expected"))
  }
}

impl FromToken for f64 {
  fn from_token(token: Token) -> Result<Self> {
    match token {
      Token::Double(d) => Ok(d),
      Token::Number(n) => Ok(n as f64),
      other => Err(decode_err(&format!("expected double, found {:?}", other))),
    }
  }
}

impl FromToken for bool {
  fn from_token(token: Token) -> Result<Self> {
    match token {
      Token::Boolean(b) => Ok(b),
      Token::Number(n) => Ok(n != 0),
      other => Err(decode_err(&format!("expected boolean, found {:?}", other))),
    }
  }
}

impl FromToken for Bytes {
  fn from_token(token: Token) -> Result<Self> {
    match token {
      Token::BulkString(b) | Token::SimpleString(b) => Ok(b),
      Token::VerbatimString { content, .. } => Ok(content),
      other => Err(decode_err(&format!("expected byte string, found {:?}", other))),
    }
  }
}

impl FromToken for String {
  fn from_token(token: Token) -> Result<Self> {
    let bytes = Bytes::from_token(token)?;
    String::from_utf8(bytes.to_vec()).map_err(|_| decode_err("byte string was not valid utf-8"))
  }
}

impl FromToken for () {
  fn from_token(token: Token) -> Result<Self> {
    match token {
      Token::SimpleString(_) | Token::Null => Ok(()),
      other => Err(decode_err(&format!("expected unit reply, found {:?}", other))),
    }
  }
}

impl<T: FromToken> FromToken for Option<T> {
  fn from_token(token: Token) -> Result<Self> {
    if token.is_null() {
      Ok(None)
    } else {
      Ok(Some(T::from_token(token)?))
    }
  }
}

impl<T: FromToken> FromToken for Vec<T> {
  fn from_token(token: Token) -> Result<Self> {
    match token {
      Token::Null => Ok(Vec::new()),
      Token::Array(agg) | Token::Set(agg) | Token::Push(agg) => {
        agg.iter().map(|t| T::from_token(t?)).collect()
      }
      // A scalar reply where a sequence was expected is treated as a
      // single-element sequence (e.g. commands that return one value in
      // the common case and an array in a pipelined/batched one).
      other => Ok(vec![T::from_token(other)?]),
    }
  }
}

impl<T: FromToken + Eq + Hash> FromToken for HashSet<T> {
  fn from_token(token: Token) -> Result<Self> {
    match token {
      Token::Null => Ok(HashSet::new()),
      Token::Set(agg) | Token::Array(agg) => agg.iter().map(|t| T::from_token(t?)).collect(),
      other => Err(decode_err(&format!("expected set, found {:?}", other))),
    }
  }
}

/// Decode a map/attribute (or an array interpreted as alternating
/// key/value pairs) into an ordered sequence of pairs.
pub fn decode_pairs<K: FromToken, V: FromToken>(token: Token) -> Result<Vec<(K, V)>> {
  match token {
    Token::Map(agg) | Token::Attribute(agg) => {
      let mut out = Vec::with_capacity(agg.len());
      let mut it = agg.iter();
      while let (Some(k), Some(v)) = (it.next(), it.next()) {
        out.push((K::from_token(k?)?, V::from_token(v?)?));
      }
      Ok(out)
    }
    Token::Array(agg) => {
      if agg.len() % 2 != 0 {
        return Err(decode_err("array interpreted as pairs had odd length"));
      }
      let mut out = Vec::with_capacity(agg.len() / 2);
      let mut it = agg.iter();
      while let (Some(k), Some(v)) = (it.next(), it.next()) {
        out.push((K::from_token(k?)?, V::from_token(v?)?));
      }
      Ok(out)
    }
    other => Err(decode_err(&format!("expected map, found {:?}", other))),
  }
}

/// Decode a 2-element integer array as a closed range `[start, end]`.
pub fn decode_int_range(token: Token) -> Result<(i64, i64)> {
  match token {
    Token::Array(agg) if agg.len() == 2 => {
      let mut it = agg.iter();
      let a = i64::from_token(it.next().unwrap()?)?;
      let b = i64::from_token(it.next().unwrap()?)?;
      Ok((a, b))
    }
    other => Err(decode_err(&format!("expected a 2-element integer range, found {:?}", other))),
  }
}

fn command_error(token: &Token) -> ClientError {
  ClientError::CommandError(token.error_message().unwrap_or_default())
}

macro_rules! impl_tuple {
  ($len:expr; $($name:ident),+) => {
    impl<$($name: FromToken),+> FromToken for ($($name,)+) {
      #[allow(non_snake_case)]
      fn from_token(token: Token) -> Result<Self> {
        match token {
          Token::Array(agg) | Token::Set(agg) | Token::Push(agg) => {
            if agg.len() != $len {
              return Err(decode_err(&format!("expected a {}-tuple, found {} elements", $len, agg.len())));
            }
            let mut it = agg.iter();
            $(let $name = $name::from_token(it.next().unwrap()?)?;)+
            Ok(($($name,)+))
          }
          other => Err(decode_err(&format!("expected a {}-tuple, found {:?}", $len, other))),
        }
      }
    }
  };
}

impl_tuple!(2; A, B);
impl_tuple!(3; A, B, C);
impl_tuple!(4; A, B, C, D);
