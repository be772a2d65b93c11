//! Recursive-descent RESP2/RESP3 parser.
//!
//! [`parse_one`] consumes one token from the front of a [`Bytes`] cursor,
//! or reports that more data is needed and leaves the cursor untouched.

use bytes::{Buf, Bytes};

use crate::error::{ClientError, Result};
use crate::resp::token::{Aggregate, Token};

/// Parse a single token from the front of `buf`.
///
/// - `Ok(Some(token))`: one token was consumed and removed from `buf`.
/// - `Ok(None)`: `buf` holds an incomplete token; `buf` is left untouched.
/// - `Err(_)`: `buf` held a malformed token; the connection should close.
pub fn parse_one(buf: &mut Bytes, depth: usize, max_depth: usize) -> Result<Option<Token>> {
  if depth > max_depth {
    return Err(ClientError::TooDeeplyNestedAggregatedTypes);
  }
  if buf.is_empty() {
    return Ok(None);
  }
  let sigil = buf[0];
  match sigil {
    b'+' => parse_line(buf, 1).map(|o| o.map(|(body, _)| Token::SimpleString(body))),
    b'-' => parse_line(buf, 1).map(|o| o.map(|(body, _)| Token::SimpleError(body))),
    b':' => parse_integer_line(buf).map(|o| o.map(Token::Number)),
    b',' => parse_double_line(buf),
    b'#' => parse_boolean_line(buf),
    b'(' => parse_big_number_line(buf),
    b'$' => parse_bulk(buf, BulkKind::String),
    b'!' => parse_bulk(buf, BulkKind::Error),
    b'=' => parse_bulk(buf, BulkKind::Verbatim),
    b'_' => parse_line(buf, 1).map(|o| o.map(|_| Token::Null)),
    b'*' => parse_aggregate(buf, depth, max_depth, AggKind::Array),
    b'~' => parse_aggregate(buf, depth, max_depth, AggKind::Set),
    b'>' => parse_aggregate(buf, depth, max_depth, AggKind::Push),
    b'%' => parse_aggregate(buf, depth, max_depth, AggKind::Map),
    b'|' => parse_aggregate(buf, depth, max_depth, AggKind::Attribute),
    other => Err(ClientError::InvalidLeadingByte(other)),
  }
}

fn find_crlf(data: &[u8]) -> Option<usize> {
  let mut i = 0;
  while i + 1 < data.len() {
    if data[i] == b'\r' && data[i + 1] == b'\n' {
      return Some(i);
    }
    i += 1;
  }
  None
}

/// Peek the line starting at `start` (after the sigil) without consuming
/// from `buf`. Returns the line body (excluding CRLF).
fn peek_line(buf: &Bytes, start: usize) -> Result<Option<Bytes>> {
  let tail = &buf[start..];
  match find_crlf(tail) {
    None => Ok(None),
    Some(rel) => Ok(Some(buf.slice(start..start + rel))),
  }
}

/// Parse a `<sigil><body>\r\n` line, consuming it from `buf` on success.
/// Returns the body and the total bytes consumed (including sigil + CRLF).
fn parse_line(buf: &mut Bytes, start: usize) -> Result<Option<(Bytes, usize)>> {
  let tail = &buf[start..];
  match find_crlf(tail) {
    None => Ok(None),
    Some(rel) => {
      let body = buf.slice(start..start + rel);
      let total = start + rel + 2;
      buf.advance(total);
      Ok(Some((body, total)))
    }
  }
}

fn parse_integer_line(buf: &mut Bytes) -> Result<Option<i64>> {
  match parse_line(buf, 1)? {
    None => Ok(None),
    Some((body, _)) => {
      let text = std::str::from_utf8(&body).map_err(|_| ClientError::CanNotParseInteger)?;
      text.parse::<i64>().map(Some).map_err(|_| ClientError::CanNotParseInteger)
    }
  }
}

fn parse_double_line(buf: &mut Bytes) -> Result<Option<Token>> {
  match parse_line(buf, 1)? {
    None => Ok(None),
    Some((body, _)) => {
      let text = std::str::from_utf8(&body).map_err(|_| ClientError::CanNotParseDouble)?;
      text.parse::<f64>().map(|d| Some(Token::Double(d))).map_err(|_| ClientError::CanNotParseDouble)
    }
  }
}

fn parse_boolean_line(buf: &mut Bytes) -> Result<Option<Token>> {
  match parse_line(buf, 1)? {
    None => Ok(None),
    Some((body, _)) => match &body[..] {
      b"t" => Ok(Some(Token::Boolean(true))),
      b"f" => Ok(Some(Token::Boolean(false))),
      _ => Err(ClientError::DataMalformed("boolean token must be 't' or 'f'".into())),
    },
  }
}

fn parse_big_number_line(buf: &mut Bytes) -> Result<Option<Token>> {
  match peek_line(buf, 1)? {
    None => Ok(None),
    Some(line) => {
      if !is_big_number(&line) {
        return Err(ClientError::CanNotParseBigNumber);
      }
      let (body, _) = parse_line(buf, 1)?.expect("peek_line confirmed a complete header line");
      Ok(Some(Token::BigNumber(body)))
    }
  }
}

fn is_big_number(body: &[u8]) -> bool {
  let (sign, digits) = match body.split_first() {
    Some((b'-', rest)) => (true, rest),
    _ => (false, body),
  };
  let _ = sign;
  !digits.is_empty() && digits.iter().all(|b| b.is_ascii_digit())
}

enum BulkKind {
  String,
  Error,
  Verbatim,
}

fn parse_bulk(buf: &mut Bytes, kind: BulkKind) -> Result<Option<Token>> {
  let len = match peek_line(buf, 1)? {
    None => return Ok(None),
    Some(line) => {
      let text = std::str::from_utf8(&line).map_err(|_| ClientError::DataMalformed("bulk length not utf8".into()))?;
      text.parse::<i64>().map_err(|_| ClientError::DataMalformed("bulk length not an integer".into()))?
    }
  };
  if len == -1 {
    let (_, _) = parse_line(buf, 1)?.expect("peek_line confirmed a complete header line");
    return Ok(Some(Token::Null));
  }
  if len < -1 {
    return Err(ClientError::DataMalformed(format!("negative bulk length {}", len)));
  }
  let len = len as usize;
  let header_len = match find_crlf(&buf[1..]) {
    None => return Ok(None),
    Some(rel) => 1 + rel + 2,
  };
  let total = header_len + len + 2;
  if buf.len() < total {
    return Ok(None);
  }
  if &buf[header_len + len..header_len + len + 2] != b"\r\n" {
    return Err(ClientError::DataMalformed("bulk payload missing trailing CRLF".into()));
  }
  let content = buf.slice(header_len..header_len + len);
  buf.advance(total);
  match kind {
    BulkKind::String => Ok(Some(Token::BulkString(content))),
    BulkKind::Error => Ok(Some(Token::BulkError(content))),
    BulkKind::Verbatim => {
      if content.len() < 4 || content[3] != b':' {
        return Err(ClientError::DataMalformed("verbatim string missing type tag".into()));
      }
      let mut format = [0u8; 3];
      format.copy_from_slice(&content[0..3]);
      Ok(Some(Token::VerbatimString { format, content: content.slice(4..) }))
    }
  }
}

enum AggKind {
  Array,
  Set,
  Push,
  Map,
  Attribute,
}

fn parse_aggregate(buf: &mut Bytes, depth: usize, max_depth: usize, kind: AggKind) -> Result<Option<Token>> {
  let count = match peek_line(buf, 1)? {
    None => return Ok(None),
    Some(line) => {
      let text = std::str::from_utf8(&line).map_err(|_| ClientError::DataMalformed("aggregate count not utf8".into()))?;
      text.parse::<i64>().map_err(|_| ClientError::DataMalformed("aggregate count not an integer".into()))?
    }
  };
  let header_len = match find_crlf(&buf[1..]) {
    None => return Ok(None),
    Some(rel) => 1 + rel + 2,
  };
  if count == -1 {
    if buf.len() < header_len {
      return Ok(None);
    }
    buf.advance(header_len);
    return Ok(Some(Token::Null));
  }
  if count < -1 {
    return Err(ClientError::DataMalformed(format!("negative aggregate count {}", count)));
  }
  let logical_count = count as usize;
  let element_count = match kind {
    AggKind::Map | AggKind::Attribute => logical_count.checked_mul(2).ok_or(ClientError::DataMalformed("aggregate count overflow".into()))?,
    _ => logical_count,
  };

  if buf.len() < header_len {
    return Ok(None);
  }
  let mut cursor = buf.slice(header_len..);
  let start_len = cursor.len();
  for _ in 0..element_count {
    match parse_one(&mut cursor, depth + 1, max_depth)? {
      Some(_) => {}
      None => return Ok(None),
    }
  }
  let children_len = start_len - cursor.len();
  let children = buf.slice(header_len..header_len + children_len);
  let total = header_len + children_len;
  buf.advance(total);

  let agg = Aggregate::new(children, logical_count, element_count, depth, max_depth);
  Ok(Some(match kind {
    AggKind::Array => Token::Array(agg),
    AggKind::Set => Token::Set(agg),
    AggKind::Push => Token::Push(agg),
    AggKind::Map => Token::Map(agg),
    AggKind::Attribute => Token::Attribute(agg),
  }))
}

#[cfg(test)]
mod tests {
  use super::*;

  fn parse_wire(wire: &[u8]) -> Result<Token> {
    let mut buf = Bytes::copy_from_slice(wire);
    let token = parse_one(&mut buf, 1, 100)?.expect("complete token");
    assert!(buf.is_empty(), "parser left unconsumed bytes");
    Ok(token)
  }

  /// Re-serialize a token to its canonical wire bytes, for round-trip
  /// comparison against the input that produced it.
  fn encode_token(token: &Token) -> Vec<u8> {
    match token {
      Token::Null => b"_\r\n".to_vec(),
      Token::SimpleString(b) => line(b'+', b),
      Token::SimpleError(b) => line(b'-', b),
      Token::BulkString(b) => bulk(b'$', b),
      Token::BulkError(b) => bulk(b'!', b),
      Token::VerbatimString { format, content } => {
        let mut payload = format.to_vec();
        payload.push(b':');
        payload.extend_from_slice(content);
        bulk(b'=', &payload)
      }
      Token::Number(n) => line(b':', n.to_string().as_bytes()),
      Token::Double(d) => line(b',', format_double(*d).as_bytes()),
      Token::Boolean(b) => line(b'#', if *b { b"t" } else { b"f" }),
      Token::BigNumber(b) => line(b'(', b),
      Token::Array(agg) => aggregate(b'*', agg),
      Token::Set(agg) => aggregate(b'~', agg),
      Token::Push(agg) => aggregate(b'>', agg),
      Token::Map(agg) => aggregate(b'%', agg),
      Token::Attribute(agg) => aggregate(b'|', agg),
    }
  }

  fn format_double(d: f64) -> String {
    if d.is_infinite() {
      if d > 0.0 { "inf".to_string() } else { "-inf".to_string() }
    } else {
      d.to_string()
    }
  }

  fn line(sigil: u8, body: &[u8]) -> Vec<u8> {
    let mut out = vec![sigil];
    out.extend_from_slice(body);
    out.extend_from_slice(b"\r\n");
    out
  }

  fn bulk(sigil: u8, body: &[u8]) -> Vec<u8> {
    let mut out = vec![sigil];
    out.extend_from_slice(body.len().to_string().as_bytes());
    out.extend_from_slice(b"\r\n");
    out.extend_from_slice(body);
    out.extend_from_slice(b"\r\n");
    out
  }

  fn aggregate(sigil: u8, agg: &Aggregate) -> Vec<u8> {
    let mut out = vec![sigil];
    out.extend_from_slice(agg.len().to_string().as_bytes());
    out.extend_from_slice(b"\r\n");
    for child in agg.iter() {
      out.extend_from_slice(&encode_token(&child.expect("well-formed child")));
    }
    out
  }

  #[test]
  fn round_trip_every_token_kind() {
    let wires: &[&[u8]] = &[
      b"+OK\r\n",
      b"-ERR bad\r\n",
      b"$3\r\nfoo\r\n",
      b"!5\r\noops!\r\n",
      b"=11\r\ntxt:hello!\r\n",
      b":42\r\n",
      b":-7\r\n",
      b",3.14\r\n",
      b",inf\r\n",
      b",-inf\r\n",
      b"#t\r\n",
      b"#f\r\n",
      b"(12345678901234567890\r\n",
      b"_\r\n",
      b"*2\r\n:1\r\n:2\r\n",
      b"~2\r\n:1\r\n:2\r\n",
      b">2\r\n+subscribe\r\n:1\r\n",
      b"%1\r\n$3\r\nfoo\r\n:1\r\n",
      b"|1\r\n$3\r\nfoo\r\n:1\r\n",
      b"*0\r\n",
    ];
    for wire in wires {
      let token = parse_wire(wire).unwrap();
      assert_eq!(&encode_token(&token)[..], *wire, "round-trip mismatch for {:?}", wire);
    }
  }

  #[test]
  fn nesting_to_exactly_100_succeeds() {
    let wire = nested_empty_arrays(100);
    let mut buf = Bytes::from(wire);
    let token = parse_one(&mut buf, 1, 100).unwrap().unwrap();
    assert!(matches!(token, Token::Array(_)));
  }

  #[test]
  fn nesting_past_100_fails_with_too_deeply_nested() {
    let wire = nested_empty_arrays(101);
    let mut buf = Bytes::from(wire);
    let err = parse_one(&mut buf, 1, 100).unwrap_err();
    assert!(matches!(err, ClientError::TooDeeplyNestedAggregatedTypes));
  }

  /// `*1\r\n` repeated `n - 1` times, wrapping a single terminal `*0\r\n`:
  /// `n` levels of array nesting in all.
  fn nested_empty_arrays(n: usize) -> Vec<u8> {
    let mut wire = b"*1\r\n".repeat(n - 1);
    wire.extend_from_slice(b"*0\r\n");
    wire
  }

  #[test]
  fn incremental_feeding_matches_feeding_the_whole_buffer_at_once() {
    let whole = b"*3\r\n$3\r\nfoo\r\n:42\r\n>2\r\n+subscribe\r\n:1\r\n".to_vec();
    let whole_token = parse_wire(&whole).unwrap();
    let expected = encode_token(&whole_token);

    for split in 0..=whole.len() {
      let mut buf = Bytes::copy_from_slice(&whole[..split]);
      let first_attempt = parse_one(&mut buf, 1, 100).unwrap();
      if split < whole.len() {
        assert!(first_attempt.is_none(), "parsed a token from a truncated buffer at split {split}");
        assert_eq!(&buf[..], &whole[..split], "incomplete parse must not consume bytes at split {split}");
      }

      let mut rest = bytes::BytesMut::with_capacity(whole.len());
      rest.extend_from_slice(&buf);
      rest.extend_from_slice(&whole[split..]);
      let mut fed = rest.freeze();

      let token = parse_one(&mut fed, 1, 100).unwrap().expect("complete token once the rest arrives");
      assert!(fed.is_empty(), "leftover bytes after parsing at split {split}");
      assert_eq!(encode_token(&token), expected, "token mismatch at split {split}");
    }
  }
}
