//! RESP2-shaped command encoding: commands go out as an array of bulk
//! strings, even over a RESP3 session.

use bytes::{BufMut, BytesMut};

/// Accumulates one command's wire bytes.
///
/// ```
/// use valkey_client_core::resp::encoder::CommandEncoder;
/// let mut enc = CommandEncoder::new();
/// enc.arg(b"GET");
/// enc.arg(b"foo");
/// assert_eq!(&enc.finish()[..], b"*2\r\n$3\r\nGET\r\n$3\r\nfoo\r\n");
/// ```
#[derive(Debug, Default)]
pub struct CommandEncoder {
  args: Vec<BytesMut>,
}

impl CommandEncoder {
  pub fn new() -> Self {
    Self { args: Vec::new() }
  }

  pub fn with_capacity(n: usize) -> Self {
    Self { args: Vec::with_capacity(n) }
  }

  /// Append a raw bulk-string argument.
  pub fn arg(&mut self, bytes: &[u8]) -> &mut Self {
    let mut b = BytesMut::with_capacity(bytes.len());
    b.put_slice(bytes);
    self.args.push(b);
    self
  }

  pub fn arg_str(&mut self, s: &str) -> &mut Self {
    self.arg(s.as_bytes())
  }

  pub fn arg_int(&mut self, n: i64) -> &mut Self {
    self.arg_str(&n.to_string())
  }

  pub fn arg_double(&mut self, d: f64) -> &mut Self {
    self.arg_str(&d.to_string())
  }

  pub fn arg_bool(&mut self, b: bool) -> &mut Self {
    self.arg(if b { b"1" } else { b"0" })
  }

  /// Emit a literal keyword token, e.g. `LIMIT`.
  pub fn pure_token(&mut self, token: &str) -> &mut Self {
    self.arg_str(token)
  }

  /// Emit `token value` if `value` is present, or nothing at all otherwise.
  pub fn token_with_optional_value(&mut self, token: &str, value: Option<&[u8]>) -> &mut Self {
    if let Some(v) = value {
      self.arg_str(token);
      self.arg(v);
    }
    self
  }

  /// Emit `count` followed by `count` further arguments, as commands like
  /// `LMPOP numkeys key [key ...]` require.
  pub fn array_with_count(&mut self, items: &[&[u8]]) -> &mut Self {
    self.arg_int(items.len() as i64);
    for item in items {
      self.arg(item);
    }
    self
  }

  /// Render the accumulated arguments as a RESP2 array of bulk strings.
  pub fn finish(&self) -> BytesMut {
    let mut out = BytesMut::new();
    out.put_slice(format!("*{}\r\n", self.args.len()).as_bytes());
    for a in &self.args {
      out.put_slice(format!("${}\r\n", a.len()).as_bytes());
      out.put_slice(a);
      out.put_slice(b"\r\n");
    }
    out
  }
}
