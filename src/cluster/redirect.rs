//! Parsing `MOVED`/`ASK` error tokens into a structured redirect.

use crate::cluster::node::NodeEndpoint;
use crate::cluster::slot::Slot;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Redirect {
  Moved { slot: Slot, endpoint: NodeEndpoint },
  Ask { slot: Slot, endpoint: NodeEndpoint },
}

/// Parse a server error message of the shape `MOVED <slot> <host:port>` or
/// `ASK <slot> <host:port>`. Any other error message is not a redirect.
pub fn parse_redirect(message: &str) -> Option<Redirect> {
  let mut parts = message.split_whitespace();
  let verb = parts.next()?;
  let slot: Slot = parts.next()?.parse().ok()?;
  let addr = parts.next()?;
  let (host, port) = addr.rsplit_once(':')?;
  let endpoint = NodeEndpoint::new(host, port.parse().ok()?);
  match verb {
    "MOVED" => Some(Redirect::Moved { slot, endpoint }),
    "ASK" => Some(Redirect::Ask { slot, endpoint }),
    _ => None,
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn parses_moved() {
    let r = parse_redirect("MOVED 3999 127.0.0.1:6381").unwrap();
    assert_eq!(r, Redirect::Moved { slot: 3999, endpoint: NodeEndpoint::new("127.0.0.1", 6381) });
  }

  #[test]
  fn parses_ask() {
    let r = parse_redirect("ASK 3999 127.0.0.1:6381").unwrap();
    assert_eq!(r, Redirect::Ask { slot: 3999, endpoint: NodeEndpoint::new("127.0.0.1", 6381) });
  }

  #[test]
  fn non_redirect_errors_parse_to_none() {
    assert_eq!(parse_redirect("WRONGTYPE Operation against a key"), None);
  }
}
