//! The RESP2/RESP3 wire codec: token model, parser, command encoder, and
//! typed response decoder.

pub mod decode;
pub mod encoder;
pub mod parser;
pub mod token;

pub use decode::FromToken;
pub use encoder::CommandEncoder;
pub use token::{Aggregate, Token};
