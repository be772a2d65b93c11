//! The pub/sub subscription manager: a pure per-key state machine
//! ([`state`]), push-frame decoding ([`push`]), and the registry that ties
//! both to live listener streams ([`registry`]).

pub mod push;
pub mod registry;
pub mod state;

pub use push::PushMessage;
pub use registry::{Delivery, Kind, ListenerId, SubscriptionRegistry};
pub use state::{ChannelState, Event, Instruction};
