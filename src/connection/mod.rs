//! The single-connection request/response pipeline: an in-flight command
//! frame ([`frame`]), the pure pending-queue dispatch logic ([`pending`]),
//! and the async actor that drives both over a real transport
//! ([`pipeline`]).

pub mod frame;
pub mod pending;
pub mod pipeline;

pub use frame::{CommandFrame, FrameKind};
pub use pending::{Outcome, PipelineState};
pub use pipeline::{connect, ConnectionHandle, PendingCall, Subscription};
