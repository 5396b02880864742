//! Ports the gateway depends on. Adapters live in [`crate::adapters`].

pub mod outbound;

pub use outbound::{
    Action, Envelope, InboundMessage, InboundSource, ManualTimeSource, ReplyRoute,
    SystemTimeSource, TimeSource, Transport, TransportError,
};
