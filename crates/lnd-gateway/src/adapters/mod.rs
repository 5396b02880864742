//! Transport adapters.
//!
//! - [`channel`]: bounded in-memory queues, for tests and for embedding the
//!   gateway inside a host message bus
//! - [`http`]: POSTs envelopes to the node with `reqwest`

pub mod channel;
pub mod http;

pub use channel::{inbound_channel, transport_channel, ChannelInbound, ChannelTransport};
pub use http::{http_transport, HttpTransport};
