//! Session dispatch core for the WhatsApp multi-device protocol.
//!
//! The [`client::Client`] owns one authenticated session to the web relay:
//! it demultiplexes the inbound stanza stream, correlates requests with
//! responses, fans events out to subscribers and implements the
//! Signal-based retry protocol for message delivery. The binary codec,
//! Noise transport, key store and Signal ratchet are collaborators behind
//! the traits in [`binary`], [`transport`] and [`store`].

pub mod binary;
pub mod call;
pub mod client;
pub mod config;
pub mod error;
pub mod handlers;
pub mod keepalive;
pub mod prekeys;
pub mod proto;
pub mod request;
pub mod retry;
pub mod store;
pub mod transport;
pub mod types;

#[cfg(test)]
pub(crate) mod test_utils;

pub use client::{Client, EventHandler};
pub use config::ClientConfig;
pub use error::ClientError;
pub use retry::build_unavailable_message_request;
pub use types::events::Event;
pub use types::jid::{Jid, MessageId};
