use crate::binary::error::BinaryError;
use crate::request::IqError;
use crate::store::{CryptoError, StoreError};
use crate::transport::TransportError;
use crate::types::jid::MessageId;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("client is not connected")]
    NotConnected,
    #[error("client is not logged in")]
    NotLoggedIn,
    #[error("client is already connected")]
    AlreadyConnected,
    #[error("<{tag}> not found in {context}")]
    ElementMissing {
        tag: &'static str,
        context: &'static str,
    },
    #[error(transparent)]
    Decode(#[from] BinaryError),
    #[error(transparent)]
    Crypto(#[from] CryptoError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Iq(#[from] IqError),
    #[error("message {0} not found in recent message cache")]
    MessageNotInCache(MessageId),
    #[error("timed out waiting for {0}")]
    Timeout(&'static str),
    /// Removing an event handler from inside a handler would deadlock
    /// against the dispatch read lock. Spawn a task instead.
    #[error("event handlers cannot be removed from inside an event handler")]
    ReentrantUnsubscribe,
}
