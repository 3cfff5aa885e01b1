//! Device-store and Signal-crypto collaborator interfaces.
//!
//! Persistence and the double-ratchet live behind these traits; the session
//! core only coordinates them (when to rebuild a session, what to attach to
//! a retried message) without owning any key material itself.

use crate::types::jid::{Jid, SignalAddress};
use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store failure: {0}")]
    Failure(String),
}

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("untrusted identity for {0}")]
    UntrustedIdentity(SignalAddress),
    #[error("no signal session with {0}")]
    NoSession(SignalAddress),
    #[error("crypto failure: {0}")]
    Failure(String),
}

/// A public pre key, optionally signed.
#[derive(Debug, Clone)]
pub struct PreKey {
    pub key_id: u32,
    pub public_key: [u8; 32],
    pub signature: Option<Vec<u8>>,
}

/// A peer's published key set, enough to bootstrap a Signal session
/// without a round trip to that peer.
#[derive(Debug, Clone)]
pub struct PreKeyBundle {
    pub registration_id: u32,
    pub device_id: u32,
    pub identity_key: [u8; 32],
    pub pre_key: Option<(u32, [u8; 32])>,
    pub signed_pre_key_id: u32,
    pub signed_pre_key: [u8; 32],
    pub signed_pre_key_signature: Vec<u8>,
}

/// Output of encrypting one plaintext for one device.
#[derive(Debug, Clone)]
pub struct EncryptedMessage {
    /// `pkmsg` when a fresh session was bootstrapped, `msg` otherwise.
    pub enc_type: &'static str,
    pub ciphertext: Vec<u8>,
    /// Whether the recipient needs our device-identity blob alongside.
    pub include_device_identity: bool,
}

/// The persistent device store.
#[async_trait]
pub trait DeviceStore: Send + Sync {
    /// Our own JID, if this device has completed pairing.
    fn jid(&self) -> Option<Jid>;
    fn registration_id(&self) -> u32;
    fn identity_public_key(&self) -> [u8; 32];
    fn signed_prekey(&self) -> PreKey;
    /// Marshaled device-identity (account signature) blob.
    fn account_blob(&self) -> Option<Vec<u8>>;
    /// Generate (and persist) one fresh one-time pre key.
    async fn gen_one_prekey(&self) -> Result<PreKey, StoreError>;
    async fn contains_session(&self, address: &SignalAddress) -> Result<bool, StoreError>;
    /// Wipe the device store. Used by logout.
    async fn delete(&self) -> Result<(), StoreError>;
}

/// Signal protocol operations the retry engines coordinate.
#[async_trait]
pub trait SignalCrypto: Send + Sync {
    /// Build a sender-key distribution message teaching `own_address`'s
    /// sender key for `group` to whoever receives it.
    async fn create_sender_key_distribution(
        &self,
        group: &Jid,
        own_address: &SignalAddress,
    ) -> Result<Vec<u8>, CryptoError>;

    /// Install a received sender key for `(group, sender)`.
    async fn process_sender_key_distribution(
        &self,
        group: &Jid,
        sender: &SignalAddress,
        skdm: &[u8],
    ) -> Result<(), CryptoError>;

    /// Encrypt `plaintext` for `to`. When `bundle` is given, the existing
    /// session (if any) is replaced by one built from the bundle first.
    async fn encrypt_for_device(
        &self,
        plaintext: &[u8],
        to: &Jid,
        bundle: Option<&PreKeyBundle>,
    ) -> Result<EncryptedMessage, CryptoError>;

    /// Decrypt one enc payload (`enc_type` is the stanza's `type` attr:
    /// `pkmsg`, `msg` or `skmsg`).
    async fn decrypt_message(
        &self,
        ciphertext: &[u8],
        enc_type: &str,
        sender: &Jid,
        chat: &Jid,
    ) -> Result<Vec<u8>, CryptoError>;

    /// Drop the stored identity for `address` so the next decrypt trusts
    /// the new one.
    async fn delete_identity(&self, address: &SignalAddress) -> Result<(), CryptoError>;
}
