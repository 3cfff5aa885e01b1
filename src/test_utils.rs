//! Shared mock collaborators for unit tests.

use crate::binary::node::{Node, NodeValue};
use crate::binary::{BinaryError, NodeBuilder, StanzaCodec};
use crate::client::Client;
use crate::config::ClientConfig;
use crate::proto;
use crate::store::{
    CryptoError, DeviceStore, EncryptedMessage, PreKey, PreKeyBundle, SignalCrypto, StoreError,
};
use crate::transport::{FrameSocket, SocketEvent, SocketFactory, TransportError};
use crate::types::jid::{Jid, SignalAddress};
use crate::types::message::{MessageInfo, MessageSource, Receipt, ReceiptType};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use prost::Message as _;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

pub(crate) struct MockStore {
    pub jid: Option<Jid>,
    pub registration_id: u32,
    pub contains_session: AtomicBool,
    prekey_counter: AtomicU32,
}

impl MockStore {
    pub fn new() -> Self {
        Self {
            jid: Some("5511999990000:2@s.whatsapp.net".parse().unwrap()),
            registration_id: 0x01020304,
            contains_session: AtomicBool::new(true),
            prekey_counter: AtomicU32::new(100),
        }
    }
}

#[async_trait]
impl DeviceStore for MockStore {
    fn jid(&self) -> Option<Jid> {
        self.jid.clone()
    }

    fn registration_id(&self) -> u32 {
        self.registration_id
    }

    fn identity_public_key(&self) -> [u8; 32] {
        [7u8; 32]
    }

    fn signed_prekey(&self) -> PreKey {
        PreKey {
            key_id: 1,
            public_key: [8u8; 32],
            signature: Some(vec![9u8; 64]),
        }
    }

    fn account_blob(&self) -> Option<Vec<u8>> {
        Some(vec![0xAA, 0xBB, 0xCC])
    }

    async fn gen_one_prekey(&self) -> Result<PreKey, StoreError> {
        let id = self.prekey_counter.fetch_add(1, Ordering::SeqCst);
        Ok(PreKey {
            key_id: id,
            public_key: [4u8; 32],
            signature: None,
        })
    }

    async fn contains_session(&self, _address: &SignalAddress) -> Result<bool, StoreError> {
        Ok(self.contains_session.load(Ordering::SeqCst))
    }

    async fn delete(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

pub(crate) struct MockCrypto {
    /// How many decrypt calls fail before the rest succeed.
    pub decrypt_failures: AtomicU32,
    pub untrusted_failures: AtomicU32,
    pub skdm_requests: Mutex<Vec<(Jid, SignalAddress)>>,
    pub encrypt_calls: Mutex<Vec<(Jid, bool)>>,
    pub deleted_identities: Mutex<Vec<SignalAddress>>,
    pub plaintext: Mutex<Vec<u8>>,
}

impl MockCrypto {
    pub fn new() -> Self {
        Self {
            decrypt_failures: AtomicU32::new(0),
            untrusted_failures: AtomicU32::new(0),
            skdm_requests: Mutex::new(Vec::new()),
            encrypt_calls: Mutex::new(Vec::new()),
            deleted_identities: Mutex::new(Vec::new()),
            plaintext: Mutex::new(
                proto::Message {
                    conversation: Some("decrypted".into()),
                    ..Default::default()
                }
                .encode_to_vec(),
            ),
        }
    }
}

#[async_trait]
impl SignalCrypto for MockCrypto {
    async fn create_sender_key_distribution(
        &self,
        group: &Jid,
        own_address: &SignalAddress,
    ) -> Result<Vec<u8>, CryptoError> {
        self.skdm_requests
            .lock()
            .unwrap()
            .push((group.clone(), own_address.clone()));
        Ok(vec![0xD5; 8])
    }

    async fn process_sender_key_distribution(
        &self,
        _group: &Jid,
        _sender: &SignalAddress,
        _skdm: &[u8],
    ) -> Result<(), CryptoError> {
        Ok(())
    }

    async fn encrypt_for_device(
        &self,
        _plaintext: &[u8],
        to: &Jid,
        bundle: Option<&PreKeyBundle>,
    ) -> Result<EncryptedMessage, CryptoError> {
        let with_bundle = bundle.is_some();
        self.encrypt_calls
            .lock()
            .unwrap()
            .push((to.clone(), with_bundle));
        Ok(EncryptedMessage {
            enc_type: if with_bundle { "pkmsg" } else { "msg" },
            ciphertext: vec![0xEE; 16],
            include_device_identity: with_bundle,
        })
    }

    async fn decrypt_message(
        &self,
        _ciphertext: &[u8],
        _enc_type: &str,
        sender: &Jid,
        _chat: &Jid,
    ) -> Result<Vec<u8>, CryptoError> {
        if self.untrusted_failures.load(Ordering::SeqCst) > 0 {
            self.untrusted_failures.fetch_sub(1, Ordering::SeqCst);
            return Err(CryptoError::UntrustedIdentity(sender.signal_address()));
        }
        if self.decrypt_failures.load(Ordering::SeqCst) > 0 {
            self.decrypt_failures.fetch_sub(1, Ordering::SeqCst);
            return Err(CryptoError::NoSession(sender.signal_address()));
        }
        Ok(self.plaintext.lock().unwrap().clone())
    }

    async fn delete_identity(&self, address: &SignalAddress) -> Result<(), CryptoError> {
        self.deleted_identities.lock().unwrap().push(address.clone());
        Ok(())
    }
}

/// Codec whose "wire format" is a queue: marshal records the node, and each
/// injected frame pops the next queued inbound node.
pub(crate) struct MockCodec {
    pub sent: Mutex<Vec<Node>>,
    pub inbound: Mutex<VecDeque<Node>>,
}

impl MockCodec {
    pub fn new() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            inbound: Mutex::new(VecDeque::new()),
        }
    }
}

impl StanzaCodec for MockCodec {
    fn marshal(&self, node: &Node) -> Result<Vec<u8>, BinaryError> {
        self.sent.lock().unwrap().push(node.clone());
        Ok(vec![0x01])
    }

    fn unmarshal(&self, _data: &[u8]) -> Result<Node, BinaryError> {
        self.inbound
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| BinaryError::Decode("no queued inbound node".into()))
    }

    fn unpack(&self, frame: &[u8]) -> Result<Vec<u8>, BinaryError> {
        Ok(frame.to_vec())
    }
}

pub(crate) struct MockSocket {
    pub connected: AtomicBool,
    pub cancel: CancellationToken,
}

#[async_trait]
impl FrameSocket for MockSocket {
    async fn send_frame(&self, _payload: &[u8]) -> Result<(), TransportError> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(TransportError::Closed);
        }
        Ok(())
    }

    async fn stop(&self, _force: bool) {
        self.connected.store(false, Ordering::SeqCst);
        self.cancel.cancel();
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn cancellation(&self) -> CancellationToken {
        self.cancel.clone()
    }
}

pub(crate) struct MockSocketFactory {
    pub event_txs: Mutex<Vec<mpsc::Sender<SocketEvent>>>,
}

impl MockSocketFactory {
    pub fn new() -> Self {
        Self {
            event_txs: Mutex::new(Vec::new()),
        }
    }

    pub fn event_tx(&self) -> mpsc::Sender<SocketEvent> {
        self.event_txs
            .lock()
            .unwrap()
            .last()
            .expect("no socket connected yet")
            .clone()
    }
}

#[async_trait]
impl SocketFactory for MockSocketFactory {
    async fn connect(
        &self,
    ) -> Result<(Arc<dyn FrameSocket>, mpsc::Receiver<SocketEvent>), TransportError> {
        let socket = Arc::new(MockSocket {
            connected: AtomicBool::new(true),
            cancel: CancellationToken::new(),
        });
        let (tx, rx) = mpsc::channel(64);
        self.event_txs.lock().unwrap().push(tx);
        Ok((socket, rx))
    }
}

pub(crate) struct TestHarness {
    pub client: Arc<Client>,
    pub store: Arc<MockStore>,
    pub crypto: Arc<MockCrypto>,
    pub codec: Arc<MockCodec>,
    pub factory: Arc<MockSocketFactory>,
}

impl TestHarness {
    pub fn new() -> Self {
        Self::with_config(ClientConfig::default())
    }

    pub fn with_config(config: ClientConfig) -> Self {
        let _ = env_logger::builder().is_test(true).try_init();
        let store = Arc::new(MockStore::new());
        let crypto = Arc::new(MockCrypto::new());
        let codec = Arc::new(MockCodec::new());
        let factory = Arc::new(MockSocketFactory::new());
        let client = Client::new(
            store.clone(),
            crypto.clone(),
            codec.clone(),
            factory.clone(),
            config,
        );
        Self {
            client,
            store,
            crypto,
            codec,
            factory,
        }
    }

    pub async fn connected() -> Self {
        Self::connected_with_config(ClientConfig::default()).await
    }

    pub async fn connected_with_config(config: ClientConfig) -> Self {
        let harness = Self::with_config(config);
        harness.client.connect().await.expect("mock connect");
        harness.inject(NodeBuilder::new("success").build()).await;
        assert!(
            harness
                .client
                .wait_for_connection(std::time::Duration::from_secs(5))
                .await,
            "client did not become ready"
        );
        harness.codec.sent.lock().unwrap().clear();
        harness
    }

    /// Feeds one stanza through the full inbound pipeline.
    pub async fn inject(&self, node: Node) {
        self.codec.inbound.lock().unwrap().push_back(node);
        self.factory
            .event_tx()
            .send(SocketEvent::Frame(Bytes::from_static(&[0x00])))
            .await
            .expect("socket event channel closed");
    }

    pub fn sent_with_tag(&self, tag: &str) -> Vec<Node> {
        self.codec
            .sent
            .lock()
            .unwrap()
            .iter()
            .filter(|node| node.tag == tag)
            .cloned()
            .collect()
    }

    pub fn retry_receipt_event(&self, chat: &str, message_id: &str) -> Receipt {
        let chat_jid: Jid = chat.parse().unwrap();
        Receipt {
            source: MessageSource {
                chat: chat_jid.clone(),
                sender: chat_jid,
                is_from_me: false,
                is_group: false,
                recipient: None,
            },
            message_ids: vec![message_id.to_string()],
            timestamp: Utc::now(),
            receipt_type: ReceiptType::Retry,
        }
    }

    pub fn retry_receipt_node(&self, from: &str, message_id: &str, count: u64) -> Node {
        NodeBuilder::new("receipt")
            .attr("from", from)
            .attr("id", message_id)
            .attr("type", "retry")
            .children([NodeBuilder::new("retry")
                .attr("id", message_id)
                .attr("t", NodeValue::Int(1_700_000_000))
                .attr("count", count)
                .build()])
            .build()
    }

    pub fn inbound_message_node(&self, from: &str, message_id: &str) -> Node {
        NodeBuilder::new("message")
            .attr("from", from)
            .attr("id", message_id)
            .attr("t", NodeValue::Int(1_700_000_000))
            .children([NodeBuilder::new("enc")
                .attr("v", "2")
                .attr("type", "msg")
                .bytes(vec![0xCF; 16])
                .build()])
            .build()
    }

    pub fn inbound_message_info(&self, from: &str, message_id: &str) -> MessageInfo {
        let sender: Jid = from.parse().unwrap();
        MessageInfo {
            source: MessageSource {
                chat: sender.to_non_ad(),
                sender,
                is_from_me: false,
                is_group: false,
                recipient: None,
            },
            id: message_id.to_string(),
            timestamp: Utc::now(),
        }
    }
}
