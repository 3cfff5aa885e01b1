//! Mock collaborators driving a full client over the public API.
#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use wamd::binary::{BinaryError, Node, NodeBuilder, StanzaCodec};
use wamd::store::{
    CryptoError, DeviceStore, EncryptedMessage, PreKey, PreKeyBundle, SignalCrypto, StoreError,
};
use wamd::transport::{FrameSocket, SocketEvent, SocketFactory, TransportError};
use wamd::types::jid::{Jid, SignalAddress};
use wamd::{Client, ClientConfig, Event};

pub struct MockStore {
    pub jid: Jid,
    pub registration_id: u32,
    pub contains_session: AtomicBool,
    pub deleted: AtomicBool,
    prekey_counter: AtomicU32,
}

#[async_trait]
impl DeviceStore for MockStore {
    fn jid(&self) -> Option<Jid> {
        Some(self.jid.clone())
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
        self.deleted.store(true, Ordering::SeqCst);
        Ok(())
    }
}

pub struct MockCrypto {
    pub decrypt_failures: AtomicU32,
    pub skdm_requests: Mutex<Vec<(Jid, SignalAddress)>>,
    pub encrypt_calls: Mutex<Vec<(Jid, bool)>>,
    pub plaintext: Mutex<Vec<u8>>,
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
        if self.decrypt_failures.load(Ordering::SeqCst) > 0 {
            self.decrypt_failures.fetch_sub(1, Ordering::SeqCst);
            return Err(CryptoError::NoSession(sender.signal_address()));
        }
        Ok(self.plaintext.lock().unwrap().clone())
    }

    async fn delete_identity(&self, _address: &SignalAddress) -> Result<(), CryptoError> {
        Ok(())
    }
}

pub struct MockCodec {
    pub sent: Mutex<Vec<Node>>,
    pub inbound: Mutex<VecDeque<Node>>,
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

pub struct MockSocket {
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

pub struct MockSocketFactory {
    pub event_txs: Mutex<Vec<mpsc::Sender<SocketEvent>>>,
    pub connect_attempts: AtomicU32,
}

#[async_trait]
impl SocketFactory for MockSocketFactory {
    async fn connect(
        &self,
    ) -> Result<(Arc<dyn FrameSocket>, mpsc::Receiver<SocketEvent>), TransportError> {
        self.connect_attempts.fetch_add(1, Ordering::SeqCst);
        let socket = Arc::new(MockSocket {
            connected: AtomicBool::new(true),
            cancel: CancellationToken::new(),
        });
        let (tx, rx) = mpsc::channel(64);
        self.event_txs.lock().unwrap().push(tx);
        Ok((socket, rx))
    }
}

pub struct Harness {
    pub client: Arc<Client>,
    pub store: Arc<MockStore>,
    pub crypto: Arc<MockCrypto>,
    pub codec: Arc<MockCodec>,
    pub factory: Arc<MockSocketFactory>,
    pub events: Arc<Mutex<Vec<Event>>>,
}

impl Harness {
    pub fn new(config: ClientConfig) -> Self {
        let _ = env_logger::builder().is_test(true).try_init();
        let store = Arc::new(MockStore {
            jid: "5511999990000:2@s.whatsapp.net".parse().unwrap(),
            registration_id: 0x01020304,
            contains_session: AtomicBool::new(true),
            deleted: AtomicBool::new(false),
            prekey_counter: AtomicU32::new(100),
        });
        let crypto = Arc::new(MockCrypto {
            decrypt_failures: AtomicU32::new(0),
            skdm_requests: Mutex::new(Vec::new()),
            encrypt_calls: Mutex::new(Vec::new()),
            plaintext: Mutex::new(Vec::new()),
        });
        let codec = Arc::new(MockCodec {
            sent: Mutex::new(Vec::new()),
            inbound: Mutex::new(VecDeque::new()),
        });
        let factory = Arc::new(MockSocketFactory {
            event_txs: Mutex::new(Vec::new()),
            connect_attempts: AtomicU32::new(0),
        });
        let client = Client::new(
            store.clone(),
            crypto.clone(),
            codec.clone(),
            factory.clone(),
            config,
        );
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        client.add_event_handler(Box::new(move |event| {
            sink.lock().unwrap().push(event.clone());
        }));
        Self {
            client,
            store,
            crypto,
            codec,
            factory,
            events,
        }
    }

    pub async fn connect(&self) {
        self.client.connect().await.expect("mock connect");
        self.inject(NodeBuilder::new("success").build()).await;
        assert!(
            self.client.wait_for_connection(Duration::from_secs(5)).await,
            "client did not become ready"
        );
        self.codec.sent.lock().unwrap().clear();
        self.events.lock().unwrap().clear();
    }

    pub fn event_tx(&self) -> mpsc::Sender<SocketEvent> {
        self.factory
            .event_txs
            .lock()
            .unwrap()
            .last()
            .expect("no socket connected yet")
            .clone()
    }

    /// Feeds one stanza through the full inbound pipeline.
    pub async fn inject(&self, node: Node) {
        self.codec.inbound.lock().unwrap().push_back(node);
        self.event_tx()
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

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }

    /// Polls until `predicate` holds, or panics after two seconds.
    pub async fn wait_until(&self, predicate: impl Fn(&Harness) -> bool) {
        for _ in 0..200 {
            if predicate(self) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("condition never held");
    }
}
