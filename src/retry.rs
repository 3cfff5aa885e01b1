//! The Signal-based retry protocol.
//!
//! Outbound direction: a peer failed to decrypt something we sent and asks
//! for it again via a `<receipt type="retry">`; we recover the plaintext
//! from the recent-message ring, rebuild the Signal session if warranted
//! and re-encrypt just for that device. Inbound direction: we failed to
//! decrypt something, so we ask the sender to resend, escalating to our
//! own primary device if the first retry stays unanswered.

use crate::binary::node::{Attrs, Node, NodeContent, NodeValue};
use crate::binary::NodeBuilder;
use crate::client::Client;
use crate::error::ClientError;
use crate::prekeys::{node_to_prekey_bundle, prekey_to_node};
use crate::proto;
use crate::store::CryptoError;
use crate::types::jid::{Jid, MessageId};
use crate::types::message::{MessageInfo, Receipt};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use dashmap::mapref::entry::Entry;
use log::{debug, error, warn};
use prost::Message as _;
use std::sync::Arc;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

/// Number of sent messages kept in memory for handling retry receipts.
pub(crate) const RECENT_MESSAGES_SIZE: usize = 256;
/// Retries processed per `(sender, message id)` before further ones are
/// silently dropped.
const MAX_INCOMING_RETRIES: u32 = 10;
/// Retry receipts sent per failed inbound message before giving up.
const MAX_RETRY_RECEIPTS: u32 = 5;
/// Curve25519 key type marker in `keys` blocks.
const DJB_KEY_TYPE: u8 = 5;

fn recreate_session_timeout() -> ChronoDuration {
    ChronoDuration::hours(1)
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub(crate) struct RecentMessageKey {
    pub to: Jid,
    pub id: MessageId,
}

#[derive(Debug, Clone)]
pub(crate) struct RecentMessage {
    pub message: proto::Message,
    pub timestamp: DateTime<Utc>,
}

/// Fixed-capacity eviction ring. The keys live here; the plaintexts live
/// in the concurrent index so lookups don't take the ring lock.
pub(crate) struct RecentMessageRing {
    slots: Vec<RecentMessageKey>,
    ptr: usize,
}

impl RecentMessageRing {
    pub(crate) fn new() -> Self {
        Self {
            slots: vec![RecentMessageKey::default(); RECENT_MESSAGES_SIZE],
            ptr: 0,
        }
    }

    #[cfg(test)]
    pub(crate) fn occupied(&self) -> usize {
        self.slots.iter().filter(|key| !key.id.is_empty()).count()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) struct IncomingRetryKey {
    pub sender: Jid,
    pub message_id: MessageId,
}

impl Client {
    /// Remembers a sent plaintext so a retry receipt for it can be honored
    /// later. Evicts whatever occupies the current ring slot.
    pub fn add_recent_message(&self, to: Jid, id: MessageId, message: proto::Message) {
        let mut ring = self
            .recent_messages_ring
            .lock()
            .expect("recent message ring poisoned");
        let ptr = ring.ptr;
        if !ring.slots[ptr].id.is_empty() {
            self.recent_messages_index.remove(&ring.slots[ptr]);
        }
        let key = RecentMessageKey { to, id };
        self.recent_messages_index.insert(
            key.clone(),
            RecentMessage {
                message,
                timestamp: Utc::now(),
            },
        );
        ring.slots[ptr] = key;
        ring.ptr = (ptr + 1) % RECENT_MESSAGES_SIZE;
    }

    pub(crate) fn get_recent_message(&self, to: &Jid, id: &str) -> Option<RecentMessage> {
        self.recent_messages_index
            .get(&RecentMessageKey {
                to: to.clone(),
                id: id.to_string(),
            })
            .map(|entry| entry.value().clone())
    }

    fn get_message_for_retry(
        &self,
        receipt: &Receipt,
        message_id: &str,
    ) -> Result<proto::Message, ClientError> {
        if let Some(recent) = self.get_recent_message(&receipt.source.chat, message_id) {
            debug!(
                target: "Client",
                "found message sent at {} in cache to accept retry receipt for {}/{message_id} from {}",
                recent.timestamp, receipt.source.chat, receipt.source.sender
            );
            return Ok(recent.message);
        }
        if let Some(lookup) = &self.config.get_message_for_retry {
            if let Some(message) = lookup(
                &receipt.source.sender,
                &receipt.source.chat,
                &message_id.to_string(),
            ) {
                debug!(
                    target: "Client",
                    "external source provided message for retry receipt for {}/{message_id}",
                    receipt.source.chat
                );
                return Ok(message);
            }
        }
        Err(ClientError::MessageNotInCache(message_id.to_string()))
    }

    /// Whether to force-rebuild the Signal session with `jid` before
    /// re-encrypting: always when no session exists, and at most once an
    /// hour once the peer keeps retrying past the first attempt.
    pub(crate) async fn should_recreate_session(
        &self,
        retry_count: u32,
        jid: &Jid,
    ) -> (String, bool) {
        let has_session = self
            .store
            .contains_session(&jid.signal_address())
            .await
            .unwrap_or(false);
        if !has_session {
            self.session_recreate_history.insert(jid.clone(), Utc::now());
            return ("we don't have a Signal session with them".to_string(), true);
        }
        if retry_count < 2 {
            return (String::new(), false);
        }
        let previous = self
            .session_recreate_history
            .get(jid)
            .map(|entry| *entry.value());
        match previous {
            Some(last) if last + recreate_session_timeout() >= Utc::now() => {
                (String::new(), false)
            }
            _ => {
                self.session_recreate_history.insert(jid.clone(), Utc::now());
                (
                    "retry count > 1 and over an hour since last recreation".to_string(),
                    true,
                )
            }
        }
    }

    /// Outbound retry engine: honors a `<receipt type="retry">` by
    /// re-encrypting and resending the referenced message to the requester.
    pub(crate) async fn handle_retry_receipt(
        self: &Arc<Self>,
        receipt: &Receipt,
        node: &Node,
    ) -> Result<(), ClientError> {
        let retry_child = node
            .get_optional_child("retry")
            .ok_or(ClientError::ElementMissing {
                tag: "retry",
                context: "retry receipt",
            })?;
        let mut parser = retry_child.attrs();
        let message_id = parser.string("id");
        let timestamp = parser.unix_time("t");
        let retry_count = parser.u64("count") as u32;
        parser.finish()?;

        let mut message = self.get_message_for_retry(receipt, &message_id)?;

        let retry_key = IncomingRetryKey {
            sender: receipt.source.sender.clone(),
            message_id: message_id.clone(),
        };
        let internal_count = {
            let mut entry = self.incoming_retry_counter.entry(retry_key).or_insert(0);
            *entry += 1;
            *entry
        };
        if internal_count > MAX_INCOMING_RETRIES {
            warn!(
                target: "Client",
                "dropping retry request for {message_id} from {}: internal retry counter is {internal_count}",
                receipt.source.sender
            );
            return Ok(());
        }

        let own = self.store.jid().ok_or(ClientError::NotLoggedIn)?;

        if receipt.source.is_group {
            match self
                .crypto
                .create_sender_key_distribution(&receipt.source.chat, &own.signal_address())
                .await
            {
                Ok(skdm) => {
                    message.sender_key_distribution_message =
                        Some(proto::SenderKeyDistributionMessage {
                            group_id: Some(receipt.source.chat.to_string()),
                            axolotl_sender_key_distribution_message: Some(skdm),
                        });
                }
                // The resend still goes out; the peer may reject it.
                Err(err) => warn!(
                    target: "Client",
                    "failed to create sender key distribution message for retry of {message_id} in {}: {err}",
                    receipt.source.chat
                ),
            }
        } else if receipt.source.is_from_me {
            message = proto::Message {
                device_sent_message: Some(Box::new(proto::DeviceSentMessage {
                    destination_jid: Some(receipt.source.chat.to_string()),
                    message: Some(Box::new(message)),
                    phash: None,
                })),
                ..Default::default()
            };
        }

        if let Some(callback) = &self.config.pre_retry_callback {
            if !callback(receipt, &message_id, retry_count, &message) {
                debug!(target: "Client", "retry receipt cancelled by pre-retry callback");
                return Ok(());
            }
        }

        let plaintext = message.encode_to_vec();

        let bundle = if node.get_optional_child("keys").is_some() {
            Some(node_to_prekey_bundle(
                receipt.source.sender.device as u32,
                node,
            )?)
        } else {
            let (reason, recreate) = self
                .should_recreate_session(retry_count, &receipt.source.sender)
                .await;
            if recreate {
                debug!(
                    target: "Client",
                    "fetching prekeys for {} to handle retry receipt because {reason}",
                    receipt.source.sender
                );
                let mut bundles = self
                    .fetch_prekeys(std::slice::from_ref(&receipt.source.sender))
                    .await?;
                let bundle = bundles.remove(&receipt.source.sender).ok_or_else(|| {
                    ClientError::Crypto(CryptoError::Failure(format!(
                        "didn't get prekey bundle for {}",
                        receipt.source.sender
                    )))
                })?;
                Some(bundle)
            } else {
                None
            }
        };

        let encrypted = self
            .crypto
            .encrypt_for_device(&plaintext, &receipt.source.sender, bundle.as_ref())
            .await?;

        let mut enc_builder = NodeBuilder::new("enc")
            .attr("v", "2")
            .attr("type", encrypted.enc_type);
        if let Some(media) = proto::media_type(&message) {
            enc_builder = enc_builder.attr("mediatype", media);
        }
        let enc_node = enc_builder
            .attr("count", retry_count as u64)
            .bytes(encrypted.ciphertext)
            .build();

        let mut attrs = Attrs::new();
        if let Some(to) = node.attrs.get("from") {
            attrs.insert("to".into(), to.clone());
        }
        attrs.insert("type".into(), proto::stanza_type(&message).into());
        attrs.insert("id".into(), message_id.clone().into());
        attrs.insert("t".into(), NodeValue::Int(timestamp.timestamp()));
        if !receipt.source.is_group {
            attrs.insert("device_fanout".into(), NodeValue::Bool(false));
        }
        for key in ["participant", "recipient", "edit"] {
            if let Some(value) = node.attrs.get(key) {
                attrs.insert(key.to_string(), value.clone());
            }
        }

        let mut children = vec![enc_node];
        if encrypted.include_device_identity {
            if let Some(blob) = self.store.account_blob() {
                children.push(NodeBuilder::new("device-identity").bytes(blob).build());
            }
        }

        let message_node = Node {
            tag: "message".into(),
            attrs,
            content: Some(NodeContent::Nodes(children)),
        };
        {
            let _send_guard = self.message_send_lock.lock().await;
            self.send_node(message_node).await?;
        }
        debug!(
            target: "Client",
            "sent retry #{retry_count} of {}/{message_id} to {}",
            receipt.source.chat, receipt.source.sender
        );
        Ok(())
    }

    /// Inbound retry engine: we failed to decrypt `node`; ask the sender to
    /// resend, attaching our fresh keys once the first plain retry didn't
    /// help.
    pub(crate) async fn send_retry_receipt(
        self: &Arc<Self>,
        node: &Node,
        info: &MessageInfo,
        force_include_identity: bool,
    ) -> Result<(), ClientError> {
        let id = info.id.clone();
        // If this message is already a retry response and we restarted in
        // between, pick the count up from the message itself.
        let retry_count_in_msg = {
            let children = node.children().unwrap_or_default();
            if children.len() == 1 && children[0].tag == "enc" {
                children[0].attrs().optional_u64("count").unwrap_or(0) as u32
            } else {
                0
            }
        };
        let retry_count = {
            let mut entry = self.message_retries.entry(id.clone()).or_insert(0);
            *entry += 1;
            if *entry == 1 && retry_count_in_msg > 0 {
                *entry = retry_count_in_msg + 1;
            }
            *entry
        };
        if retry_count >= MAX_RETRY_RECEIPTS {
            warn!(target: "Client", "not sending any more retry receipts for {id}");
            return Ok(());
        }
        if retry_count == 1 {
            let client = self.clone();
            let info = info.clone();
            tokio::spawn(async move {
                client.delayed_request_message_from_phone(info).await;
            });
        }

        let mut attrs = Attrs::new();
        attrs.insert("id".into(), id.clone().into());
        attrs.insert("type".into(), NodeValue::String("retry".into()));
        if let Some(from) = node.attrs.get("from") {
            attrs.insert("to".into(), from.clone());
        }
        for key in ["recipient", "participant"] {
            if let Some(value) = node.attrs.get(key) {
                attrs.insert(key.to_string(), value.clone());
            }
        }

        let mut retry_builder = NodeBuilder::new("retry")
            .attr("count", retry_count as u64)
            .attr("id", id.clone());
        if let Some(t) = node.attrs.get("t") {
            retry_builder = retry_builder.attr("t", t.clone());
        }
        let retry_node = retry_builder.attr("v", "1").build();

        let registration_node = NodeBuilder::new("registration")
            .bytes(self.store.registration_id().to_be_bytes().to_vec())
            .build();
        let mut children = vec![retry_node, registration_node];

        if retry_count > 1 || force_include_identity {
            match self.store.gen_one_prekey().await {
                Err(err) => {
                    error!(target: "Client", "failed to get prekey for retry receipt: {err}");
                }
                Ok(prekey) => match self.store.account_blob() {
                    None => {
                        error!(target: "Client", "missing device account info for retry receipt");
                        return Ok(());
                    }
                    Some(device_identity) => {
                        children.push(
                            NodeBuilder::new("keys")
                                .children([
                                    NodeBuilder::new("type").bytes(vec![DJB_KEY_TYPE]).build(),
                                    NodeBuilder::new("identity")
                                        .bytes(self.store.identity_public_key().to_vec())
                                        .build(),
                                    prekey_to_node(&prekey),
                                    prekey_to_node(&self.store.signed_prekey()),
                                    NodeBuilder::new("device-identity")
                                        .bytes(device_identity)
                                        .build(),
                                ])
                                .build(),
                        );
                    }
                },
            }
        }

        self.send_node(Node {
            tag: "receipt".into(),
            attrs,
            content: Some(NodeContent::Nodes(children)),
        })
        .await
    }

    /// Cancels a pending primary-device rerequest for `message_id`, e.g.
    /// because a later decrypt succeeded.
    pub fn cancel_delayed_request_from_phone(&self, message_id: &str) {
        if !self.config.automatic_message_rerequest_from_phone {
            return;
        }
        if let Some(entry) = self.pending_phone_rerequests.get(message_id) {
            entry.value().cancel();
        }
    }

    /// After [`ClientConfig::request_from_phone_delay`], asks our own
    /// primary device to resend the message, unless cancelled in the
    /// meantime. At most one pending request per message id.
    pub(crate) async fn delayed_request_message_from_phone(self: Arc<Self>, info: MessageInfo) {
        if !self.config.automatic_message_rerequest_from_phone {
            return;
        }
        let token = CancellationToken::new();
        match self.pending_phone_rerequests.entry(info.id.clone()) {
            Entry::Occupied(_) => return,
            Entry::Vacant(slot) => {
                slot.insert(token.clone());
            }
        }
        let _cleanup = scopeguard::guard((self.clone(), info.id.clone()), |(client, id)| {
            client.pending_phone_rerequests.remove(&id);
        });

        tokio::select! {
            _ = sleep(self.config.request_from_phone_delay) => {}
            _ = token.cancelled() => {
                debug!(
                    target: "Client",
                    "cancelled delayed request for message {} from phone", info.id
                );
                return;
            }
        }

        let Some(own) = self.store.jid() else {
            return;
        };
        let request =
            build_unavailable_message_request(&info.source.chat, &info.source.sender, &info.id);
        match self.send_peer_message(own.to_non_ad(), &request).await {
            Ok(_) => debug!(target: "Client", "requested message {} from phone", info.id),
            Err(err) => warn!(
                target: "Client",
                "failed to send request for unavailable message {} to phone: {err}", info.id
            ),
        }
    }

    /// Sends a protocol message to one of our own devices.
    pub(crate) async fn send_peer_message(
        &self,
        to: Jid,
        message: &proto::Message,
    ) -> Result<MessageId, ClientError> {
        let message_id = self.generate_message_id();
        let plaintext = message.encode_to_vec();
        let encrypted = self.crypto.encrypt_for_device(&plaintext, &to, None).await?;

        let enc_node = NodeBuilder::new("enc")
            .attr("v", "2")
            .attr("type", encrypted.enc_type)
            .bytes(encrypted.ciphertext)
            .build();
        let mut children = vec![enc_node];
        if encrypted.include_device_identity {
            if let Some(blob) = self.store.account_blob() {
                children.push(NodeBuilder::new("device-identity").bytes(blob).build());
            }
        }

        let node = NodeBuilder::new("message")
            .attr("id", message_id.clone())
            .attr("to", to)
            .attr("type", "text")
            .attr("category", "peer")
            .attr("t", NodeValue::Int(Utc::now().timestamp()))
            .children(children)
            .build();

        let _send_guard = self.message_send_lock.lock().await;
        self.send_node(node).await?;
        Ok(message_id)
    }
}

/// The protocol message asking the primary device to resend a message it
/// already decrypted.
pub fn build_unavailable_message_request(
    chat: &Jid,
    sender: &Jid,
    message_id: &str,
) -> proto::Message {
    proto::Message {
        protocol_message: Some(Box::new(proto::ProtocolMessage {
            key: None,
            r#type: Some(proto::protocol_message::Type::PeerDataOperationRequestMessage as i32),
            peer_data_operation_request_message: Some(proto::PeerDataOperationRequestMessage {
                peer_data_operation_request_type: Some(
                    proto::PeerDataOperationRequestType::PlaceholderMessageResend as i32,
                ),
                placeholder_message_resend_request: vec![proto::PlaceholderMessageResendRequest {
                    message_key: Some(proto::MessageKey {
                        remote_jid: Some(chat.to_string()),
                        from_me: Some(false),
                        id: Some(message_id.to_string()),
                        participant: if chat.is_group() {
                            Some(sender.to_string())
                        } else {
                            None
                        },
                    }),
                }],
            }),
        })),
        ..Default::default()
    }
}
