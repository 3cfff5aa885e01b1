use super::traits::StanzaHandler;
use crate::binary::node::Node;
use crate::client::Client;
use crate::proto;
use crate::store::CryptoError;
use crate::types::events::{Event, IdentityChange, MessageEvent};
use crate::types::jid::BROADCAST_SERVER;
use crate::types::message::{MessageInfo, MessageSource};
use async_trait::async_trait;
use log::{debug, warn};
use prost::Message as _;
use std::sync::Arc;

/// `<message>`: decrypt the enc payloads, or start the inbound retry
/// protocol when decryption fails.
pub(super) struct MessageHandler;

#[async_trait]
impl StanzaHandler for MessageHandler {
    fn tag(&self) -> &'static str {
        "message"
    }

    async fn handle(&self, client: Arc<Client>, node: Node) {
        let info = match parse_message_info(&client, &node) {
            Some(info) => info,
            None => {
                warn!(target: "Client", "dropping message with unparseable envelope: {node}");
                return;
            }
        };

        if let Err(err) = client.send_ack(&node).await {
            warn!(target: "Client", "failed to ack message {}: {err}", info.id);
        }

        let enc_children = node.get_children_by_tag("enc");
        if enc_children.is_empty() {
            debug!(target: "Client", "message {} has no enc payload", info.id);
            return;
        }

        for enc in enc_children {
            let enc_type = enc
                .attrs()
                .optional_string("type")
                .unwrap_or("")
                .to_string();
            let Some(ciphertext) = enc.bytes_content() else {
                continue;
            };
            match decrypt_with_trust_handling(&client, &info, ciphertext, &enc_type).await {
                Ok(plaintext) => {
                    client.cancel_delayed_request_from_phone(&info.id);
                    handle_plaintext(&client, &info, &plaintext).await;
                }
                Err(err) => {
                    warn!(
                        target: "Client",
                        "failed to decrypt {enc_type} payload of {} from {}: {err}",
                        info.id, info.source.sender
                    );
                    let force_identity = matches!(err, CryptoError::UntrustedIdentity(_));
                    if let Err(send_err) = client
                        .send_retry_receipt(&node, &info, force_identity)
                        .await
                    {
                        warn!(
                            target: "Client",
                            "failed to send retry receipt for {}: {send_err}", info.id
                        );
                    }
                    return;
                }
            }
        }
    }
}

/// Decrypts one enc payload, dropping the stored identity and retrying once
/// when the peer's identity changed and auto-trust is on.
async fn decrypt_with_trust_handling(
    client: &Arc<Client>,
    info: &MessageInfo,
    ciphertext: &[u8],
    enc_type: &str,
) -> Result<Vec<u8>, CryptoError> {
    let sender = &info.source.sender;
    let chat = &info.source.chat;
    match client
        .crypto
        .decrypt_message(ciphertext, enc_type, sender, chat)
        .await
    {
        Err(CryptoError::UntrustedIdentity(address)) if client.config.auto_trust_identity => {
            warn!(
                target: "Client",
                "untrusted identity for {address}, dropping old identity and retrying"
            );
            if let Err(err) = client.crypto.delete_identity(&address).await {
                warn!(target: "Client", "failed to delete identity for {address}: {err}");
            }
            client.dispatch_event(&Event::IdentityChange(IdentityChange {
                jid: sender.clone(),
                implicit: true,
            }));
            client
                .crypto
                .decrypt_message(ciphertext, enc_type, sender, chat)
                .await
        }
        other => other,
    }
}

async fn handle_plaintext(client: &Arc<Client>, info: &MessageInfo, plaintext: &[u8]) {
    let mut message = match proto::Message::decode(plaintext) {
        Ok(message) => message,
        Err(err) => {
            warn!(
                target: "Client",
                "failed to decode plaintext of {}: {err}", info.id
            );
            return;
        }
    };

    if let Some(skdm) = message.sender_key_distribution_message.take() {
        if let Some(axolotl) = skdm.axolotl_sender_key_distribution_message {
            let sender_address = info.source.sender.signal_address();
            if let Err(err) = client
                .crypto
                .process_sender_key_distribution(&info.source.chat, &sender_address, &axolotl)
                .await
            {
                warn!(
                    target: "Client",
                    "failed to process sender key distribution from {}: {err}",
                    info.source.sender
                );
            }
        }
    }

    if let Some(device_sent) = message.device_sent_message.take() {
        if let Some(inner) = device_sent.message {
            message = *inner;
        }
    }

    client.dispatch_event(&Event::Message(Box::new(MessageEvent {
        info: info.clone(),
        message,
    })));
}

/// Resolves the chat/sender/direction of an inbound stanza addressed with
/// `from`/`participant`/`recipient` attributes.
pub(super) fn parse_message_source(
    client: &Client,
    node: &Node,
    require_participant: bool,
) -> Option<MessageSource> {
    let mut parser = node.attrs();
    let from = parser.jid("from");
    let participant = parser.optional_jid("participant");
    let recipient = parser.optional_jid("recipient");
    if !parser.ok() {
        warn!(
            target: "Client",
            "failed to parse stanza source attributes: {:?}", parser.errors
        );
        return None;
    }

    let own = client.store.jid().unwrap_or_default();
    if from.is_group() || from.server == BROADCAST_SERVER {
        let sender = match participant {
            Some(sender) => sender,
            None if require_participant => return None,
            None => Default::default(),
        };
        let is_from_me = sender.is_same_user_as(&own);
        Some(MessageSource {
            is_group: true,
            chat: from,
            sender,
            is_from_me,
            recipient,
        })
    } else if from.is_same_user_as(&own) {
        let chat = recipient
            .clone()
            .map(|r| r.to_non_ad())
            .unwrap_or_else(|| from.to_non_ad());
        Some(MessageSource {
            chat,
            sender: from,
            is_from_me: true,
            is_group: false,
            recipient,
        })
    } else {
        Some(MessageSource {
            chat: from.to_non_ad(),
            sender: from,
            is_from_me: false,
            is_group: false,
            recipient,
        })
    }
}

fn parse_message_info(client: &Client, node: &Node) -> Option<MessageInfo> {
    let source = parse_message_source(client, node, true)?;
    let mut parser = node.attrs();
    let id = parser.string("id");
    let timestamp = parser.unix_time("t");
    if !parser.ok() {
        warn!(
            target: "Client",
            "failed to parse message envelope: {:?}", parser.errors
        );
        return None;
    }
    Some(MessageInfo {
        source,
        id,
        timestamp,
    })
}

#[cfg(test)]
mod tests {
    use crate::test_utils::TestHarness;
    use crate::types::events::Event;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    #[tokio::test]
    async fn untrusted_identity_is_dropped_and_decrypt_retried_with_auto_trust() {
        let harness = TestHarness::connected().await;
        harness.crypto.untrusted_failures.store(1, Ordering::SeqCst);

        let identity_changes = Arc::new(AtomicUsize::new(0));
        let messages = Arc::new(AtomicUsize::new(0));
        let identity_sink = identity_changes.clone();
        let message_sink = messages.clone();
        harness.client.add_event_handler(Box::new(move |event| {
            match event {
                Event::IdentityChange(_) => {
                    identity_sink.fetch_add(1, Ordering::SeqCst);
                }
                Event::Message(_) => {
                    message_sink.fetch_add(1, Ordering::SeqCst);
                }
                _ => {}
            };
        }));

        harness
            .inject(harness.inbound_message_node("5511933334444@s.whatsapp.net", "U1"))
            .await;

        for _ in 0..200 {
            if messages.load(Ordering::SeqCst) == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(messages.load(Ordering::SeqCst), 1);
        assert_eq!(identity_changes.load(Ordering::SeqCst), 1);
        assert_eq!(harness.crypto.deleted_identities.lock().unwrap().len(), 1);
        // No retry receipt was needed.
        assert!(harness.sent_with_tag("receipt").is_empty());
    }

    #[tokio::test]
    async fn untrusted_identity_without_auto_trust_forces_keys_into_the_retry() {
        let mut config = crate::config::ClientConfig::default();
        config.auto_trust_identity = false;
        let harness = TestHarness::connected_with_config(config).await;
        // Every decrypt attempt reports an untrusted identity.
        harness.crypto.untrusted_failures.store(u32::MAX, Ordering::SeqCst);

        let retries = Arc::new(Mutex::new(Vec::new()));
        harness
            .inject(harness.inbound_message_node("5511933334444@s.whatsapp.net", "U2"))
            .await;

        for _ in 0..200 {
            {
                let mut sink = retries.lock().unwrap();
                *sink = harness.sent_with_tag("receipt");
                if !sink.is_empty() {
                    break;
                }
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        let receipts = retries.lock().unwrap().clone();
        assert_eq!(receipts.len(), 1);
        // Identity inclusion is forced even on the first retry.
        assert!(receipts[0].get_optional_child("keys").is_some());
        assert!(harness.crypto.deleted_identities.lock().unwrap().is_empty());
    }
}
