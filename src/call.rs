use crate::binary::node::Node;
use crate::binary::NodeBuilder;
use crate::client::Client;
use crate::error::ClientError;
use crate::handlers::StanzaHandler;
use crate::types::call::{BasicCallMeta, CallRemoteMeta};
use crate::types::events::{
    CallAccept, CallOffer, CallOfferNotice, CallPreAccept, CallRelayLatency, CallTerminate,
    CallTransport, Event, UnknownCallEvent,
};
use crate::types::jid::{Jid, MessageId};
use async_trait::async_trait;
use log::warn;
use std::sync::Arc;

/// `<call>`: interprets the signaling child into a typed call event.
/// Every call stanza is acknowledged, recognized or not.
pub(crate) struct CallHandler;

#[async_trait]
impl StanzaHandler for CallHandler {
    fn tag(&self) -> &'static str {
        "call"
    }

    async fn handle(&self, client: Arc<Client>, node: Node) {
        {
            let ack_client = client.clone();
            let ack_node = node.clone();
            tokio::spawn(async move {
                if let Err(err) = ack_client.send_ack(&ack_node).await {
                    warn!(target: "Client", "failed to ack call stanza: {err}");
                }
            });
        }

        let children = node.children().unwrap_or_default();
        if children.len() != 1 {
            client.dispatch_event(&Event::UnknownCallEvent(UnknownCallEvent { node }));
            return;
        }
        let child = children[0].clone();

        let (from, timestamp, remote) = {
            let mut parser = node.attrs();
            let from = parser.jid("from");
            let timestamp = parser.unix_time("t");
            let remote = CallRemoteMeta {
                remote_platform: parser.optional_string("platform").unwrap_or("").to_string(),
                remote_version: parser.optional_string("version").unwrap_or("").to_string(),
            };
            (from, timestamp, remote)
        };
        let (call_creator, call_id, media, call_type, reason) = {
            let mut parser = child.attrs();
            (
                parser.jid("call-creator"),
                parser.string("call-id"),
                parser.optional_string("media").unwrap_or("").to_string(),
                parser.optional_string("type").unwrap_or("").to_string(),
                parser.optional_string("reason").unwrap_or("").to_string(),
            )
        };
        let meta = BasicCallMeta {
            from,
            timestamp,
            call_creator,
            call_id,
        };

        let event = match child.tag.as_str() {
            "offer" => Event::CallOffer(CallOffer {
                meta,
                remote,
                data: child,
            }),
            "offer_notice" => Event::CallOfferNotice(CallOfferNotice {
                meta,
                media,
                call_type,
                data: child,
            }),
            "relaylatency" => Event::CallRelayLatency(CallRelayLatency { meta, data: child }),
            "accept" => Event::CallAccept(CallAccept {
                meta,
                remote,
                data: child,
            }),
            "preaccept" => Event::CallPreAccept(CallPreAccept {
                meta,
                remote,
                data: child,
            }),
            "transport" => Event::CallTransport(CallTransport {
                meta,
                remote,
                data: child,
            }),
            "terminate" => Event::CallTerminate(CallTerminate {
                meta,
                reason,
                data: child,
            }),
            _ => Event::UnknownCallEvent(UnknownCallEvent { node }),
        };
        client.dispatch_event(&event);
    }
}

impl Client {
    /// Rejects an incoming call. Pass an empty `message_id` to have one
    /// generated.
    pub async fn reject_call(
        &self,
        call_id: &str,
        call_from: Jid,
        message_id: MessageId,
    ) -> Result<(), ClientError> {
        let own = self.store.jid().ok_or(ClientError::NotLoggedIn)?;
        let message_id = if message_id.is_empty() {
            self.generate_message_id()
        } else {
            message_id
        };
        let own = own.to_non_ad();
        let call_from = call_from.to_non_ad();

        self.send_node(
            NodeBuilder::new("call")
                .attr("id", message_id)
                .attr("from", own)
                .attr("to", call_from.clone())
                .children([NodeBuilder::new("reject")
                    .attr("call-id", call_id)
                    .attr("call-creator", call_from)
                    .attr("count", "0")
                    .build()])
                .build(),
        )
        .await
    }
}
