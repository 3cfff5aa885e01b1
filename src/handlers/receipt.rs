use super::message::parse_message_source;
use super::traits::StanzaHandler;
use crate::binary::node::Node;
use crate::client::Client;
use crate::types::events::Event;
use crate::types::message::{Receipt, ReceiptType};
use async_trait::async_trait;
use chrono::Utc;
use log::{debug, warn};
use std::sync::Arc;

/// `<receipt>`: delivery/read acknowledgements, and the entry point of the
/// outbound retry engine for `type="retry"`.
pub(super) struct ReceiptHandler;

#[async_trait]
impl StanzaHandler for ReceiptHandler {
    fn tag(&self) -> &'static str {
        "receipt"
    }

    async fn handle(&self, client: Arc<Client>, node: Node) {
        let Some(receipt) = parse_receipt(&client, &node) else {
            warn!(target: "Client", "dropping unparseable receipt: {node}");
            return;
        };

        if let Err(err) = client.send_ack(&node).await {
            warn!(
                target: "Client",
                "failed to ack receipt for {:?}: {err}", receipt.message_ids
            );
        }

        if receipt.receipt_type == ReceiptType::Retry {
            if let Err(err) = client.handle_retry_receipt(&receipt, &node).await {
                warn!(
                    target: "Client",
                    "failed to handle retry receipt for {} from {}: {err}",
                    receipt.message_ids[0], receipt.source.sender
                );
            }
        } else {
            debug!(
                target: "Client",
                "received {:?} receipt for {:?} from {}",
                receipt.receipt_type, receipt.message_ids, receipt.source.sender
            );
            client.dispatch_event(&Event::Receipt(receipt));
        }
    }
}

fn parse_receipt(client: &Client, node: &Node) -> Option<Receipt> {
    let source = parse_message_source(client, node, false)?;
    let mut parser = node.attrs();
    let id = parser.string("id");
    let timestamp = parser.optional_unix_time("t").unwrap_or_else(Utc::now);
    let receipt_type = ReceiptType::from(parser.optional_string("type").unwrap_or(""));
    if !parser.ok() {
        warn!(
            target: "Client",
            "failed to parse receipt attributes: {:?}", parser.errors
        );
        return None;
    }

    let mut message_ids = vec![id];
    if let Some(list) = node.get_optional_child("list") {
        for item in list.get_children_by_tag("item") {
            if let Some(extra) = item.attrs().optional_string("id") {
                message_ids.push(extra.to_string());
            }
        }
    }

    Some(Receipt {
        source,
        message_ids,
        timestamp,
        receipt_type,
    })
}
