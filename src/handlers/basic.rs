use super::traits::StanzaHandler;
use crate::binary::node::Node;
use crate::binary::NodeBuilder;
use crate::client::Client;
use crate::types::events::{Event, LoggedOut, StreamError, StreamReplaced};
use async_trait::async_trait;
use chrono::Utc;
use log::{debug, error, info, warn};
use std::sync::atomic::Ordering;
use std::sync::Arc;

/// `<success>`: the server accepted our authentication.
pub(super) struct SuccessHandler;

#[async_trait]
impl StanzaHandler for SuccessHandler {
    fn tag(&self) -> &'static str {
        "success"
    }

    async fn handle(&self, client: Arc<Client>, _node: Node) {
        info!(target: "Client", "successfully authenticated");
        client.is_logged_in.store(true, Ordering::Relaxed);
        client.auto_reconnect_errors.store(0, Ordering::Relaxed);
        *client
            .last_successful_connect
            .lock()
            .expect("connect timestamp poisoned") = Some(Utc::now());
        client.signal_socket_ready().await;
        client.dispatch_event(&Event::Connected(crate::types::events::Connected));
    }
}

/// `<failure>`: the server rejected the connection during login.
pub(super) struct FailureHandler;

#[async_trait]
impl StanzaHandler for FailureHandler {
    fn tag(&self) -> &'static str {
        "failure"
    }

    async fn handle(&self, client: Arc<Client>, node: Node) {
        client.expect_disconnect();
        let mut parser = node.attrs();
        let reason = parser.optional_u64("reason").unwrap_or(0);
        match reason {
            401 | 403 | 406 => {
                info!(target: "Client", "got {reason} connect failure, logging out");
                client.enable_auto_reconnect.store(false, Ordering::Relaxed);
                client.dispatch_event(&Event::LoggedOut(LoggedOut { on_connect: true }));
            }
            503 => {
                info!(target: "Client", "got 503 connect failure, will auto-reconnect");
                client.reset_expected_disconnect();
            }
            _ => {
                warn!(target: "Client", "unknown connect failure: {node}");
                client.dispatch_event(&Event::StreamError(StreamError {
                    code: reason.to_string(),
                    raw: Some(node.clone()),
                }));
            }
        }
    }
}

/// `<stream:error>`: the server is ending the stream.
pub(super) struct StreamErrorHandler;

#[async_trait]
impl StanzaHandler for StreamErrorHandler {
    fn tag(&self) -> &'static str {
        "stream:error"
    }

    async fn handle(&self, client: Arc<Client>, node: Node) {
        client.is_logged_in.store(false, Ordering::Relaxed);
        client.expect_disconnect();

        let mut parser = node.attrs();
        let code = parser.optional_string("code").unwrap_or("").to_string();
        let conflict_type = node
            .get_optional_child("conflict")
            .and_then(|conflict| {
                conflict
                    .attrs()
                    .optional_string("type")
                    .map(str::to_string)
            })
            .unwrap_or_default();

        match (code.as_str(), conflict_type.as_str()) {
            ("515", _) => {
                info!(target: "Client", "got 515 stream error, reconnecting");
                let client = client.clone();
                tokio::spawn(async move {
                    client.disconnect().await;
                    if let Err(err) = client.connect().await {
                        error!(target: "Client", "failed to reconnect after 515: {err}");
                    }
                });
            }
            ("401", "device_removed") => {
                info!(target: "Client", "device removed, logging out");
                client.enable_auto_reconnect.store(false, Ordering::Relaxed);
                client.dispatch_event(&Event::LoggedOut(LoggedOut { on_connect: false }));
            }
            (_, "replaced") => {
                info!(target: "Client", "stream replaced by another client");
                client.enable_auto_reconnect.store(false, Ordering::Relaxed);
                client.dispatch_event(&Event::StreamReplaced(StreamReplaced));
            }
            ("503", _) => {
                info!(target: "Client", "got 503 stream error, will auto-reconnect");
                client.reset_expected_disconnect();
            }
            _ => {
                error!(target: "Client", "unknown stream error: {node}");
                client.dispatch_event(&Event::StreamError(StreamError {
                    code,
                    raw: Some(node.clone()),
                }));
            }
        }
    }
}

/// Server-initiated `<iq>` stanzas (responses are correlated before they
/// ever reach the queue).
pub(super) struct IqHandler;

#[async_trait]
impl StanzaHandler for IqHandler {
    fn tag(&self) -> &'static str {
        "iq"
    }

    async fn handle(&self, client: Arc<Client>, node: Node) {
        let is_get = node.attrs().optional_string("type") == Some("get");
        if is_get && node.get_optional_child("ping").is_some() {
            debug!(target: "Client", "received ping, sending pong");
            let mut parser = node.attrs();
            let from = parser.jid("from");
            let id = parser.string("id");
            let pong = NodeBuilder::new("iq")
                .attr("to", from)
                .attr("id", id)
                .attr("type", "result")
                .build();
            if let Err(err) = client.send_node(pong).await {
                warn!(target: "Client", "failed to send pong: {err}");
            }
            return;
        }
        debug!(target: "Client", "unhandled iq: {node}");
    }
}
