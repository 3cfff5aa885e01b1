use crate::binary::node::{Node, NodeContent, NodeValue};
use crate::binary::{AttrParser, NodeBuilder};
use crate::client::Client;
use crate::error::ClientError;
use crate::transport::TransportError;
use crate::types::jid::{Jid, MessageId, SERVER_JID};
use log::warn;
use rand::RngCore;
use sha2::{Digest, Sha256};
use std::sync::atomic::Ordering;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use thiserror::Error;
use tokio::sync::oneshot;
use tokio::time::timeout;

const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(75);

/// Sentinel delivered to every pending waiter when the stream ends.
pub(crate) fn xml_stream_end_node() -> Node {
    Node::new("xmlstreamend")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InfoQueryType {
    Get,
    Set,
}

impl InfoQueryType {
    fn as_str(self) -> &'static str {
        match self {
            InfoQueryType::Get => "get",
            InfoQueryType::Set => "set",
        }
    }
}

#[derive(Debug, Clone)]
pub struct InfoQuery<'a> {
    pub namespace: &'a str,
    pub query_type: InfoQueryType,
    pub to: Jid,
    pub target: Option<Jid>,
    pub id: Option<String>,
    pub content: Option<NodeContent>,
    pub timeout: Option<Duration>,
}

#[derive(Debug, Error)]
pub enum IqError {
    #[error("info query timed out")]
    Timeout,
    #[error("client is not connected")]
    NotConnected,
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("stream ended while waiting for response")]
    Disconnected(Node),
    #[error("server returned error {code}: {text}")]
    ServerError { code: u16, text: String },
    #[error("response channel closed unexpectedly")]
    InternalChannelClosed,
}

impl Client {
    pub fn generate_request_id(&self) -> String {
        let count = self.id_counter.fetch_add(1, Ordering::Relaxed);
        format!("{}-{}", self.unique_id, count)
    }

    /// Generates a message ID in the `3EB0`-prefixed format other devices
    /// expect for chat messages.
    pub fn generate_message_id(&self) -> MessageId {
        let mut data = Vec::with_capacity(8 + 32 + 16);
        let unix = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        data.extend_from_slice(&unix.to_be_bytes());
        if let Some(own) = self.store.jid() {
            data.extend_from_slice(own.user.as_bytes());
            data.extend_from_slice(b"@c.us");
        }
        let mut random_bytes = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut random_bytes);
        data.extend_from_slice(&random_bytes);

        let hash = Sha256::digest(&data);
        format!("3EB0{}", hex::encode_upper(&hash[..9]))
    }

    /// Registers a one-shot waiter for the response with the given stanza
    /// id. At most one waiter may exist per id.
    pub(crate) fn wait_response(&self, id: String) -> oneshot::Receiver<Node> {
        let (tx, rx) = oneshot::channel();
        self.response_waiters.insert(id, tx);
        rx
    }

    pub(crate) fn cancel_response(&self, id: &str) {
        self.response_waiters.remove(id);
    }

    /// Attempts request/response correlation. Consumes the waiter and
    /// returns `Ok` when the stanza's id names one; hands the stanza back
    /// otherwise.
    pub(crate) fn receive_response(&self, node: Node) -> Result<(), Node> {
        let id = match node.attrs.get("id").map(NodeValue::to_string) {
            Some(id) => id,
            None => return Err(node),
        };
        match self.response_waiters.remove(&id) {
            Some((_, waiter)) => {
                if waiter.send(node).is_err() {
                    warn!(target: "Client", "response waiter for {id} was dropped before delivery");
                }
                Ok(())
            }
            None => Err(node),
        }
    }

    /// Completes every pending waiter with the end-of-stream sentinel and
    /// drops all entries. Called on disconnect under the socket write lock.
    pub(crate) fn clear_response_waiters(&self) {
        let ids: Vec<String> = self
            .response_waiters
            .iter()
            .map(|entry| entry.key().clone())
            .collect();
        for id in ids {
            if let Some((_, waiter)) = self.response_waiters.remove(&id) {
                let _ = waiter.send(xml_stream_end_node());
            }
        }
    }

    /// Sends an info query and waits for the correlated response.
    pub async fn send_iq(&self, query: InfoQuery<'_>) -> Result<Node, IqError> {
        let request_id = query.id.unwrap_or_else(|| self.generate_request_id());
        let rx = self.wait_response(request_id.clone());

        let mut builder = NodeBuilder::new("iq")
            .attr("id", request_id.clone())
            .attr("xmlns", query.namespace)
            .attr("type", query.query_type.as_str())
            .attr("to", query.to);
        if let Some(target) = query.target {
            if !target.is_empty() {
                builder = builder.attr("target", target);
            }
        }
        let mut node = builder.build();
        node.content = query.content;

        if let Err(err) = self.send_node(node).await {
            self.cancel_response(&request_id);
            return Err(match err {
                ClientError::NotConnected => IqError::NotConnected,
                ClientError::Transport(transport) => IqError::Transport(transport),
                other => IqError::Transport(TransportError::Send(other.to_string())),
            });
        }

        let deadline = query.timeout.unwrap_or(DEFAULT_REQUEST_TIMEOUT);
        match timeout(deadline, rx).await {
            Ok(Ok(response)) => {
                if response.tag == "xmlstreamend" || response.tag == "stream:error" {
                    return Err(IqError::Disconnected(response));
                }
                if response.attrs.get("type").map(NodeValue::to_string).as_deref() == Some("error")
                {
                    return Err(parse_iq_error(&response));
                }
                Ok(response)
            }
            Ok(Err(_)) => Err(IqError::InternalChannelClosed),
            Err(_) => {
                self.cancel_response(&request_id);
                Err(IqError::Timeout)
            }
        }
    }

    pub(crate) async fn send_logout_iq(&self, own: Jid) -> Result<(), IqError> {
        self.send_iq(InfoQuery {
            namespace: "md",
            query_type: InfoQueryType::Set,
            to: Jid::new("", SERVER_JID),
            target: None,
            id: None,
            content: Some(NodeContent::Nodes(vec![NodeBuilder::new(
                "remove-companion-device",
            )
            .attr("jid", own)
            .attr("reason", "user_initiated")
            .build()])),
            timeout: None,
        })
        .await?;
        Ok(())
    }
}

fn parse_iq_error(response: &Node) -> IqError {
    if let Some(error_node) = response.get_optional_child("error") {
        let mut parser = AttrParser::new(error_node);
        let code = parser.optional_u64("code").unwrap_or(0) as u16;
        let text = parser.optional_string("text").unwrap_or("").to_string();
        IqError::ServerError { code, text }
    } else {
        IqError::ServerError {
            code: 0,
            text: "malformed error response".to_string(),
        }
    }
}
