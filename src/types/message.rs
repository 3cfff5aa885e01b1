use crate::types::jid::{Jid, MessageId};
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Where a stanza came from and who it addresses.
#[derive(Debug, Clone, Default, Serialize)]
pub struct MessageSource {
    /// The chat the message was sent to (user JID for DMs, group JID for
    /// groups, `status@broadcast` for statuses).
    pub chat: Jid,
    /// The device that sent the message.
    pub sender: Jid,
    pub is_from_me: bool,
    pub is_group: bool,
    /// For messages sent to our own chat from another device, the other
    /// side of the conversation.
    pub recipient: Option<Jid>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct MessageInfo {
    pub source: MessageSource,
    pub id: MessageId,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ReceiptType {
    Delivered,
    Retry,
    Read,
    ReadSelf,
    Played,
    Sender,
    Inactive,
    PeerMsg,
    Other,
}

impl From<&str> for ReceiptType {
    fn from(value: &str) -> Self {
        match value {
            "" | "delivery" => ReceiptType::Delivered,
            "retry" => ReceiptType::Retry,
            "read" => ReceiptType::Read,
            "read-self" => ReceiptType::ReadSelf,
            "played" => ReceiptType::Played,
            "sender" => ReceiptType::Sender,
            "inactive" => ReceiptType::Inactive,
            "peer_msg" => ReceiptType::PeerMsg,
            _ => ReceiptType::Other,
        }
    }
}

/// A delivery/read/retry acknowledgement for one or more messages.
#[derive(Debug, Clone, Serialize)]
pub struct Receipt {
    pub source: MessageSource,
    pub message_ids: Vec<MessageId>,
    pub timestamp: DateTime<Utc>,
    pub receipt_type: ReceiptType,
}
