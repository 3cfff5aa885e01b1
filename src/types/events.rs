use crate::binary::node::Node;
use crate::proto;
use crate::types::call::{BasicCallMeta, CallRemoteMeta};
use crate::types::jid::Jid;
use crate::types::message::{MessageInfo, Receipt};

/// Everything the session core can surface to subscribers. Dispatched as a
/// tagged union; subscribers match on the variants they care about.
#[derive(Debug, Clone)]
pub enum Event {
    /// Handshake and authentication completed.
    Connected(Connected),
    /// The server closed the connection unexpectedly.
    Disconnected(Disconnected),
    /// The device was unlinked, either remotely or during connect.
    LoggedOut(LoggedOut),
    /// Another client took over this device's stream.
    StreamReplaced(StreamReplaced),
    /// A stream error the supervisor did not recognize.
    StreamError(StreamError),
    /// A decrypted incoming message.
    Message(Box<MessageEvent>),
    Receipt(Receipt),
    /// A peer's Signal identity changed and was dropped from the store.
    IdentityChange(IdentityChange),
    CallOffer(CallOffer),
    CallOfferNotice(CallOfferNotice),
    CallRelayLatency(CallRelayLatency),
    CallAccept(CallAccept),
    CallPreAccept(CallPreAccept),
    CallTransport(CallTransport),
    CallTerminate(CallTerminate),
    /// A `<call>` stanza whose shape or child tag was not recognized.
    UnknownCallEvent(UnknownCallEvent),
}

impl Event {
    /// Short variant name for log lines.
    pub fn kind(&self) -> &'static str {
        match self {
            Event::Connected(_) => "Connected",
            Event::Disconnected(_) => "Disconnected",
            Event::LoggedOut(_) => "LoggedOut",
            Event::StreamReplaced(_) => "StreamReplaced",
            Event::StreamError(_) => "StreamError",
            Event::Message(_) => "Message",
            Event::Receipt(_) => "Receipt",
            Event::IdentityChange(_) => "IdentityChange",
            Event::CallOffer(_) => "CallOffer",
            Event::CallOfferNotice(_) => "CallOfferNotice",
            Event::CallRelayLatency(_) => "CallRelayLatency",
            Event::CallAccept(_) => "CallAccept",
            Event::CallPreAccept(_) => "CallPreAccept",
            Event::CallTransport(_) => "CallTransport",
            Event::CallTerminate(_) => "CallTerminate",
            Event::UnknownCallEvent(_) => "UnknownCallEvent",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Connected;

#[derive(Debug, Clone)]
pub struct Disconnected;

#[derive(Debug, Clone)]
pub struct LoggedOut {
    /// True when the logout was reported during connect rather than on a
    /// live stream.
    pub on_connect: bool,
}

#[derive(Debug, Clone)]
pub struct StreamReplaced;

#[derive(Debug, Clone)]
pub struct StreamError {
    pub code: String,
    pub raw: Option<Node>,
}

#[derive(Debug, Clone)]
pub struct MessageEvent {
    pub info: MessageInfo,
    pub message: proto::Message,
}

#[derive(Debug, Clone)]
pub struct IdentityChange {
    pub jid: Jid,
    /// Set when the change was detected (and the old identity dropped)
    /// while decrypting, rather than announced by a notification.
    pub implicit: bool,
}

#[derive(Debug, Clone)]
pub struct CallOffer {
    pub meta: BasicCallMeta,
    pub remote: CallRemoteMeta,
    pub data: Node,
}

#[derive(Debug, Clone)]
pub struct CallOfferNotice {
    pub meta: BasicCallMeta,
    pub media: String,
    pub call_type: String,
    pub data: Node,
}

#[derive(Debug, Clone)]
pub struct CallRelayLatency {
    pub meta: BasicCallMeta,
    pub data: Node,
}

#[derive(Debug, Clone)]
pub struct CallAccept {
    pub meta: BasicCallMeta,
    pub remote: CallRemoteMeta,
    pub data: Node,
}

#[derive(Debug, Clone)]
pub struct CallPreAccept {
    pub meta: BasicCallMeta,
    pub remote: CallRemoteMeta,
    pub data: Node,
}

#[derive(Debug, Clone)]
pub struct CallTransport {
    pub meta: BasicCallMeta,
    pub remote: CallRemoteMeta,
    pub data: Node,
}

#[derive(Debug, Clone)]
pub struct CallTerminate {
    pub meta: BasicCallMeta,
    pub reason: String,
    pub data: Node,
}

#[derive(Debug, Clone)]
pub struct UnknownCallEvent {
    pub node: Node,
}
