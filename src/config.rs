use crate::error::ClientError;
use crate::proto;
use crate::types::jid::{Jid, MessageId};
use crate::types::message::Receipt;
use std::time::Duration;

/// Called before a retry receipt is accepted. Returning false cancels the
/// resend and the receipt is ignored.
pub type PreRetryCallback =
    dyn Fn(&Receipt, &MessageId, u32, &proto::Message) -> bool + Send + Sync;

/// Called before pairing completes with `(jid, platform, business name)`.
/// Returning false cancels the pairing and disconnects.
pub type PrePairCallback = dyn Fn(&Jid, &str, &str) -> bool + Send + Sync;

/// External plaintext source for retry receipts whose message fell out of
/// the recent-message cache. Arguments are `(requester, chat, message id)`.
pub type GetMessageForRetry =
    dyn Fn(&Jid, &Jid, &MessageId) -> Option<proto::Message> + Send + Sync;

/// Called when an auto-reconnect attempt fails. Returning false stops the
/// reconnect loop.
pub type AutoReconnectHook = dyn Fn(&ClientError) -> bool + Send + Sync;

/// Behavior toggles and hooks recognized by the client.
pub struct ClientConfig {
    /// Attempt reconnection after a remote disconnect.
    pub enable_auto_reconnect: bool,
    /// Surface app-state events during the initial bulk sync.
    pub emit_app_state_events_on_full_sync: bool,
    /// On the first inbound retry for a message, schedule a delayed
    /// rerequest from the primary device.
    pub automatic_message_rerequest_from_phone: bool,
    /// Drop the stored identity on untrusted-identity errors and continue.
    pub auto_trust_identity: bool,
    /// Skip our own devices for broadcast/status sends.
    pub dont_send_self_broadcast: bool,
    /// Fail presence subscription when no privacy token is stored.
    pub error_on_subscribe_presence_without_token: bool,
    /// How long to wait for the sender to resend before escalating to the
    /// primary device.
    pub request_from_phone_delay: Duration,
    pub pre_retry_callback: Option<Box<PreRetryCallback>>,
    pub pre_pair_callback: Option<Box<PrePairCallback>>,
    pub get_message_for_retry: Option<Box<GetMessageForRetry>>,
    pub auto_reconnect_hook: Option<Box<AutoReconnectHook>>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            enable_auto_reconnect: true,
            emit_app_state_events_on_full_sync: false,
            automatic_message_rerequest_from_phone: false,
            auto_trust_identity: true,
            dont_send_self_broadcast: true,
            error_on_subscribe_presence_without_token: false,
            request_from_phone_delay: Duration::from_secs(5),
            pre_retry_callback: None,
            pre_pair_callback: None,
            get_message_for_retry: None,
            auto_reconnect_hook: None,
        }
    }
}
