use crate::binary::node::NodeContent;
use crate::binary::NodeBuilder;
use crate::client::Client;
use crate::request::{InfoQuery, InfoQueryType, IqError};
use crate::types::jid::{Jid, SERVER_JID};
use chrono::Utc;
use log::{debug, info, warn};
use rand::Rng;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const KEEP_ALIVE_INTERVAL_MIN: Duration = Duration::from_secs(20);
const KEEP_ALIVE_INTERVAL_MAX: Duration = Duration::from_secs(30);
const KEEP_ALIVE_RESPONSE_DEADLINE: Duration = Duration::from_secs(20);
/// With auto-reconnect on, force a fresh connection once pings have been
/// failing this long.
const KEEP_ALIVE_MAX_FAIL_SECS: i64 = 180;

impl Client {
    /// One ping/pong round trip. Returns false when the connection looks
    /// dead.
    async fn send_keepalive(&self) -> bool {
        if !self.is_connected() {
            return false;
        }
        debug!(target: "Client/Keepalive", "sending keepalive ping");
        let query = InfoQuery {
            namespace: "w:p",
            query_type: InfoQueryType::Get,
            to: Jid::new("", SERVER_JID),
            target: None,
            id: None,
            content: Some(NodeContent::Nodes(vec![NodeBuilder::new("ping").build()])),
            timeout: Some(KEEP_ALIVE_RESPONSE_DEADLINE),
        };
        match self.send_iq(query).await {
            Ok(_) => {
                debug!(target: "Client/Keepalive", "received keepalive pong");
                true
            }
            Err(err) => {
                warn!(target: "Client/Keepalive", "keepalive ping failed: {err}");
                !matches!(
                    err,
                    IqError::Transport(_) | IqError::Disconnected(_) | IqError::NotConnected
                )
            }
        }
    }

    pub(crate) async fn keepalive_loop(self: Arc<Self>, cancel: CancellationToken) {
        let mut last_success = Utc::now();
        let mut error_count = 0u32;
        loop {
            let interval_ms = rand::thread_rng().gen_range(
                KEEP_ALIVE_INTERVAL_MIN.as_millis()..=KEEP_ALIVE_INTERVAL_MAX.as_millis(),
            ) as u64;
            tokio::select! {
                _ = tokio::time::sleep(Duration::from_millis(interval_ms)) => {
                    if !self.is_connected() {
                        debug!(target: "Client/Keepalive", "not connected, exiting keepalive loop");
                        return;
                    }
                    if self.send_keepalive().await {
                        if error_count > 0 {
                            info!(target: "Client/Keepalive", "keepalive restored");
                        }
                        error_count = 0;
                        last_success = Utc::now();
                    } else {
                        error_count += 1;
                        warn!(target: "Client/Keepalive", "keepalive timeout, error count: {error_count}");
                        let failing_for = Utc::now().signed_duration_since(last_success);
                        if self.enable_auto_reconnect.load(Ordering::Relaxed)
                            && failing_for.num_seconds() > KEEP_ALIVE_MAX_FAIL_SECS
                        {
                            warn!(
                                target: "Client/Keepalive",
                                "forcing reconnect after {KEEP_ALIVE_MAX_FAIL_SECS}s of keepalive failures"
                            );
                            let client = self.clone();
                            tokio::spawn(async move {
                                client.disconnect().await;
                                client.auto_reconnect().await;
                            });
                            return;
                        }
                    }
                }
                _ = cancel.cancelled() => {
                    debug!(target: "Client/Keepalive", "socket closed, exiting keepalive loop");
                    return;
                }
            }
        }
    }
}
