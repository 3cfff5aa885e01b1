use crate::binary::node::{Attrs, Node, NodeValue};
use crate::binary::StanzaCodec;
use crate::config::ClientConfig;
use crate::error::ClientError;
use crate::handlers::{self, StanzaHandler};
use crate::retry::{IncomingRetryKey, RecentMessage, RecentMessageKey, RecentMessageRing};
use crate::store::{DeviceStore, SignalCrypto};
use crate::transport::{FrameSocket, SocketEvent, SocketFactory};
use crate::types::events::{Disconnected, Event};
use crate::types::jid::{Jid, MessageId};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use log::{debug, error, warn};
use rand::RngCore;
use std::cell::Cell;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex, RwLock as StdRwLock};
use tokio::sync::{mpsc, oneshot, Mutex, Notify, RwLock};
use tokio::time::{sleep, sleep_until, Duration, Instant};
use tokio_util::sync::CancellationToken;

/// Buffer size of the channel all inbound stanzas go through. It should
/// never hold more than a few entries; the headroom is what preserves the
/// ordering guarantee under bursts.
const HANDLER_QUEUE_SIZE: usize = 2048;
/// How long the queue consumer waits for a handler before moving on and
/// letting it finish in the background.
const HANDLER_WATCHDOG: Duration = Duration::from_secs(5 * 60);
const SLOW_HANDLER_WARNING: Duration = Duration::from_secs(5);

pub type EventHandler = Box<dyn Fn(&Event) + Send + Sync>;

struct WrappedEventHandler {
    id: u32,
    handler: EventHandler,
}

thread_local! {
    static DISPATCHING: Cell<bool> = const { Cell::new(false) };
}

pub(crate) struct SocketState {
    pub(crate) socket: Option<Arc<dyn FrameSocket>>,
    /// Readiness rendezvous: notified-and-replaced when the session becomes
    /// connected and authenticated. Mutated only under the write lock.
    pub(crate) wait: Arc<Notify>,
}

/// One authenticated session to the WhatsApp web relay: owns the socket,
/// demultiplexes inbound stanzas, correlates requests with responses, fans
/// events out to subscribers and runs the retry protocol.
pub struct Client {
    pub store: Arc<dyn DeviceStore>,
    pub(crate) crypto: Arc<dyn SignalCrypto>,
    pub(crate) codec: Arc<dyn StanzaCodec>,
    pub(crate) socket_factory: Arc<dyn SocketFactory>,
    pub config: ClientConfig,

    pub(crate) socket: RwLock<SocketState>,

    pub(crate) is_logged_in: AtomicBool,
    pub(crate) expected_disconnect: AtomicBool,
    send_active_receipts: AtomicBool,

    pub(crate) enable_auto_reconnect: AtomicBool,
    pub(crate) auto_reconnect_errors: AtomicU32,
    pub(crate) last_successful_connect: StdMutex<Option<DateTime<Utc>>>,

    pub(crate) response_waiters: DashMap<String, oneshot::Sender<Node>>,
    pub(crate) unique_id: String,
    pub(crate) id_counter: AtomicU64,

    event_handlers: StdRwLock<Vec<WrappedEventHandler>>,
    next_handler_id: AtomicU32,

    node_handlers: HashMap<&'static str, Arc<dyn StanzaHandler>>,
    pub(crate) handler_queue_tx: mpsc::Sender<Node>,
    handler_queue_rx: Mutex<Option<mpsc::Receiver<Node>>>,

    pub(crate) message_retries: DashMap<MessageId, u32>,
    pub(crate) incoming_retry_counter: DashMap<IncomingRetryKey, u32>,
    pub(crate) session_recreate_history: DashMap<Jid, DateTime<Utc>>,
    pub(crate) recent_messages_ring: StdMutex<RecentMessageRing>,
    pub(crate) recent_messages_index: DashMap<RecentMessageKey, RecentMessage>,
    pub(crate) pending_phone_rerequests: DashMap<MessageId, CancellationToken>,

    /// Serializes outbound message composition (retries, peer messages)
    /// against anything else that must keep sequence numbers monotonic.
    pub(crate) message_send_lock: Mutex<()>,
}

impl Client {
    pub fn new(
        store: Arc<dyn DeviceStore>,
        crypto: Arc<dyn SignalCrypto>,
        codec: Arc<dyn StanzaCodec>,
        socket_factory: Arc<dyn SocketFactory>,
        config: ClientConfig,
    ) -> Arc<Self> {
        let mut unique_id_bytes = [0u8; 2];
        rand::thread_rng().fill_bytes(&mut unique_id_bytes);
        let (handler_queue_tx, handler_queue_rx) = mpsc::channel(HANDLER_QUEUE_SIZE);
        let enable_auto_reconnect = AtomicBool::new(config.enable_auto_reconnect);

        Arc::new(Self {
            store,
            crypto,
            codec,
            socket_factory,
            config,
            socket: RwLock::new(SocketState {
                socket: None,
                wait: Arc::new(Notify::new()),
            }),
            is_logged_in: AtomicBool::new(false),
            expected_disconnect: AtomicBool::new(false),
            send_active_receipts: AtomicBool::new(false),
            enable_auto_reconnect,
            auto_reconnect_errors: AtomicU32::new(0),
            last_successful_connect: StdMutex::new(None),
            response_waiters: DashMap::new(),
            unique_id: format!("{}.{}", unique_id_bytes[0], unique_id_bytes[1]),
            id_counter: AtomicU64::new(0),
            event_handlers: StdRwLock::new(Vec::new()),
            next_handler_id: AtomicU32::new(1),
            node_handlers: handlers::default_handlers(),
            handler_queue_tx,
            handler_queue_rx: Mutex::new(Some(handler_queue_rx)),
            message_retries: DashMap::new(),
            incoming_retry_counter: DashMap::new(),
            session_recreate_history: DashMap::new(),
            recent_messages_ring: StdMutex::new(RecentMessageRing::new()),
            recent_messages_index: DashMap::new(),
            pending_phone_rerequests: DashMap::new(),
            message_send_lock: Mutex::new(()),
        })
    }

    // --- Connection supervisor ---

    /// Connects to the relay. The socket factory dials and completes the
    /// Noise handshake; authentication is reported by the inbound
    /// `<success>` stanza.
    pub fn connect(
        self: &Arc<Self>,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<(), ClientError>> + Send + '_>>
    {
        Box::pin(async move {
            let mut guard = self.socket.write().await;
            if let Some(socket) = guard.socket.as_ref() {
                if socket.is_connected() {
                    return Err(ClientError::AlreadyConnected);
                }
                self.unlocked_disconnect(&mut guard).await;
            }
            self.reset_expected_disconnect();

            let (socket, events) = self.socket_factory.connect().await?;
            guard.socket = Some(socket.clone());
            drop(guard);

            let cancel = socket.cancellation();
            tokio::spawn(self.clone().socket_event_loop(socket, events));
            tokio::spawn(self.clone().dispatch_loop(cancel.clone()));
            tokio::spawn(self.clone().keepalive_loop(cancel));
            Ok(())
        })
    }

    /// Disconnects from the relay. Does not emit events; `Disconnected` is
    /// reserved for closures initiated by the server or the network.
    pub async fn disconnect(&self) {
        let mut guard = self.socket.write().await;
        self.expect_disconnect();
        self.unlocked_disconnect(&mut guard).await;
    }

    async fn unlocked_disconnect(&self, state: &mut SocketState) {
        if let Some(socket) = state.socket.take() {
            socket.stop(true).await;
            self.is_logged_in.store(false, Ordering::Relaxed);
            self.clear_response_waiters();
        }
    }

    /// Unlinks this device, disconnects and wipes the device store. Store
    /// errors propagate; on failure nothing is deleted locally.
    pub async fn logout(self: &Arc<Self>) -> Result<(), ClientError> {
        let own = self.store.jid().ok_or(ClientError::NotLoggedIn)?;
        self.send_logout_iq(own).await?;
        self.disconnect().await;
        self.store.delete().await?;
        Ok(())
    }

    async fn socket_event_loop(
        self: Arc<Self>,
        socket: Arc<dyn FrameSocket>,
        mut events: mpsc::Receiver<SocketEvent>,
    ) {
        let mut remote = false;
        while let Some(event) = events.recv().await {
            match event {
                SocketEvent::Frame(frame) => self.handle_frame(&frame).await,
                SocketEvent::Disconnected { remote: was_remote } => {
                    remote = was_remote;
                    break;
                }
            }
        }
        self.on_disconnect(socket, remote).await;
    }

    async fn on_disconnect(self: &Arc<Self>, socket: Arc<dyn FrameSocket>, remote: bool) {
        socket.stop(false).await;
        let mut guard = self.socket.write().await;
        let is_current = guard
            .socket
            .as_ref()
            .is_some_and(|current| Arc::ptr_eq(current, &socket));
        if !is_current {
            debug!(target: "Client", "ignoring disconnect of a superseded socket");
            return;
        }
        guard.socket = None;
        self.is_logged_in.store(false, Ordering::Relaxed);
        self.clear_response_waiters();
        drop(guard);

        if !self.is_expected_disconnect() && remote {
            debug!(target: "Client", "emitting Disconnected event");
            let client = self.clone();
            tokio::spawn(async move {
                client.dispatch_event(&Event::Disconnected(Disconnected));
            });
            tokio::spawn(self.clone().auto_reconnect());
        } else if remote {
            debug!(target: "Client", "disconnect was expected, not emitting event");
        } else {
            debug!(target: "Client", "disconnect callback after manual disconnection");
        }
    }

    pub(crate) async fn auto_reconnect(self: Arc<Self>) {
        if !self.enable_auto_reconnect.load(Ordering::Relaxed) || self.store.jid().is_none() {
            return;
        }
        loop {
            let errors = self.auto_reconnect_errors.fetch_add(1, Ordering::SeqCst);
            let delay = reconnect_delay(errors);
            debug!(target: "Client", "automatically reconnecting after {delay:?}");
            sleep(delay).await;
            match self.connect().await {
                Ok(()) => return,
                Err(ClientError::AlreadyConnected) => {
                    debug!(target: "Client", "already connected after autoreconnect sleep");
                    return;
                }
                Err(err) => {
                    error!(target: "Client", "error reconnecting after autoreconnect sleep: {err}");
                    if let Some(hook) = &self.config.auto_reconnect_hook {
                        if !hook(&err) {
                            debug!(target: "Client", "auto-reconnect hook vetoed further attempts");
                            return;
                        }
                    }
                }
            }
        }
    }

    /// Waits until the session is connected and authenticated, or until the
    /// timeout elapses.
    pub async fn wait_for_connection(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            let guard = self.socket.read().await;
            let connected = guard
                .socket
                .as_ref()
                .is_some_and(|socket| socket.is_connected());
            if connected && self.is_logged_in() {
                return true;
            }
            let notify = guard.wait.clone();
            let notified = notify.notified();
            tokio::pin!(notified);
            // Register interest before releasing the lock so a readiness
            // edge between unlock and await is not lost.
            notified.as_mut().enable();
            drop(guard);
            tokio::select! {
                _ = &mut notified => {}
                _ = sleep_until(deadline) => return false,
            }
        }
    }

    /// Wakes everyone blocked in [`Client::wait_for_connection`] and arms a
    /// fresh rendezvous for the next connection cycle.
    pub(crate) async fn signal_socket_ready(&self) {
        let mut guard = self.socket.write().await;
        let old = std::mem::replace(&mut guard.wait, Arc::new(Notify::new()));
        old.notify_waiters();
    }

    pub fn is_connected(&self) -> bool {
        match self.socket.try_read() {
            Ok(guard) => guard
                .socket
                .as_ref()
                .is_some_and(|socket| socket.is_connected()),
            Err(_) => false,
        }
    }

    pub fn is_logged_in(&self) -> bool {
        self.is_logged_in.load(Ordering::Relaxed)
    }

    pub(crate) fn expect_disconnect(&self) {
        self.expected_disconnect.store(true, Ordering::Relaxed);
    }

    pub(crate) fn reset_expected_disconnect(&self) {
        self.expected_disconnect.store(false, Ordering::Relaxed);
    }

    pub(crate) fn is_expected_disconnect(&self) -> bool {
        self.expected_disconnect.load(Ordering::Relaxed)
    }

    /// Whether delivery receipts are sent as "active" (read) receipts.
    /// Toggled by the presence component.
    pub fn send_active_receipts(&self) -> bool {
        self.send_active_receipts.load(Ordering::Relaxed)
    }

    pub fn set_send_active_receipts(&self, active: bool) {
        self.send_active_receipts.store(active, Ordering::Relaxed);
    }

    pub fn own_jid(&self) -> Option<Jid> {
        self.store.jid()
    }

    // --- Stanza router ---

    pub(crate) async fn handle_frame(self: &Arc<Self>, frame: &[u8]) {
        let payload = match self.codec.unpack(frame) {
            Ok(payload) => payload,
            Err(err) => {
                warn!(target: "Client/Recv", "failed to decompress frame: {err}");
                debug!(target: "Client/Recv", "errored frame hex: {}", hex::encode(frame));
                return;
            }
        };
        let node = match self.codec.unmarshal(&payload) {
            Ok(node) => node,
            Err(err) => {
                warn!(target: "Client/Recv", "failed to decode node in frame: {err}");
                debug!(target: "Client/Recv", "errored frame hex: {}", hex::encode(&payload));
                return;
            }
        };
        debug!(target: "Client/Recv", "{node}");
        self.process_node(node).await;
    }

    pub(crate) async fn process_node(self: &Arc<Self>, node: Node) {
        if node.tag == "xmlstreamend" {
            if !self.is_expected_disconnect() {
                warn!(target: "Client", "received stream end frame");
            }
            return;
        }
        let node = match self.receive_response(node) {
            Ok(()) => return,
            Err(node) => node,
        };
        if self.node_handlers.contains_key(node.tag.as_str()) {
            match self.handler_queue_tx.try_send(node) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(node)) => {
                    warn!(target: "Client", "handler queue is full, message ordering is no longer guaranteed");
                    let queue = self.handler_queue_tx.clone();
                    tokio::spawn(async move {
                        if queue.send(node).await.is_err() {
                            warn!(target: "Client", "handler queue closed while draining overflow");
                        }
                    });
                }
                Err(mpsc::error::TrySendError::Closed(node)) => {
                    warn!(target: "Client", "handler queue closed, dropping <{}>", node.tag);
                }
            }
        } else if node.tag != "ack" {
            debug!(target: "Client", "didn't handle node <{}>", node.tag);
        }
    }

    // --- Dispatch queue ---

    pub(crate) async fn dispatch_loop(self: Arc<Self>, cancel: CancellationToken) {
        // On reconnect the previous consumer may still hold the receiver
        // until its own cancellation fires; wait for the handover.
        let mut queue = loop {
            if let Some(queue) = self.handler_queue_rx.lock().await.take() {
                break queue;
            }
            if cancel.is_cancelled() {
                return;
            }
            sleep(Duration::from_millis(10)).await;
        };
        debug!(target: "Client", "starting handler queue loop");
        loop {
            tokio::select! {
                node = queue.recv() => {
                    let Some(node) = node else { break };
                    self.dispatch_node(node).await;
                }
                _ = cancel.cancelled() => {
                    debug!(target: "Client", "closing handler queue loop");
                    break;
                }
            }
        }
        *self.handler_queue_rx.lock().await = Some(queue);
    }

    async fn dispatch_node(self: &Arc<Self>, node: Node) {
        let Some(handler) = self.node_handlers.get(node.tag.as_str()).cloned() else {
            return;
        };
        let descr = match node.attrs.get("id") {
            Some(id) => format!("<{} id={id}>", node.tag),
            None => format!("<{}>", node.tag),
        };
        let client = self.clone();
        let (done_tx, done_rx) = oneshot::channel::<()>();
        let task_descr = descr.clone();
        tokio::spawn(async move {
            let start = Instant::now();
            handler.handle(client, node).await;
            let elapsed = start.elapsed();
            let _ = done_tx.send(());
            if elapsed > SLOW_HANDLER_WARNING {
                warn!(target: "Client", "node handling took {elapsed:?} for {task_descr}");
            }
        });
        tokio::select! {
            _ = done_rx => {}
            _ = sleep(HANDLER_WATCHDOG) => {
                warn!(target: "Client", "node handling is taking long for {descr} - continuing in background");
            }
        }
    }

    // --- Outbound ---

    pub async fn send_node(&self, node: Node) -> Result<(), ClientError> {
        let socket = {
            let guard = self.socket.read().await;
            guard.socket.clone()
        }
        .ok_or(ClientError::NotConnected)?;

        let payload = self.codec.marshal(&node)?;
        debug!(target: "Client/Send", "{node}");
        socket.send_frame(&payload).await.map_err(Into::into)
    }

    /// Acknowledges an inbound stanza, copying the attributes the server
    /// echoes back for correlation.
    pub(crate) async fn send_ack(&self, node: &Node) -> Result<(), ClientError> {
        let mut attrs = Attrs::new();
        attrs.insert("class".into(), NodeValue::String(node.tag.clone()));
        if let Some(id) = node.attrs.get("id") {
            attrs.insert("id".into(), id.clone());
        }
        if let Some(from) = node.attrs.get("from") {
            attrs.insert("to".into(), from.clone());
        }
        if node.tag != "message" {
            if let Some(stanza_type) = node.attrs.get("type") {
                attrs.insert("type".into(), stanza_type.clone());
            }
        }
        for key in ["participant", "recipient"] {
            if let Some(value) = node.attrs.get(key) {
                attrs.insert(key.into(), value.clone());
            }
        }
        self.send_node(Node {
            tag: "ack".into(),
            attrs,
            content: None,
        })
        .await
    }

    // --- Event bus ---

    /// Registers a subscriber for all events. Subscribers run in
    /// registration order; the returned handle removes the subscription.
    pub fn add_event_handler(&self, handler: EventHandler) -> u32 {
        let id = self.next_handler_id.fetch_add(1, Ordering::Relaxed);
        self.event_handlers
            .write()
            .expect("event handler list poisoned")
            .push(WrappedEventHandler { id, handler });
        id
    }

    /// Removes a subscriber. Fails with [`ClientError::ReentrantUnsubscribe`]
    /// when called from inside a subscriber, where it would deadlock against
    /// the dispatch read lock; spawn a task there instead.
    pub fn remove_event_handler(&self, id: u32) -> Result<bool, ClientError> {
        if DISPATCHING.with(|flag| flag.get()) {
            return Err(ClientError::ReentrantUnsubscribe);
        }
        let mut handlers = self
            .event_handlers
            .write()
            .expect("event handler list poisoned");
        let before = handlers.len();
        handlers.retain(|wrapped| wrapped.id != id);
        Ok(handlers.len() < before)
    }

    pub fn remove_event_handlers(&self) -> Result<(), ClientError> {
        if DISPATCHING.with(|flag| flag.get()) {
            return Err(ClientError::ReentrantUnsubscribe);
        }
        self.event_handlers
            .write()
            .expect("event handler list poisoned")
            .clear();
        Ok(())
    }

    /// Invokes every subscriber with `event`. A panicking subscriber is
    /// logged and contained; the remaining subscribers still run.
    pub fn dispatch_event(&self, event: &Event) {
        let handlers = self
            .event_handlers
            .read()
            .expect("event handler list poisoned");
        DISPATCHING.with(|flag| flag.set(true));
        let _reset = scopeguard::guard((), |_| DISPATCHING.with(|flag| flag.set(false)));
        for wrapped in handlers.iter() {
            let result = std::panic::catch_unwind(AssertUnwindSafe(|| (wrapped.handler)(event)));
            if let Err(panic) = result {
                error!(
                    target: "Client",
                    "event handler {} panicked while handling {}: {}\n{}",
                    wrapped.id,
                    event.kind(),
                    panic_message(&panic),
                    std::backtrace::Backtrace::force_capture(),
                );
            }
        }
    }
}

pub(crate) fn reconnect_delay(error_count: u32) -> Duration {
    Duration::from_secs(u64::from(error_count) * 2)
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::TestHarness;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn reconnect_delays_grow_linearly() {
        assert_eq!(reconnect_delay(0), Duration::from_secs(0));
        assert_eq!(reconnect_delay(1), Duration::from_secs(2));
        assert_eq!(reconnect_delay(2), Duration::from_secs(4));
        assert_eq!(reconnect_delay(3), Duration::from_secs(6));
    }

    #[tokio::test]
    async fn event_handlers_run_in_registration_order() {
        let harness = TestHarness::new();
        let order = Arc::new(StdMutex::new(Vec::new()));
        for label in ["first", "second", "third"] {
            let order = order.clone();
            harness.client.add_event_handler(Box::new(move |_| {
                order.lock().unwrap().push(label);
            }));
        }
        harness
            .client
            .dispatch_event(&Event::Connected(crate::types::events::Connected));
        assert_eq!(*order.lock().unwrap(), vec!["first", "second", "third"]);
    }

    #[tokio::test]
    async fn removed_handler_no_longer_fires_and_order_is_preserved() {
        let harness = TestHarness::new();
        let order = Arc::new(StdMutex::new(Vec::new()));
        let mut ids = Vec::new();
        for label in ["a", "b", "c"] {
            let order = order.clone();
            ids.push(harness.client.add_event_handler(Box::new(move |_| {
                order.lock().unwrap().push(label);
            })));
        }
        assert!(harness.client.remove_event_handler(ids[1]).unwrap());
        assert!(!harness.client.remove_event_handler(ids[1]).unwrap());
        harness
            .client
            .dispatch_event(&Event::Connected(crate::types::events::Connected));
        assert_eq!(*order.lock().unwrap(), vec!["a", "c"]);
    }

    #[tokio::test]
    async fn panicking_handler_does_not_affect_other_subscribers() {
        let _ = env_logger::builder().is_test(true).try_init();
        let harness = TestHarness::new();
        let calls = Arc::new(AtomicUsize::new(0));

        harness.client.add_event_handler(Box::new(|_| {
            panic!("subscriber exploded");
        }));
        let calls_clone = calls.clone();
        harness.client.add_event_handler(Box::new(move |_| {
            calls_clone.fetch_add(1, Ordering::SeqCst);
        }));

        harness
            .client
            .dispatch_event(&Event::Connected(crate::types::events::Connected));
        harness
            .client
            .dispatch_event(&Event::Connected(crate::types::events::Connected));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn queue_overflow_degrades_to_detached_pushes_without_loss() {
        let _ = env_logger::builder().is_test(true).try_init();
        let harness = TestHarness::new();
        let client = &harness.client;
        let total = HANDLER_QUEUE_SIZE + 5;

        let received = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let sink = received.clone();
        client.add_event_handler(Box::new(move |event| {
            if matches!(event, Event::Receipt(_)) {
                sink.fetch_add(1, Ordering::SeqCst);
            }
        }));

        // No consumer is running yet, so the queue saturates at capacity
        // and the last pushes go through the detached overflow path.
        for i in 0..total {
            let node = crate::binary::NodeBuilder::new("receipt")
                .attr("from", "5511922223333@s.whatsapp.net")
                .attr("id", format!("OVF{i}"))
                .attr("type", "read")
                .build();
            client.process_node(node).await;
        }

        // Starting the connection brings the consumer up; every stanza is
        // eventually delivered despite the saturation.
        harness.client.connect().await.unwrap();
        for _ in 0..500 {
            if received.load(Ordering::SeqCst) == total {
                break;
            }
            sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(received.load(Ordering::SeqCst), total);
    }

    #[tokio::test]
    async fn removing_a_handler_from_inside_a_handler_errors() {
        let harness = TestHarness::new();
        let client = harness.client.clone();
        let result = Arc::new(StdMutex::new(None));
        let result_clone = result.clone();
        let id = harness.client.add_event_handler(Box::new(move |_| {
            *result_clone.lock().unwrap() = Some(client.remove_event_handler(1).is_err());
        }));
        harness
            .client
            .dispatch_event(&Event::Connected(crate::types::events::Connected));
        assert_eq!(*result.lock().unwrap(), Some(true));
        assert!(harness.client.remove_event_handler(id).unwrap());
    }
}
