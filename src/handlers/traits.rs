use crate::binary::node::Node;
use crate::client::Client;
use async_trait::async_trait;
use std::sync::Arc;

/// A per-tag stanza handler. Handlers are looked up by tag by the dispatch
/// queue consumer and each invocation runs in its own task.
#[async_trait]
pub trait StanzaHandler: Send + Sync {
    fn tag(&self) -> &'static str;
    async fn handle(&self, client: Arc<Client>, node: Node);
}
