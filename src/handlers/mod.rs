mod basic;
mod message;
mod receipt;
mod traits;

pub use traits::StanzaHandler;

use crate::call::CallHandler;
use std::collections::HashMap;
use std::sync::Arc;

/// The tag-indexed handler registry for inbound stanzas.
pub(crate) fn default_handlers() -> HashMap<&'static str, Arc<dyn StanzaHandler>> {
    let handlers: Vec<Arc<dyn StanzaHandler>> = vec![
        Arc::new(message::MessageHandler),
        Arc::new(receipt::ReceiptHandler),
        Arc::new(CallHandler),
        Arc::new(basic::SuccessHandler),
        Arc::new(basic::FailureHandler),
        Arc::new(basic::StreamErrorHandler),
        Arc::new(basic::IqHandler),
    ];
    handlers
        .into_iter()
        .map(|handler| (handler.tag(), handler))
        .collect()
}
