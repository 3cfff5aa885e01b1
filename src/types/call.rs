use crate::types::jid::Jid;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Metadata shared by every call-signaling stanza: the outer `from`/`t`
/// attributes plus the `call-creator`/`call-id` of the single child.
#[derive(Debug, Clone, Serialize)]
pub struct BasicCallMeta {
    pub from: Jid,
    pub timestamp: DateTime<Utc>,
    pub call_creator: Jid,
    pub call_id: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct CallRemoteMeta {
    pub remote_platform: String,
    pub remote_version: String,
}
