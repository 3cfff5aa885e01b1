use crate::binary::node::{Node, NodeContent};
use crate::binary::NodeBuilder;
use crate::client::Client;
use crate::error::ClientError;
use crate::request::{InfoQuery, InfoQueryType};
use crate::store::{PreKey, PreKeyBundle};
use crate::types::jid::{Jid, SERVER_JID};
use log::warn;
use std::collections::HashMap;

impl Client {
    /// Fetches fresh prekey bundles for the given devices from the server.
    pub(crate) async fn fetch_prekeys(
        &self,
        jids: &[Jid],
    ) -> Result<HashMap<Jid, PreKeyBundle>, ClientError> {
        let user_nodes: Vec<Node> = jids
            .iter()
            .map(|jid| NodeBuilder::new("user").attr("jid", jid.clone()).build())
            .collect();
        let response = self
            .send_iq(InfoQuery {
                namespace: "encrypt",
                query_type: InfoQueryType::Get,
                to: Jid::new("", SERVER_JID),
                target: None,
                id: None,
                content: Some(NodeContent::Nodes(vec![NodeBuilder::new("key")
                    .children(user_nodes)
                    .build()])),
                timeout: None,
            })
            .await?;

        let list = response
            .get_optional_child("list")
            .ok_or(ClientError::ElementMissing {
                tag: "list",
                context: "prekey fetch response",
            })?;

        let mut bundles = HashMap::new();
        for user in list.get_children_by_tag("user") {
            let Some(jid) = user.attrs().optional_jid("jid") else {
                warn!(target: "Client", "prekey response user entry without jid");
                continue;
            };
            match node_to_prekey_bundle(jid.device as u32, user) {
                Ok(bundle) => {
                    bundles.insert(jid, bundle);
                }
                Err(err) => {
                    warn!(target: "Client", "failed to parse prekey bundle for {jid}: {err}");
                }
            }
        }
        Ok(bundles)
    }
}

/// Parses a prekey bundle out of a node carrying `registration`,
/// `identity`, optional `key` and `skey` children, either directly or
/// under a `keys` child (the retry-receipt shape).
pub(crate) fn node_to_prekey_bundle(
    device_id: u32,
    node: &Node,
) -> Result<PreKeyBundle, ClientError> {
    let registration_id = node
        .get_optional_child("registration")
        .and_then(Node::bytes_content)
        .and_then(registration_id_from_bytes)
        .ok_or(ClientError::ElementMissing {
            tag: "registration",
            context: "prekey bundle",
        })?;

    let keys_node = node.get_optional_child("keys").unwrap_or(node);

    let identity_key = keys_node
        .get_optional_child("identity")
        .and_then(Node::bytes_content)
        .and_then(|bytes| <[u8; 32]>::try_from(bytes).ok())
        .ok_or(ClientError::ElementMissing {
            tag: "identity",
            context: "prekey bundle",
        })?;

    let pre_key = keys_node
        .get_optional_child("key")
        .map(parse_prekey_node)
        .transpose()?;

    let signed = keys_node
        .get_optional_child("skey")
        .ok_or(ClientError::ElementMissing {
            tag: "skey",
            context: "prekey bundle",
        })
        .and_then(parse_prekey_node)?;
    let signature = signed
        .signature
        .clone()
        .ok_or(ClientError::ElementMissing {
            tag: "signature",
            context: "signed prekey",
        })?;

    Ok(PreKeyBundle {
        registration_id,
        device_id,
        identity_key,
        pre_key: pre_key.map(|key| (key.key_id, key.public_key)),
        signed_pre_key_id: signed.key_id,
        signed_pre_key: signed.public_key,
        signed_pre_key_signature: signature,
    })
}

/// Registration ids are 4-byte big-endian, but some clients trim leading
/// zero bytes.
fn registration_id_from_bytes(bytes: &[u8]) -> Option<u32> {
    match bytes.len() {
        0 => None,
        len if len >= 4 => Some(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])),
        len => {
            let mut padded = [0u8; 4];
            padded[4 - len..].copy_from_slice(bytes);
            Some(u32::from_be_bytes(padded))
        }
    }
}

/// Parses a `<key>`/`<skey>` node: 3-byte big-endian `id`, 32-byte
/// `value`, optional `signature`.
fn parse_prekey_node(node: &Node) -> Result<PreKey, ClientError> {
    let id_bytes = node
        .get_optional_child("id")
        .and_then(Node::bytes_content)
        .filter(|bytes| bytes.len() == 3)
        .ok_or(ClientError::ElementMissing {
            tag: "id",
            context: "prekey node",
        })?;
    let key_id = u32::from_be_bytes([0, id_bytes[0], id_bytes[1], id_bytes[2]]);

    let public_key = node
        .get_optional_child("value")
        .and_then(Node::bytes_content)
        .and_then(|bytes| <[u8; 32]>::try_from(bytes).ok())
        .ok_or(ClientError::ElementMissing {
            tag: "value",
            context: "prekey node",
        })?;

    let signature = node
        .get_optional_child("signature")
        .and_then(Node::bytes_content)
        .map(|bytes| bytes.to_vec());

    Ok(PreKey {
        key_id,
        public_key,
        signature,
    })
}

/// Renders a prekey as a `<key>` node, or `<skey>` when signed.
pub(crate) fn prekey_to_node(key: &PreKey) -> Node {
    let tag = if key.signature.is_some() {
        "skey"
    } else {
        "key"
    };
    let mut children = vec![
        NodeBuilder::new("id")
            .bytes(key.key_id.to_be_bytes()[1..].to_vec())
            .build(),
        NodeBuilder::new("value")
            .bytes(key.public_key.to_vec())
            .build(),
    ];
    if let Some(signature) = &key.signature {
        children.push(NodeBuilder::new("signature").bytes(signature.clone()).build());
    }
    NodeBuilder::new(tag).children(children).build()
}
