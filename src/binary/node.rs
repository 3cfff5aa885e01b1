use crate::binary::attrs::AttrParser;
use crate::types::jid::Jid;
use indexmap::IndexMap;
use std::fmt;

pub type Attrs = IndexMap<String, NodeValue>;

/// A typed stanza attribute value. The binary codec preserves the scalar
/// type of decoded attributes (JID tokens stay JIDs, numbers stay numbers)
/// so that re-marshaling a copied attribute is lossless.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeValue {
    String(String),
    Int(i64),
    UInt(u64),
    Bool(bool),
    Jid(Jid),
}

impl NodeValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            NodeValue::String(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn as_jid(&self) -> Option<&Jid> {
        match self {
            NodeValue::Jid(j) => Some(j),
            _ => None,
        }
    }
}

impl fmt::Display for NodeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeValue::String(s) => write!(f, "{s}"),
            NodeValue::Int(i) => write!(f, "{i}"),
            NodeValue::UInt(u) => write!(f, "{u}"),
            NodeValue::Bool(b) => write!(f, "{b}"),
            NodeValue::Jid(j) => write!(f, "{j}"),
        }
    }
}

impl From<&str> for NodeValue {
    fn from(s: &str) -> Self {
        NodeValue::String(s.to_string())
    }
}

impl From<String> for NodeValue {
    fn from(s: String) -> Self {
        NodeValue::String(s)
    }
}

impl From<i64> for NodeValue {
    fn from(i: i64) -> Self {
        NodeValue::Int(i)
    }
}

impl From<u64> for NodeValue {
    fn from(u: u64) -> Self {
        NodeValue::UInt(u)
    }
}

impl From<u32> for NodeValue {
    fn from(u: u32) -> Self {
        NodeValue::UInt(u as u64)
    }
}

impl From<bool> for NodeValue {
    fn from(b: bool) -> Self {
        NodeValue::Bool(b)
    }
}

impl From<Jid> for NodeValue {
    fn from(j: Jid) -> Self {
        NodeValue::Jid(j)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodeContent {
    Bytes(Vec<u8>),
    Nodes(Vec<Node>),
}

/// One structured unit on the protocol stream, shaped like an XML element.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Node {
    pub tag: String,
    pub attrs: Attrs,
    pub content: Option<NodeContent>,
}

impl Node {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            ..Default::default()
        }
    }

    /// Error-accumulating typed attribute access.
    pub fn attrs(&self) -> AttrParser<'_> {
        AttrParser::new(self)
    }

    pub fn children(&self) -> Option<&[Node]> {
        match &self.content {
            Some(NodeContent::Nodes(nodes)) => Some(nodes),
            _ => None,
        }
    }

    pub fn get_optional_child(&self, tag: &str) -> Option<&Node> {
        self.children()
            .and_then(|nodes| nodes.iter().find(|node| node.tag == tag))
    }

    pub fn get_children_by_tag(&self, tag: &str) -> Vec<&Node> {
        self.children()
            .map(|nodes| nodes.iter().filter(|c| c.tag == tag).collect())
            .unwrap_or_default()
    }

    pub fn bytes_content(&self) -> Option<&[u8]> {
        match &self.content {
            Some(NodeContent::Bytes(b)) => Some(b.as_slice()),
            _ => None,
        }
    }
}

// XML-ish rendering for logs only; the wire format is the binary codec's.
impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{}", self.tag)?;
        for (key, value) in &self.attrs {
            write!(f, " {key}=\"{value}\"")?;
        }
        match &self.content {
            None => write!(f, "/>"),
            Some(NodeContent::Bytes(bytes)) => {
                if bytes.len() <= 64 {
                    write!(f, ">{}</{}>", hex::encode(bytes), self.tag)
                } else {
                    write!(f, "><!-- {} bytes --></{}>", bytes.len(), self.tag)
                }
            }
            Some(NodeContent::Nodes(children)) => {
                write!(f, ">")?;
                for child in children {
                    write!(f, "{child}")?;
                }
                write!(f, "</{}>", self.tag)
            }
        }
    }
}
