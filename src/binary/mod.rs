pub mod attrs;
pub mod builder;
pub mod error;
pub mod node;

pub use attrs::AttrParser;
pub use builder::NodeBuilder;
pub use error::BinaryError;
pub use node::{Attrs, Node, NodeContent, NodeValue};

/// The binary codec collaborator. Implementations own the token dictionary
/// and the compression handling of the WhatsApp binary XML format; the
/// session core only moves [`Node`]s through it.
pub trait StanzaCodec: Send + Sync {
    fn marshal(&self, node: &Node) -> error::Result<Vec<u8>>;
    fn unmarshal(&self, data: &[u8]) -> error::Result<Node>;
    /// Strip the frame envelope (decompressing if flagged) from a decrypted
    /// frame payload.
    fn unpack(&self, frame: &[u8]) -> error::Result<Vec<u8>>;
}
