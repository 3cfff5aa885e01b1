use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

pub const DEFAULT_USER_SERVER: &str = "s.whatsapp.net";
pub const GROUP_SERVER: &str = "g.us";
pub const LEGACY_USER_SERVER: &str = "c.us";
pub const BROADCAST_SERVER: &str = "broadcast";
pub const HIDDEN_USER_SERVER: &str = "lid";
pub const NEWSLETTER_SERVER: &str = "newsletter";
pub const STATUS_BROADCAST_USER: &str = "status";

/// The server JID, used as the `to` of info queries.
pub const SERVER_JID: &str = "s.whatsapp.net";

pub type MessageId = String;

#[derive(Debug, Error)]
pub enum JidError {
    #[error("invalid JID format: {0}")]
    InvalidFormat(String),
}

/// A WhatsApp identity: `(user, agent, device, server)`.
///
/// Companion devices carry a nonzero `device`; the agent byte distinguishes
/// hosted/interop identities. A JID with only a server addresses the server
/// itself.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Jid {
    pub user: String,
    pub agent: u8,
    pub device: u16,
    pub server: String,
}

impl Jid {
    pub fn new(user: impl Into<String>, server: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            server: server.into(),
            agent: 0,
            device: 0,
        }
    }

    /// Projection that drops the agent and device, keeping user identity.
    pub fn to_non_ad(&self) -> Jid {
        Jid::new(self.user.clone(), self.server.clone())
    }

    pub fn is_empty(&self) -> bool {
        self.server.is_empty()
    }

    pub fn is_ad(&self) -> bool {
        self.device > 0
            && (self.server == DEFAULT_USER_SERVER || self.server == HIDDEN_USER_SERVER)
    }

    pub fn is_group(&self) -> bool {
        self.server == GROUP_SERVER
    }

    pub fn is_broadcast_list(&self) -> bool {
        self.server == BROADCAST_SERVER && self.user != STATUS_BROADCAST_USER
    }

    pub fn is_status_broadcast(&self) -> bool {
        self.server == BROADCAST_SERVER && self.user == STATUS_BROADCAST_USER
    }

    pub fn is_newsletter(&self) -> bool {
        self.server == NEWSLETTER_SERVER
    }

    pub fn is_same_user_as(&self, other: &Jid) -> bool {
        self.user == other.user
    }

    /// The Signal protocol address this JID encrypts under.
    pub fn signal_address(&self) -> SignalAddress {
        let name = if self.agent == 0 {
            self.user.clone()
        } else {
            format!("{}_{}", self.user, self.agent)
        };
        SignalAddress {
            name,
            device_id: self.device as u32,
        }
    }
}

/// Address of a single Signal session: `(user identity, device id)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SignalAddress {
    pub name: String,
    pub device_id: u32,
}

impl fmt::Display for SignalAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.name, self.device_id)
    }
}

impl fmt::Display for Jid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.user.is_empty() {
            return write!(f, "{}", self.server);
        }
        write!(f, "{}", self.user)?;
        if self.agent > 0 {
            write!(f, ".{}", self.agent)?;
        }
        if self.device > 0 {
            write!(f, ":{}", self.device)?;
        }
        write!(f, "@{}", self.server)
    }
}

impl FromStr for Jid {
    type Err = JidError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(JidError::InvalidFormat("empty string".into()));
        }
        let (user_part, server) = match s.split_once('@') {
            Some((user, server)) if !server.is_empty() => (user, server),
            Some(_) => return Err(JidError::InvalidFormat(s.to_string())),
            // Bare server JID, e.g. "s.whatsapp.net".
            None => return Ok(Jid::new("", s)),
        };

        let (user_part, device) = match user_part.split_once(':') {
            Some((user, device_str)) => {
                let device = device_str
                    .parse::<u16>()
                    .map_err(|_| JidError::InvalidFormat(s.to_string()))?;
                (user, device)
            }
            None => (user_part, 0),
        };

        // Agent suffix only applies to user servers; group ids and LIDs may
        // legitimately contain dots.
        let (user, agent) = if server == DEFAULT_USER_SERVER || server == LEGACY_USER_SERVER {
            match user_part.rsplit_once('.') {
                Some((user, suffix)) => match suffix.parse::<u8>() {
                    Ok(agent) => (user, agent),
                    Err(_) => (user_part, 0),
                },
                None => (user_part, 0),
            }
        } else {
            (user_part, 0)
        };

        Ok(Jid {
            user: user.to_string(),
            agent,
            device,
            server: server.to_string(),
        })
    }
}
