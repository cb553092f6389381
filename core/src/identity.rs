//! Requester identities

use crate::utils::casemap::irc_to_lower;
use std::fmt;
use std::hash::{Hash, Hasher};

/// A requester's nickname on the network.
///
/// Two identities are equal when their nicknames match under the RFC 1459
/// case mapping, so `Alice` and `alice` share one rate-limit budget. The
/// original spelling is kept for addressing replies.
#[derive(Debug, Clone)]
pub struct Identity {
    nick: String,
    key: String,
}

impl Identity {
    pub fn new(nick: impl Into<String>) -> Self {
        let nick = nick.into();
        let key = irc_to_lower(&nick);
        Self { nick, key }
    }

    /// Nickname as last seen on the wire
    pub fn nick(&self) -> &str {
        &self.nick
    }

    /// Case-normalized key
    pub fn key(&self) -> &str {
        &self.key
    }
}

impl PartialEq for Identity {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl Eq for Identity {}

impl Hash for Identity {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key.hash(state);
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.nick)
    }
}

impl From<&str> for Identity {
    fn from(nick: &str) -> Self {
        Identity::new(nick)
    }
}
