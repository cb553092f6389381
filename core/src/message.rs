//! IRC message parsing and serialization
//!
//! This module implements the IRC message grammar as defined in RFC 1459:
//! an optional `:prefix`, a command verb or three-digit numeric, up to
//! fifteen middle parameters and an optional trailing parameter introduced
//! by `:` that may contain spaces.

use crate::{Error, Result};
use std::fmt;

/// IRC message prefix (server or user)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Prefix {
    /// Server name
    Server(String),
    /// User prefix (nick!user@host); user and host may be empty
    User {
        nick: String,
        user: String,
        host: String,
    },
}

impl Prefix {
    /// Parse the text after the leading ':'
    pub fn parse(s: &str) -> Self {
        if let Some((nick, rest)) = s.split_once('!') {
            let (user, host) = rest.split_once('@').unwrap_or((rest, ""));
            return Prefix::User {
                nick: nick.to_string(),
                user: user.to_string(),
                host: host.to_string(),
            };
        }

        if let Some((nick, host)) = s.split_once('@') {
            return Prefix::User {
                nick: nick.to_string(),
                user: String::new(),
                host: host.to_string(),
            };
        }

        // Server names always carry a dot, nicknames never do
        if s.contains('.') {
            Prefix::Server(s.to_string())
        } else {
            Prefix::User {
                nick: s.to_string(),
                user: String::new(),
                host: String::new(),
            }
        }
    }

    /// Nickname for user prefixes
    pub fn nick(&self) -> Option<&str> {
        match self {
            Prefix::User { nick, .. } => Some(nick),
            Prefix::Server(_) => None,
        }
    }
}

impl fmt::Display for Prefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Prefix::Server(name) => write!(f, "{}", name),
            Prefix::User { nick, user, host } => {
                write!(f, "{}", nick)?;
                if !user.is_empty() {
                    write!(f, "!{}", user)?;
                }
                if !host.is_empty() {
                    write!(f, "@{}", host)?;
                }
                Ok(())
            }
        }
    }
}

/// IRC message types the bot sends or reacts to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageType {
    // Connection registration
    Password,
    Nick,
    User,
    Quit,

    // Channel operations
    Join,

    // Messaging
    PrivMsg,

    // Miscellaneous
    Ping,
    Pong,
    Error,

    /// Three-digit server reply
    Numeric(u16),

    // Custom/unknown
    Custom(String),
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MessageType::Password => "PASS",
            MessageType::Nick => "NICK",
            MessageType::User => "USER",
            MessageType::Quit => "QUIT",
            MessageType::Join => "JOIN",
            MessageType::PrivMsg => "PRIVMSG",
            MessageType::Ping => "PING",
            MessageType::Pong => "PONG",
            MessageType::Error => "ERROR",
            MessageType::Numeric(code) => return write!(f, "{:03}", code),
            MessageType::Custom(cmd) => cmd,
        };
        write!(f, "{}", s)
    }
}

impl From<&str> for MessageType {
    fn from(s: &str) -> Self {
        if s.len() == 3 && s.bytes().all(|b| b.is_ascii_digit()) {
            if let Ok(code) = s.parse() {
                return MessageType::Numeric(code);
            }
        }

        match s.to_ascii_uppercase().as_str() {
            "PASS" => MessageType::Password,
            "NICK" => MessageType::Nick,
            "USER" => MessageType::User,
            "QUIT" => MessageType::Quit,
            "JOIN" => MessageType::Join,
            "PRIVMSG" => MessageType::PrivMsg,
            "PING" => MessageType::Ping,
            "PONG" => MessageType::Pong,
            "ERROR" => MessageType::Error,
            _ => MessageType::Custom(s.to_string()),
        }
    }
}

/// IRC message as defined in RFC 1459
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Optional prefix (server or user)
    pub prefix: Option<Prefix>,
    /// Message command/type
    pub command: MessageType,
    /// Message parameters, trailing parameter last
    pub params: Vec<String>,
}

impl Message {
    /// Create a new message
    pub fn new(command: MessageType, params: Vec<String>) -> Self {
        Self {
            prefix: None,
            command,
            params,
        }
    }

    pub fn pass(password: &str) -> Self {
        Self::new(MessageType::Password, vec![password.to_string()])
    }

    pub fn nick(nick: &str) -> Self {
        Self::new(MessageType::Nick, vec![nick.to_string()])
    }

    pub fn user(username: &str, realname: &str) -> Self {
        Self::new(
            MessageType::User,
            vec![username.to_string(), "0".to_string(), "*".to_string(), realname.to_string()],
        )
    }

    pub fn join(channel: &str) -> Self {
        Self::new(MessageType::Join, vec![channel.to_string()])
    }

    pub fn privmsg(target: &str, text: &str) -> Self {
        Self::new(MessageType::PrivMsg, vec![target.to_string(), text.to_string()])
    }

    pub fn ping(token: &str) -> Self {
        Self::new(MessageType::Ping, vec![token.to_string()])
    }

    pub fn pong(token: &str) -> Self {
        Self::new(MessageType::Pong, vec![token.to_string()])
    }

    pub fn quit(reason: &str) -> Self {
        Self::new(MessageType::Quit, vec![reason.to_string()])
    }

    /// Parse an IRC message from a single line (CR/LF already removed or not)
    pub fn parse(input: &str) -> Result<Self> {
        let mut rest = input.trim_end_matches(['\r', '\n']).trim_start_matches(' ');

        // IRCv3 message tags are not negotiated; skip them if a server sends some anyway
        if rest.starts_with('@') {
            rest = match rest.split_once(' ') {
                Some((_, after)) => after.trim_start_matches(' '),
                None => return Err(Error::MessageParse("Tags without command".to_string())),
            };
        }

        if rest.is_empty() {
            return Err(Error::MessageParse("Empty message".to_string()));
        }

        let prefix = if let Some(stripped) = rest.strip_prefix(':') {
            let (prefix_str, after) = stripped
                .split_once(' ')
                .ok_or_else(|| Error::MessageParse("Prefix without command".to_string()))?;
            if prefix_str.is_empty() {
                return Err(Error::MessageParse("Empty prefix".to_string()));
            }
            rest = after.trim_start_matches(' ');
            Some(Prefix::parse(prefix_str))
        } else {
            None
        };

        let (command_str, mut rest) = match rest.split_once(' ') {
            Some((command, after)) => (command, after),
            None => (rest, ""),
        };

        if command_str.is_empty() || !command_str.bytes().all(|b| b.is_ascii_alphanumeric()) {
            return Err(Error::MessageParse(format!("Invalid command: {:?}", command_str)));
        }

        let mut params = Vec::new();
        loop {
            rest = rest.trim_start_matches(' ');
            if rest.is_empty() {
                break;
            }
            if let Some(trailing) = rest.strip_prefix(':') {
                params.push(trailing.to_string());
                break;
            }
            match rest.split_once(' ') {
                Some((param, after)) => {
                    params.push(param.to_string());
                    rest = after;
                }
                None => {
                    params.push(rest.to_string());
                    break;
                }
            }
        }

        Ok(Message {
            prefix,
            command: MessageType::from(command_str),
            params,
        })
    }

    /// Last parameter, usually the free-text part
    pub fn trailing(&self) -> Option<&str> {
        self.params.last().map(String::as_str)
    }

    /// Nickname of the sender, if the prefix names a user
    pub fn source_nick(&self) -> Option<&str> {
        self.prefix.as_ref().and_then(Prefix::nick)
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(ref prefix) = self.prefix {
            write!(f, ":{} ", prefix)?;
        }

        write!(f, "{}", self.command)?;

        let last = self.params.len().saturating_sub(1);
        for (i, param) in self.params.iter().enumerate() {
            let needs_colon = i == last && (param.is_empty() || param.contains(' ') || param.starts_with(':'));
            if needs_colon {
                write!(f, " :{}", param)?;
            } else {
                write!(f, " {}", param)?;
            }
        }

        Ok(())
    }
}
