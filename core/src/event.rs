//! Typed protocol events
//!
//! [`Event::parse`] is the single entry point from raw wire bytes to
//! something the bot can act on. It never fails: anything that does not
//! fit the minimal grammar becomes [`Event::Unknown`].

use crate::message::{Message, MessageType};
use crate::Identity;
use std::borrow::Cow;
use tracing::debug;

/// A decoded inbound line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// Server keep-alive probe
    Ping { token: String },
    /// Answer to a probe we sent
    Pong { token: String },
    /// Registration accepted (numeric 001)
    Welcome { nick: String },
    /// PRIVMSG to a channel
    ChannelMessage {
        sender: Identity,
        channel: String,
        text: String,
    },
    /// PRIVMSG addressed to the bot directly
    PrivateMessage { sender: Identity, text: String },
    /// Someone (possibly the bot) joined a channel
    Join { who: Identity, channel: String },
    /// ERROR command or a 4xx/5xx numeric
    Error { code: String, detail: String },
    /// Anything else, including lines that failed to parse
    Unknown { raw: String },
}

impl Event {
    /// Decode one raw line. Trailing CR/LF remnants are stripped and invalid
    /// UTF-8 is replaced rather than rejected.
    pub fn parse(raw: &[u8]) -> Event {
        let mut end = raw.len();
        while end > 0 && matches!(raw[end - 1], b'\r' | b'\n') {
            end -= 1;
        }
        let line: Cow<'_, str> = String::from_utf8_lossy(&raw[..end]);

        match Message::parse(&line) {
            Ok(message) => Self::from_message(message, &line),
            Err(e) => {
                debug!("Degraded parse of {:?}: {}", line, e);
                Event::Unknown { raw: line.into_owned() }
            }
        }
    }

    fn from_message(message: Message, raw: &str) -> Event {
        let unknown = || Event::Unknown { raw: raw.to_string() };

        match &message.command {
            MessageType::Ping => Event::Ping {
                token: message.params.first().cloned().unwrap_or_default(),
            },
            MessageType::Pong => Event::Pong {
                token: message.trailing().unwrap_or_default().to_string(),
            },
            MessageType::Numeric(1) => match message.params.first() {
                Some(nick) => Event::Welcome { nick: nick.clone() },
                None => unknown(),
            },
            MessageType::Numeric(code @ 400..=599) => Event::Error {
                code: format!("{:03}", code),
                detail: message.params.iter().skip(1).cloned().collect::<Vec<_>>().join(" "),
            },
            MessageType::Error => Event::Error {
                code: "ERROR".to_string(),
                detail: message.trailing().unwrap_or_default().to_string(),
            },
            MessageType::PrivMsg => {
                let (sender, target, text) = match (message.source_nick(), message.params.as_slice()) {
                    (Some(nick), [target, text]) if !nick.is_empty() => (nick, target, text),
                    _ => return unknown(),
                };

                // CTCP requests are never bot commands
                if text.starts_with('\x01') {
                    return unknown();
                }

                if is_channel(target) {
                    Event::ChannelMessage {
                        sender: Identity::new(sender),
                        channel: target.clone(),
                        text: text.clone(),
                    }
                } else {
                    Event::PrivateMessage {
                        sender: Identity::new(sender),
                        text: text.clone(),
                    }
                }
            }
            MessageType::Join => match (message.source_nick(), message.params.first()) {
                (Some(nick), Some(channel)) if !nick.is_empty() => Event::Join {
                    who: Identity::new(nick),
                    channel: channel.clone(),
                },
                _ => unknown(),
            },
            _ => unknown(),
        }
    }
}

fn is_channel(target: &str) -> bool {
    target.starts_with(['#', '&', '+', '!'])
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{Rng, SeedableRng};

    #[test]
    fn test_ping() {
        assert_eq!(
            Event::parse(b"PING :irc.example.com\r\n"),
            Event::Ping { token: "irc.example.com".to_string() }
        );
        assert_eq!(Event::parse(b"PING 12345"), Event::Ping { token: "12345".to_string() });
    }

    #[test]
    fn test_private_and_channel_messages() {
        match Event::parse(b":Alice!a@host PRIVMSG SearchBot :!search cats\r\n") {
            Event::PrivateMessage { sender, text } => {
                assert_eq!(sender.nick(), "Alice");
                assert_eq!(text, "!search cats");
            }
            other => panic!("unexpected event {:?}", other),
        }

        match Event::parse(b":bob!b@host PRIVMSG #lobby :!help") {
            Event::ChannelMessage { sender, channel, text } => {
                assert_eq!(sender, Identity::new("BOB"));
                assert_eq!(channel, "#lobby");
                assert_eq!(text, "!help");
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_join_welcome_and_errors() {
        assert_eq!(
            Event::parse(b":SearchBot!s@h JOIN :#lobby"),
            Event::Join { who: Identity::new("SearchBot"), channel: "#lobby".to_string() }
        );
        assert_eq!(
            Event::parse(b":irc.example.com 001 SearchBot :Welcome"),
            Event::Welcome { nick: "SearchBot".to_string() }
        );
        assert_eq!(
            Event::parse(b":irc.example.com 433 * SearchBot :Nickname is already in use"),
            Event::Error {
                code: "433".to_string(),
                detail: "SearchBot Nickname is already in use".to_string()
            }
        );
        assert_eq!(
            Event::parse(b"ERROR :Closing Link: bot (Ping timeout)"),
            Event::Error {
                code: "ERROR".to_string(),
                detail: "Closing Link: bot (Ping timeout)".to_string()
            }
        );
    }

    #[test]
    fn test_unknown_lines() {
        assert!(matches!(Event::parse(b""), Event::Unknown { .. }));
        assert!(matches!(Event::parse(b"\r\n"), Event::Unknown { .. }));
        assert!(matches!(Event::parse(b":server NOTICE * :hello"), Event::Unknown { .. }));
        assert!(matches!(Event::parse(b"PRIVMSG nobody :no prefix"), Event::Unknown { .. }));
        assert!(matches!(Event::parse(b":a!b@c PRIVMSG bot :\x01VERSION\x01"), Event::Unknown { .. }));
        assert!(matches!(Event::parse(b":irc.example.com 001"), Event::Unknown { .. }));
    }

    #[test]
    fn test_invalid_utf8_is_replaced() {
        match Event::parse(b":carol!c@h PRIVMSG bot :caf\xe9 \xff\r\n") {
            Event::PrivateMessage { text, .. } => assert_eq!(text, "caf\u{FFFD} \u{FFFD}"),
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_arbitrary_bytes_never_panic() {
        let mut rng = rand::rngs::StdRng::seed_from_u64(0x5eed);
        let alphabet = b": !@#PRIVMSGPINGJOIN001433\r\n\x01\xff\xc3";

        for _ in 0..5_000 {
            let len = rng.gen_range(0..64);
            let line: Vec<u8> = (0..len)
                .map(|_| {
                    if rng.gen_bool(0.5) {
                        alphabet[rng.gen_range(0..alphabet.len())]
                    } else {
                        rng.gen()
                    }
                })
                .collect();
            let _ = Event::parse(&line);
        }
    }
}
