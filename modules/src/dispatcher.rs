//! Bot command parsing and handling
//!
//! Every reply goes to the requester privately, including replies to
//! commands typed in a channel.

use crate::format::{attribution, format_entry};
use crate::search::{SearchBackend, SearchError, SearchRequest};
use searchbot_core::config::OutputConfig;
use searchbot_core::{Admission, Event, Identity, OutboundMessage, Quota, RateLimiter};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

pub const USAGE: &str = "Usage: !search <query>";
pub const HELP: &str = "SearchBot Commands: !search <query> - Search the web privately (results sent via PM) | !help - Show this help message";
pub const UNAVAILABLE: &str = "Search is temporarily unavailable. Please try again later.";
pub const NO_RESULTS: &str = "No results found.";
pub const BUSY: &str = "Too many pending commands. Please wait for your earlier searches to finish.";

/// A `!` command recognized in message text
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BotCommand {
    /// `!search [query]`; the query may be empty
    Search(String),
    /// `!help`
    Help,
    /// Any other `!word`
    Unrecognized(String),
}

impl BotCommand {
    /// Parse message text. `None` unless the text starts with `!` and a word.
    pub fn parse(text: &str) -> Option<BotCommand> {
        let rest = text.trim().strip_prefix('!')?;

        let (word, args) = match rest.split_once(char::is_whitespace) {
            Some((word, args)) => (word, args.trim()),
            None => (rest, ""),
        };

        if word.is_empty() {
            return None;
        }

        let command = match word.to_ascii_lowercase().as_str() {
            "search" => BotCommand::Search(args.to_string()),
            "help" => BotCommand::Help,
            _ => BotCommand::Unrecognized(word.to_string()),
        };
        Some(command)
    }
}

/// A command together with who sent it and where
#[derive(Debug, Clone)]
pub struct CommandRequest {
    pub sender: Identity,
    /// Channel the command was typed in, `None` for private messages
    pub channel: Option<String>,
    pub command: BotCommand,
}

impl CommandRequest {
    /// Extract a command from a message event
    pub fn from_event(event: &Event) -> Option<CommandRequest> {
        let (sender, channel, text) = match event {
            Event::PrivateMessage { sender, text } => (sender, None, text),
            Event::ChannelMessage { sender, channel, text } => (sender, Some(channel.clone()), text),
            _ => return None,
        };

        Some(CommandRequest {
            sender: sender.clone(),
            channel,
            command: BotCommand::parse(text)?,
        })
    }
}

/// Turns commands into replies
pub struct Dispatcher {
    limiter: Arc<RateLimiter>,
    backend: Arc<dyn SearchBackend>,
    output: OutputConfig,
}

impl Dispatcher {
    pub fn new(limiter: Arc<RateLimiter>, backend: Arc<dyn SearchBackend>, output: OutputConfig) -> Self {
        Self {
            limiter,
            backend,
            output,
        }
    }

    /// Handle one command. `None` means the command is ignored.
    pub async fn handle(&self, request: &CommandRequest) -> Option<OutboundMessage> {
        let target = request.sender.clone();

        match &request.command {
            BotCommand::Help => Some(OutboundMessage::single(target, HELP)),
            BotCommand::Unrecognized(word) => {
                debug!("Ignoring unknown command !{} from {}", word, request.sender);
                None
            }
            BotCommand::Search(query) if query.trim().is_empty() => Some(OutboundMessage::single(target, USAGE)),
            BotCommand::Search(query) => Some(self.search(target, query, request.channel.as_deref()).await),
        }
    }

    /// Reply for a command that could not be queued. `None` for commands
    /// that are ignored anyway.
    pub fn overloaded(&self, request: &CommandRequest) -> Option<OutboundMessage> {
        match request.command {
            BotCommand::Unrecognized(_) => None,
            _ => Some(OutboundMessage::single(request.sender.clone(), BUSY)),
        }
    }

    async fn search(&self, target: Identity, query: &str, channel: Option<&str>) -> OutboundMessage {
        if let Admission::Denied { reason, retry_after } = self.limiter.try_acquire(&target) {
            info!("Rate limited {} ({} quota)", target, reason);
            return OutboundMessage::single(target, self.rate_limited(reason, retry_after));
        }

        let query: String = query.chars().take(self.output.max_query_length).collect();
        match channel {
            Some(channel) => info!("Search from {} in {}", target, channel),
            None => info!("Search from {}", target),
        }
        debug!("Query from {}: {:?}", target, query);

        let request = SearchRequest::new(query, target.clone());
        match self.backend.search(&request).await {
            Ok(results) => {
                let mut lines: Vec<String> = results
                    .into_iter()
                    .enumerate()
                    .map(|(i, entry)| format_entry(i + 1, &entry))
                    .collect();
                lines.push(attribution(&self.output.attribution_name, &self.output.attribution_url));
                OutboundMessage::new(target, lines)
            }
            Err(SearchError::Unavailable) => OutboundMessage::single(target, UNAVAILABLE),
            Err(SearchError::NoResults) => OutboundMessage::single(target, NO_RESULTS),
        }
    }

    fn rate_limited(&self, reason: Quota, retry_after: Duration) -> String {
        let limit = match reason {
            Quota::Minute => self.limiter.minute_limit(),
            Quota::Day => self.limiter.day_limit(),
        };
        format!(
            "Rate limit exceeded ({} searches per {}). Please try again in {}.",
            limit,
            reason,
            humanize(retry_after)
        )
    }
}

/// Whole seconds, rounded up, as `42s`, `3m 5s` or `7h 12m`
fn humanize(wait: Duration) -> String {
    let secs = wait.as_secs() + u64::from(wait.subsec_nanos() > 0);
    match secs {
        0..=59 => format!("{}s", secs),
        60..=3599 => format!("{}m {}s", secs / 60, secs % 60),
        _ => format!("{}h {}m", secs / 3600, (secs % 3600) / 60),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_commands() {
        assert_eq!(BotCommand::parse("!search rust lang"), Some(BotCommand::Search("rust lang".to_string())));
        assert_eq!(BotCommand::parse("  !SEARCH   spaced  out  "), Some(BotCommand::Search("spaced  out".to_string())));
        assert_eq!(BotCommand::parse("!search"), Some(BotCommand::Search(String::new())));
        assert_eq!(BotCommand::parse("!Help"), Some(BotCommand::Help));
        assert_eq!(BotCommand::parse("!weather x"), Some(BotCommand::Unrecognized("weather".to_string())));
    }

    #[test]
    fn test_parse_non_commands() {
        assert_eq!(BotCommand::parse("hello there"), None);
        assert_eq!(BotCommand::parse(""), None);
        assert_eq!(BotCommand::parse("!"), None);
        assert_eq!(BotCommand::parse("! search"), None);
        assert_eq!(BotCommand::parse("search !search"), None);
    }

    #[test]
    fn test_request_from_events() {
        let event = Event::ChannelMessage {
            sender: Identity::new("bob"),
            channel: "#lobby".to_string(),
            text: "!help".to_string(),
        };
        let request = CommandRequest::from_event(&event).unwrap();
        assert_eq!(request.channel.as_deref(), Some("#lobby"));
        assert_eq!(request.command, BotCommand::Help);

        let chatter = Event::PrivateMessage {
            sender: Identity::new("bob"),
            text: "just chatting".to_string(),
        };
        assert!(CommandRequest::from_event(&chatter).is_none());
        assert!(CommandRequest::from_event(&Event::Ping { token: "x".to_string() }).is_none());
    }

    #[test]
    fn test_humanize() {
        assert_eq!(humanize(Duration::from_millis(41_200)), "42s");
        assert_eq!(humanize(Duration::from_secs(60)), "1m 0s");
        assert_eq!(humanize(Duration::from_secs(185)), "3m 5s");
        assert_eq!(humanize(Duration::from_secs(7 * 3600 + 12 * 60 + 5)), "7h 12m");
    }
}
