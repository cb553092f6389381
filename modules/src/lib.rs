//! Search Bot Modules
//!
//! This crate provides the parts of the bot above the wire protocol: the
//! metasearch client, reply formatting, command dispatch with admission
//! control, per-identity command queues and the reconnecting bot loop.

pub mod bot;
pub mod dispatcher;
pub mod format;
pub mod queue;
pub mod search;

pub use bot::Bot;
pub use dispatcher::{BotCommand, CommandRequest, Dispatcher};
pub use queue::CommandQueues;
pub use search::{SearchBackend, SearchClient, SearchEntry, SearchError, SearchRequest, SearchResults};
