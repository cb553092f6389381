//! Search Bot Core
//!
//! This crate provides the protocol and connection layer of the search bot:
//! RFC 1459 message parsing, typed events, the registered connection with its
//! keep-alive handling, per-identity rate limiting and reconnection backoff.

pub mod clock;
pub mod config;
pub mod connection;
pub mod error;
pub mod event;
pub mod identity;
pub mod message;
pub mod rate_limiter;
pub mod reconnect;
pub mod utils;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::Config;
pub use connection::{Connection, Outbound, OutboundMessage, Session, SessionOptions};
pub use error::{Error, Result};
pub use event::Event;
pub use identity::Identity;
pub use message::{Message, MessageType, Prefix};
pub use rate_limiter::{Admission, Quota, RateLimiter};
pub use reconnect::Backoff;

/// Re-exports for convenience
pub use async_trait::async_trait;
pub use serde::{Deserialize, Serialize};
pub use tracing::{debug, error, info, warn};
