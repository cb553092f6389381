//! Process-level connection loop

use crate::dispatcher::{CommandRequest, Dispatcher};
use crate::queue::CommandQueues;
use crate::search::{SearchBackend, SearchClient};
use searchbot_core::{
    Backoff, Config, Connection, Event, Identity, RateLimiter, Result, Session, SessionOptions, SystemClock,
};
use std::sync::Arc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

/// How a session ended
enum SessionEnd {
    Lost,
    Shutdown,
}

/// The search bot: connects, registers, serves commands and reconnects
pub struct Bot {
    config: Config,
    dispatcher: Arc<Dispatcher>,
    backoff: Backoff,
    shutdown: CancellationToken,
}

impl Bot {
    /// Build a bot backed by the configured search endpoint
    pub fn new(config: Config) -> Result<Self> {
        let backend = Arc::new(SearchClient::new(&config.search)?);
        Ok(Self::with_backend(config, backend))
    }

    /// Build a bot with a custom search backend
    pub fn with_backend(config: Config, backend: Arc<dyn SearchBackend>) -> Self {
        let limiter = Arc::new(RateLimiter::new(&config.rate_limit, Arc::new(SystemClock)));
        let dispatcher = Arc::new(Dispatcher::new(limiter, backend, config.output.clone()));

        Self {
            backoff: Backoff::new(&config.reconnect),
            dispatcher,
            config,
            shutdown: CancellationToken::new(),
        }
    }

    /// Token that stops the bot when cancelled
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Run until shut down. Only configuration errors end the loop early.
    pub async fn run(&mut self) -> Result<()> {
        loop {
            match self.run_once().await {
                Ok(SessionEnd::Shutdown) => break,
                Ok(SessionEnd::Lost) => info!("Connection lost"),
                Err(e) if !e.is_transient() => return Err(e),
                Err(e) => warn!("Connection failed: {}", e),
            }

            let delay = self.backoff.next_delay();
            info!("Reconnecting in {:?} (attempt {})", delay, self.backoff.attempts);

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = self.shutdown.cancelled() => break,
            }
        }

        info!("Bot stopped");
        Ok(())
    }

    async fn run_once(&mut self) -> Result<SessionEnd> {
        let server = &self.config.server;

        let mut connection = tokio::select! {
            connection = Connection::connect(server) => connection?,
            _ = self.shutdown.cancelled() => return Ok(SessionEnd::Shutdown),
        };

        let nick = tokio::select! {
            nick = connection.register(
                &self.config.identity,
                server.password.as_deref(),
                &self.config.channels,
                server.registration_timeout(),
            ) => nick?,
            _ = self.shutdown.cancelled() => return Ok(SessionEnd::Shutdown),
        };
        let registered = Instant::now();

        let mut session = connection.into_session(SessionOptions::from_config(&self.config));
        let mut queues = CommandQueues::new(self.dispatcher.clone(), session.outbound());

        let end = self.serve(&mut session, &mut queues, &nick).await;
        self.backoff.session_ended(registered.elapsed());

        drop(queues);
        if let SessionEnd::Shutdown = end {
            session.quit("Shutting down").await;
        }
        Ok(end)
    }

    async fn serve(&self, session: &mut Session, queues: &mut CommandQueues, nick: &str) -> SessionEnd {
        loop {
            let event = tokio::select! {
                event = session.next_event() => event,
                _ = self.shutdown.cancelled() => return SessionEnd::Shutdown,
            };

            match event {
                Some(event) => self.handle_event(event, queues, nick),
                None => return SessionEnd::Lost,
            }
        }
    }

    fn handle_event(&self, event: Event, queues: &mut CommandQueues, nick: &str) {
        match &event {
            Event::PrivateMessage { sender, .. } | Event::ChannelMessage { sender, .. } => {
                if is_own(sender, nick) {
                    return;
                }
                if let Some(request) = CommandRequest::from_event(&event) {
                    debug!("Command from {}: {:?}", request.sender, request.command);
                    queues.submit(request);
                }
            }
            Event::Join { who, channel } if is_own(who, nick) => info!("Joined {}", channel),
            Event::Error { code, detail } => warn!("Server error {}: {}", code, detail),
            other => trace!("Unhandled event: {:?}", other),
        }
    }
}

/// Whether `who` is the bot itself, compared under IRC casemapping
fn is_own(who: &Identity, nick: &str) -> bool {
    *who == Identity::new(nick)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_own_nick_ignores_case() {
        assert!(is_own(&Identity::new("SEARCHBOT"), "SearchBot"));
        assert!(is_own(&Identity::new("search[bot]"), "SEARCH{BOT}"));
        assert!(!is_own(&Identity::new("SearchBot_"), "SearchBot"));
    }
}
