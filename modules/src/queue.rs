//! Per-identity command queues
//!
//! Each identity with pending commands has one worker task that handles its
//! commands strictly in arrival order. Different identities are served by
//! different workers and run concurrently. A worker that sits idle closes
//! its queue, finishes whatever slipped in, and exits; the next command for
//! that identity starts a fresh worker which first waits for the old one.

use crate::dispatcher::{CommandRequest, Dispatcher};
use searchbot_core::{Identity, Outbound};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

const QUEUE_DEPTH: usize = 16;
const DEFAULT_IDLE: Duration = Duration::from_secs(60);

struct Worker {
    sender: mpsc::Sender<CommandRequest>,
    task: JoinHandle<()>,
}

/// Routes commands to per-identity workers
pub struct CommandQueues {
    dispatcher: Arc<Dispatcher>,
    outbound: Outbound,
    workers: HashMap<Identity, Worker>,
    idle_timeout: Duration,
}

impl CommandQueues {
    pub fn new(dispatcher: Arc<Dispatcher>, outbound: Outbound) -> Self {
        Self {
            dispatcher,
            outbound,
            workers: HashMap::new(),
            idle_timeout: DEFAULT_IDLE,
        }
    }

    /// How long a worker waits for more commands before exiting
    pub fn with_idle_timeout(mut self, idle_timeout: Duration) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }

    /// Number of identities with a live worker
    pub fn active_workers(&self) -> usize {
        self.workers.values().filter(|w| !w.task.is_finished()).count()
    }

    /// Queue a command behind earlier commands from the same identity
    pub fn submit(&mut self, request: CommandRequest) {
        self.workers.retain(|_, worker| !worker.task.is_finished());

        let identity = request.sender.clone();
        let (request, previous) = match self.workers.remove(&identity) {
            Some(worker) => match worker.sender.try_send(request) {
                Ok(()) => {
                    self.workers.insert(identity, worker);
                    return;
                }
                Err(TrySendError::Full(request)) => {
                    warn!("Command queue for {} is full, refusing {:?}", identity, request.command);
                    self.workers.insert(identity, worker);
                    self.refuse(&request);
                    return;
                }
                Err(TrySendError::Closed(request)) => (request, Some(worker.task)),
            },
            None => (request, None),
        };

        let (sender, receiver) = mpsc::channel(QUEUE_DEPTH);
        if sender.try_send(request).is_err() {
            return;
        }

        debug!("Starting command worker for {}", identity);
        let task = tokio::spawn(run_worker(
            identity.clone(),
            receiver,
            previous,
            self.dispatcher.clone(),
            self.outbound.clone(),
            self.idle_timeout,
        ));

        self.workers.insert(identity, Worker { sender, task });
    }

    fn refuse(&self, request: &CommandRequest) {
        if let Some(reply) = self.dispatcher.overloaded(request) {
            let outbound = self.outbound.clone();
            tokio::spawn(async move {
                outbound.send_message(&reply).await;
            });
        }
    }
}

impl Drop for CommandQueues {
    fn drop(&mut self) {
        for worker in self.workers.values() {
            worker.task.abort();
        }
    }
}

async fn run_worker(
    identity: Identity,
    mut receiver: mpsc::Receiver<CommandRequest>,
    previous: Option<JoinHandle<()>>,
    dispatcher: Arc<Dispatcher>,
    outbound: Outbound,
    idle_timeout: Duration,
) {
    if let Some(previous) = previous {
        let _ = previous.await;
    }

    loop {
        match tokio::time::timeout(idle_timeout, receiver.recv()).await {
            Ok(Some(request)) => process(&dispatcher, &outbound, request).await,
            Ok(None) => break,
            Err(_) => {
                receiver.close();
                while let Some(request) = receiver.recv().await {
                    process(&dispatcher, &outbound, request).await;
                }
                break;
            }
        }
    }

    debug!("Command worker for {} exiting", identity);
}

async fn process(dispatcher: &Dispatcher, outbound: &Outbound, request: CommandRequest) {
    if let Some(reply) = dispatcher.handle(&request).await {
        outbound.send_message(&reply).await;
    }
}
