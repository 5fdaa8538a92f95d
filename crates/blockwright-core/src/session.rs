//! The agent session actor.
//!
//! [`AgentSession`] owns one [`BuildExecutor`] and drives its step loop.
//! Commands arrive over an `mpsc` queue as [`Command`] values, each with a
//! `oneshot` reply. While a build is running the actor executes one step,
//! then waits out the placement delay in a `select!` against the queue, so
//! commands take effect between steps and never in the middle of one.

use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use blockwright_types::{BuildEvent, CheckpointRecord, PlanSource, SessionSummary};

use crate::command::Command;
use crate::error::BuildError;
use crate::events::EventBus;
use crate::executor::BuildExecutor;
use crate::gate::GateReport;

/// Commands buffered before senders wait.
const COMMAND_QUEUE_CAPACITY: usize = 32;

/// Reply to a [`Command`].
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    /// Start, pause, resume and stop report the session afterwards.
    Summary(SessionSummary),
    /// Status of the active build, if any.
    Status(Option<SessionSummary>),
    /// Buildable plans.
    Plans(Vec<PlanSource>),
    /// Finished builds, newest first.
    History(Vec<CheckpointRecord>),
    /// Material gate for the remaining plan.
    Inventory(GateReport),
}

struct Envelope {
    command: Command,
    reply: oneshot::Sender<Result<Reply, BuildError>>,
}

/// Clonable handle for sending commands to a running [`AgentSession`].
#[derive(Debug, Clone)]
pub struct AgentHandle {
    sender: mpsc::Sender<Envelope>,
    events: EventBus,
}

impl AgentHandle {
    /// Send `command` and wait for its reply.
    pub async fn execute(&self, command: Command) -> Result<Reply, BuildError> {
        let (reply, rx) = oneshot::channel();
        self.sender
            .send(Envelope { command, reply })
            .await
            .map_err(|_closed| BuildError::SessionClosed)?;
        rx.await.map_err(|_dropped| BuildError::SessionClosed)?
    }

    /// Receive every build event published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<BuildEvent> {
        self.events.subscribe()
    }
}

impl core::fmt::Debug for Envelope {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Envelope")
            .field("command", &self.command.name())
            .finish_non_exhaustive()
    }
}

/// Actor that owns an executor and its command queue.
pub struct AgentSession {
    executor: BuildExecutor,
    commands: mpsc::Receiver<Envelope>,
}

impl AgentSession {
    /// Wrap `executor` and return the actor plus a handle to it.
    pub fn new(executor: BuildExecutor) -> (Self, AgentHandle) {
        let (sender, commands) = mpsc::channel(COMMAND_QUEUE_CAPACITY);
        let handle = AgentHandle {
            sender,
            events: executor.events().clone(),
        };
        (Self { executor, commands }, handle)
    }

    /// Spawn the actor on the current runtime.
    pub fn spawn(executor: BuildExecutor) -> (AgentHandle, JoinHandle<()>) {
        let (session, handle) = Self::new(executor);
        let task = tokio::spawn(session.run());
        (handle, task)
    }

    /// Run until every handle is dropped.
    pub async fn run(mut self) {
        info!(agent = self.executor.agent(), "Agent session started");
        loop {
            if !self.executor.is_running() {
                let Some(envelope) = self.commands.recv().await else {
                    break;
                };
                self.handle(envelope).await;
                continue;
            }

            let outcome = self.executor.step().await;
            if !outcome.attempted_placement() {
                match self.commands.try_recv() {
                    Ok(envelope) => self.handle(envelope).await,
                    Err(mpsc::error::TryRecvError::Empty) => tokio::task::yield_now().await,
                    Err(mpsc::error::TryRecvError::Disconnected) => break,
                }
                continue;
            }

            let sleep = tokio::time::sleep(self.executor.placement_delay());
            tokio::pin!(sleep);
            loop {
                tokio::select! {
                    () = &mut sleep => break,
                    envelope = self.commands.recv() => match envelope {
                        Some(envelope) => self.handle(envelope).await,
                        None => {
                            self.shutdown().await;
                            return;
                        }
                    },
                }
            }
        }
        self.shutdown().await;
    }

    async fn handle(&mut self, envelope: Envelope) {
        let Envelope { command, reply } = envelope;
        let name = command.name();
        debug!(command = name, "Handling command");
        let result = match command {
            Command::Start(request) => self.executor.start(request).await.map(Reply::Summary),
            Command::Pause => self.executor.pause().await.map(Reply::Summary),
            Command::Resume(requester) => {
                self.executor.resume(requester).await.map(Reply::Summary)
            }
            Command::Stop => self.executor.stop().await.map(Reply::Summary),
            Command::Status => Ok(Reply::Status(self.executor.status().await)),
            Command::List => self.executor.list_available_plans().await.map(Reply::Plans),
            Command::History { limit } => self.executor.history(limit).await.map(Reply::History),
            Command::Inventory => self.executor.inventory().await.map(Reply::Inventory),
        };
        if let Err(e) = &result {
            warn!(command = name, error = %e, "Command rejected");
        }
        if reply.send(result).is_err() {
            debug!(command = name, "Command reply dropped by sender");
        }
    }

    async fn shutdown(&mut self) {
        self.executor.flush().await;
        info!(agent = self.executor.agent(), "Agent session stopped");
    }
}
