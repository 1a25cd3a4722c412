use super::events::EventSink;
use anyhow::{Context, Result, anyhow};
use itertools::Itertools;
use log::{debug, error, info, warn};
use serde::Serialize;
use std::{
    fmt,
    process::Command as StdCommand,
    sync::{Arc, Mutex, PoisonError, RwLock},
};
use tokio::sync::Notify;

/// Result reported by the compositor (or the fallback tool) for a command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "message", rename_all = "snake_case")]
pub enum CommandOutcome {
    /// Command output, possibly empty.
    Success(String),
    /// Human readable reason, passed through untouched.
    Failure(String),
}

impl CommandOutcome {
    pub fn succeeded(&self) -> bool {
        matches!(self, CommandOutcome::Success(_))
    }

    pub fn output(&self) -> Option<&str> {
        match self {
            CommandOutcome::Success(output) => Some(output),
            CommandOutcome::Failure(_) => None,
        }
    }

    pub fn failure_message(&self) -> Option<&str> {
        match self {
            CommandOutcome::Success(_) => None,
            CommandOutcome::Failure(message) => Some(message),
        }
    }
}

pub type OnComplete = Box<dyn FnOnce(&CommandOutcome) + Send>;

#[derive(Default)]
struct Completion {
    outcome: Option<CommandOutcome>,
    on_complete: Option<OnComplete>,
}

/// A single command run, resolved exactly once.
pub struct CommandInvocation {
    args: Vec<String>,
    completion: Mutex<Completion>,
    notify: Notify,
}

/// The first and only resolution of an invocation, with the continuation
/// that still has to run.
pub struct Resolution {
    pub outcome: CommandOutcome,
    on_complete: Option<OnComplete>,
}

impl Resolution {
    pub fn run(self) {
        if let Some(on_complete) = self.on_complete {
            on_complete(&self.outcome);
        }
    }
}

impl CommandInvocation {
    pub fn new(args: Vec<String>, on_complete: Option<OnComplete>) -> Self {
        Self {
            args,
            completion: Mutex::new(Completion {
                outcome: None,
                on_complete,
            }),
            notify: Notify::new(),
        }
    }

    /// Command name followed by its arguments.
    pub fn args(&self) -> &[String] {
        &self.args
    }

    pub fn outcome(&self) -> Option<CommandOutcome> {
        self.lock().outcome.clone()
    }

    #[cfg(test)]
    pub(crate) fn is_resolved(&self) -> bool {
        self.lock().outcome.is_some()
    }

    /// Latches `outcome` unless the invocation is already resolved.
    pub fn resolve(&self, outcome: CommandOutcome) -> Option<Resolution> {
        let resolution = {
            let mut completion = self.lock();
            if completion.outcome.is_some() {
                return None;
            }

            completion.outcome = Some(outcome.clone());
            Resolution {
                outcome,
                on_complete: completion.on_complete.take(),
            }
        };

        self.notify.notify_waiters();
        Some(resolution)
    }

    /// Waits for the outcome. There is no timeout.
    pub async fn completed(&self) -> CommandOutcome {
        loop {
            let notified = self.notify.notified();
            if let Some(outcome) = self.outcome() {
                return outcome;
            }
            notified.await;
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Completion> {
        self.completion
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for CommandInvocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandInvocation")
            .field("args", &self.args)
            .field("outcome", &self.outcome())
            .finish()
    }
}

/// Resolves `invocation` and queues its continuation for the owner context.
pub fn complete(invocation: &CommandInvocation, outcome: CommandOutcome, sink: &EventSink) -> bool {
    match invocation.resolve(outcome) {
        Some(resolution) => {
            sink.post(move || resolution.run());
            true
        }
        None => {
            debug!(
                "Ignoring outcome for already resolved command: {}",
                invocation.args().join(" ")
            );
            false
        }
    }
}

/// Issues commands over the compositor connection.
pub trait CommandChannel: Send + Sync {
    fn submit(&self, invocation: Arc<CommandInvocation>) -> Result<()>;
}

/// Runs commands through an external tool when the control interface is
/// unavailable.
pub trait FallbackRunner: Send + Sync {
    fn run(&self, args: &[String]) -> Result<String>;
}

#[derive(Debug, Clone)]
pub struct Riverctl {
    program: String,
}

impl Riverctl {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl Default for Riverctl {
    fn default() -> Self {
        Self::new("riverctl")
    }
}

impl FallbackRunner for Riverctl {
    fn run(&self, args: &[String]) -> Result<String> {
        let output = StdCommand::new(&self.program)
            .args(args)
            .output()
            .with_context(|| format!("Failed to run {}", self.program))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            return Err(anyhow!(
                "Command failed: {} {}, error: {stderr}",
                self.program,
                args.iter().join(" ")
            ));
        }

        info!("Ran command: {} {}", self.program, args.iter().join(" "));
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

/// Command channel published by the worker once the session is ready.
#[derive(Clone, Default)]
pub struct CommandSlot(Arc<RwLock<Option<Arc<dyn CommandChannel>>>>);

impl CommandSlot {
    pub fn publish(&self, channel: Arc<dyn CommandChannel>) {
        *self.0.write().unwrap_or_else(PoisonError::into_inner) = Some(channel);
    }

    pub fn clear(&self) {
        *self.0.write().unwrap_or_else(PoisonError::into_inner) = None;
    }

    pub fn get(&self) -> Option<Arc<dyn CommandChannel>> {
        self.0
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// Routes commands to the compositor, or to the fallback tool when no
/// command channel has been published.
pub struct CommandDispatcher {
    slot: CommandSlot,
    fallback: Box<dyn FallbackRunner>,
    sink: EventSink,
}

impl CommandDispatcher {
    pub fn new(slot: CommandSlot, fallback: Box<dyn FallbackRunner>, sink: EventSink) -> Self {
        Self {
            slot,
            fallback,
            sink,
        }
    }

    /// Starts `args` (command name first). `None` when there is no command.
    ///
    /// The continuation always runs on the owner context, during a later
    /// drain of the deferred queue, whichever path executed the command.
    pub fn dispatch(
        &self,
        args: Vec<String>,
        on_complete: Option<OnComplete>,
    ) -> Option<Arc<CommandInvocation>> {
        if args.is_empty() {
            warn!("Refusing to run an empty command");
            return None;
        }

        let invocation = Arc::new(CommandInvocation::new(args, on_complete));
        match self.slot.get() {
            Some(channel) => {
                if let Err(e) = channel.submit(invocation.clone()) {
                    error!("Failed to send command {}: {e:#}", invocation.args()[0]);
                    complete(&invocation, CommandOutcome::Failure(e.to_string()), &self.sink);
                }
            }
            None => {
                warn!("River control or seat not available, falling back to riverctl");
                let outcome = match self.fallback.run(invocation.args()) {
                    Ok(output) => CommandOutcome::Success(output),
                    Err(e) => {
                        error!("{e:#}");
                        CommandOutcome::Failure(e.to_string())
                    }
                };
                complete(&invocation, outcome, &self.sink);
            }
        }

        Some(invocation)
    }
}
