//! Live model of the river compositor, kept up to date through the
//! `river-status-unstable-v1` protocol, plus command execution through
//! `river-control-unstable-v1`.
//!
//! All protocol I/O happens on a dedicated worker thread. Changes reach the
//! owner of [`RiverService`] through a deferred queue that is drained on the
//! owner's own schedule.

pub mod command;
pub mod discovery;
pub mod events;
mod protocol;
pub mod session;
pub mod state;
pub mod tags;
pub mod wayland;
pub mod wiring;

#[cfg(test)]
mod testing;

pub use self::{
    command::{CommandInvocation, CommandOutcome, FallbackRunner, OnComplete, Riverctl},
    events::{Payload, RiverEvent},
    session::{SessionOptions, SessionPhase},
};

use self::{
    command::{CommandDispatcher, CommandSlot},
    events::{Deferred, EventSink},
    session::PhaseCell,
};
use crate::{
    config::Config,
    services::{ReadOnlyService, Service},
};
use anyhow::{Context, Result};
use log::warn;
use std::{collections::BTreeMap, sync::Arc, thread::JoinHandle};
use tokio::sync::mpsc::{UnboundedReceiver, error::TryRecvError};

/// Tags of one output as last reported.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutputTags {
    pub view: Vec<u32>,
    pub focused: Vec<u32>,
    pub urgent: Vec<u32>,
    pub layout_name: Option<String>,
}

#[derive(Debug, Clone)]
pub enum RiverCommand {
    Run { command: String, args: Vec<String> },
    ToggleFocusedTag(u32),
}

/// Owner-side handle to the river session.
///
/// Construct one at startup and pass it to whatever needs compositor state.
/// The read model (`is_ready`, `active_window`, `outputs`, ...) only changes
/// while pending work is drained.
pub struct RiverService {
    receiver: UnboundedReceiver<Deferred>,
    commands: CommandDispatcher,
    phase: PhaseCell,
    ready: bool,
    active_window: String,
    mode: Option<String>,
    focused_output: Option<u32>,
    outputs: BTreeMap<u32, OutputTags>,
    _worker: Option<JoinHandle<()>>,
}

impl RiverService {
    /// Spawns the protocol worker.
    pub fn start(config: &Config) -> Result<Self> {
        let (sink, receiver) = EventSink::channel();
        let phase = PhaseCell::default();
        let slot = CommandSlot::default();

        let worker = wayland::spawn(
            SessionOptions {
                dispatch_yield: config.dispatch_yield(),
            },
            sink.clone(),
            phase.clone(),
            slot.clone(),
        )
        .context("Failed to spawn river-status thread")?;

        let fallback = Box::new(Riverctl::new(config.fallback_command.clone()));
        let mut service = Self::with_parts(receiver, CommandDispatcher::new(slot, fallback, sink), phase);
        service._worker = Some(worker);

        Ok(service)
    }

    fn with_parts(
        receiver: UnboundedReceiver<Deferred>,
        commands: CommandDispatcher,
        phase: PhaseCell,
    ) -> Self {
        Self {
            receiver,
            commands,
            phase,
            ready: false,
            active_window: String::new(),
            mode: None,
            focused_output: None,
            outputs: BTreeMap::new(),
            _worker: None,
        }
    }

    pub fn is_ready(&self) -> bool {
        self.ready
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase.get()
    }

    /// Title of the focused window, empty until the first report.
    pub fn active_window(&self) -> &str {
        &self.active_window
    }

    pub fn mode(&self) -> Option<&str> {
        self.mode.as_deref()
    }

    pub fn focused_output(&self) -> Option<u32> {
        self.focused_output
    }

    pub fn outputs(&self) -> &BTreeMap<u32, OutputTags> {
        &self.outputs
    }

    /// Runs everything the worker has queued so far: events are applied to
    /// the read model and handed to `observer`, command continuations are
    /// invoked. Returns the number of events seen.
    pub fn dispatch_pending<F>(&mut self, mut observer: F) -> usize
    where
        F: FnMut(&RiverEvent),
    {
        let mut events = 0;
        loop {
            match self.receiver.try_recv() {
                Ok(Deferred::Event(event)) => {
                    self.update(event.clone());
                    observer(&event);
                    events += 1;
                }
                Ok(Deferred::Call(call)) => call(),
                Err(TryRecvError::Empty | TryRecvError::Disconnected) => break,
            }
        }
        events
    }

    /// Waits for the next event, running queued continuations on the way.
    /// `None` once the worker is gone and the queue is empty.
    pub async fn next_event(&mut self) -> Option<RiverEvent> {
        loop {
            match self.receiver.recv().await? {
                Deferred::Event(event) => {
                    self.update(event.clone());
                    return Some(event);
                }
                Deferred::Call(call) => call(),
            }
        }
    }

    /// Runs `command` with `args`. Returns whether the command was
    /// dispatched at all, not whether it succeeded; the outcome is reported
    /// to `on_complete`.
    pub fn run_command<S>(&self, command: &str, args: &[S], on_complete: Option<OnComplete>) -> bool
    where
        S: AsRef<str>,
    {
        let args = std::iter::once(command.to_string())
            .chain(args.iter().map(|arg| arg.as_ref().to_string()))
            .collect();

        self.submit(args, on_complete).is_some()
    }

    /// Like [`RiverService::run_command`] but hands back the invocation so
    /// the outcome can be inspected or awaited.
    pub fn submit(
        &self,
        args: Vec<String>,
        on_complete: Option<OnComplete>,
    ) -> Option<Arc<CommandInvocation>> {
        self.commands.dispatch(args, on_complete)
    }

    /// Makes `tag` the only focused tag.
    pub fn toggle_focused_tag(&self, tag: u32, on_complete: Option<OnComplete>) -> bool {
        Self::toggle_args(tag)
            .is_some_and(|args| self.submit(args, on_complete).is_some())
    }

    fn toggle_args(tag: u32) -> Option<Vec<String>> {
        let Some(mask) = tags::mask_for(tag) else {
            warn!("Tag {tag} is out of range");
            return None;
        };

        Some(vec!["set-focused-tags".to_string(), mask.to_string()])
    }
}

impl ReadOnlyService for RiverService {
    type UpdateEvent = RiverEvent;

    fn update(&mut self, event: Self::UpdateEvent) {
        match event {
            RiverEvent::Ready => self.ready = true,
            RiverEvent::OutputRemoved { output_id } => {
                self.outputs.remove(&output_id);
                if self.focused_output == Some(output_id) {
                    self.focused_output = None;
                }
            }
            RiverEvent::ViewTags { output_id, tags } => {
                self.outputs.entry(output_id).or_default().view = tags;
            }
            RiverEvent::FocusedTags { output_id, tags } => {
                self.outputs.entry(output_id).or_default().focused = tags;
            }
            RiverEvent::UrgentTags { output_id, tags } => {
                self.outputs.entry(output_id).or_default().urgent = tags;
            }
            RiverEvent::LayoutName { output_id, name } => {
                self.outputs.entry(output_id).or_default().layout_name = name;
            }
            RiverEvent::ActiveWindow { title } => self.active_window = title,
            RiverEvent::FocusedOutput { output_id } => self.focused_output = Some(output_id),
            RiverEvent::UnfocusedOutput { output_id } => {
                if self.focused_output == Some(output_id) {
                    self.focused_output = None;
                }
            }
            RiverEvent::Mode { name } => self.mode = Some(name),
            RiverEvent::Terminated { .. } => {}
        }
    }
}

impl Service for RiverService {
    type Command = RiverCommand;
    type Output = Option<Arc<CommandInvocation>>;

    fn command(&mut self, command: Self::Command) -> Self::Output {
        let args = match command {
            RiverCommand::Run { command, args } => {
                std::iter::once(command).chain(args).collect()
            }
            RiverCommand::ToggleFocusedTag(tag) => Self::toggle_args(tag)?,
        };

        self.submit(args, None)
    }
}
