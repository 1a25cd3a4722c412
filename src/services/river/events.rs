use itertools::Itertools;
use serde::Serialize;
use std::fmt;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

/// State change observed on the compositor connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum RiverEvent {
    Ready,
    OutputRemoved { output_id: u32 },
    ViewTags { output_id: u32, tags: Vec<u32> },
    FocusedTags { output_id: u32, tags: Vec<u32> },
    UrgentTags { output_id: u32, tags: Vec<u32> },
    ActiveWindow { title: String },
    FocusedOutput { output_id: u32 },
    UnfocusedOutput { output_id: u32 },
    LayoutName { output_id: u32, name: Option<String> },
    Mode { name: String },
    Terminated { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Payload {
    Number(u32),
    Text(String),
}

impl fmt::Display for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Payload::Number(value) => write!(f, "{value}"),
            Payload::Text(value) => write!(f, "{value:?}"),
        }
    }
}

impl RiverEvent {
    pub fn name(&self) -> &'static str {
        match self {
            RiverEvent::Ready => "ready",
            RiverEvent::OutputRemoved { .. } => "output_removed",
            RiverEvent::ViewTags { .. } => "view_tags",
            RiverEvent::FocusedTags { .. } => "focused_tags",
            RiverEvent::UrgentTags { .. } => "urgent_tags",
            RiverEvent::ActiveWindow { .. } => "active_window",
            RiverEvent::FocusedOutput { .. } => "focused_output",
            RiverEvent::UnfocusedOutput { .. } => "unfocused_output",
            RiverEvent::LayoutName { .. } => "layout_name",
            RiverEvent::Mode { .. } => "mode",
            RiverEvent::Terminated { .. } => "terminated",
        }
    }

    /// The output this event refers to, if any.
    pub fn output_id(&self) -> Option<u32> {
        match self {
            RiverEvent::OutputRemoved { output_id }
            | RiverEvent::ViewTags { output_id, .. }
            | RiverEvent::FocusedTags { output_id, .. }
            | RiverEvent::UrgentTags { output_id, .. }
            | RiverEvent::FocusedOutput { output_id }
            | RiverEvent::UnfocusedOutput { output_id }
            | RiverEvent::LayoutName { output_id, .. } => Some(*output_id),
            RiverEvent::Ready
            | RiverEvent::ActiveWindow { .. }
            | RiverEvent::Mode { .. }
            | RiverEvent::Terminated { .. } => None,
        }
    }

    pub fn payload(&self) -> Vec<Payload> {
        match self {
            RiverEvent::Ready => vec![],
            RiverEvent::OutputRemoved { output_id }
            | RiverEvent::FocusedOutput { output_id }
            | RiverEvent::UnfocusedOutput { output_id } => vec![Payload::Number(*output_id)],
            RiverEvent::ViewTags { tags, .. }
            | RiverEvent::FocusedTags { tags, .. }
            | RiverEvent::UrgentTags { tags, .. } => {
                tags.iter().copied().map(Payload::Number).collect()
            }
            RiverEvent::ActiveWindow { title: text }
            | RiverEvent::Mode { name: text }
            | RiverEvent::Terminated { reason: text } => vec![Payload::Text(text.clone())],
            RiverEvent::LayoutName { name, .. } => {
                name.iter().cloned().map(Payload::Text).collect()
            }
        }
    }
}

impl fmt::Display for RiverEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())?;
        if let Some(output_id) = self.output_id() {
            write!(f, "[{output_id}]")?;
        }

        let payload = self.payload();
        if !payload.is_empty() {
            write!(f, " {}", payload.iter().join(" "))?;
        }

        Ok(())
    }
}

/// Work handed from the protocol worker to the context owning the UI.
pub enum Deferred {
    Event(RiverEvent),
    Call(Box<dyn FnOnce() + Send>),
}

impl fmt::Debug for Deferred {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Deferred::Event(event) => f.debug_tuple("Event").field(event).finish(),
            Deferred::Call(_) => f.write_str("Call(..)"),
        }
    }
}

/// Sending half of the deferred queue.
///
/// Posting never blocks and never fails: once the receiving side is gone the
/// items are dropped.
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: UnboundedSender<Deferred>,
}

impl EventSink {
    pub fn channel() -> (Self, UnboundedReceiver<Deferred>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn emit(&self, event: RiverEvent) {
        let _ = self.tx.send(Deferred::Event(event));
    }

    pub fn post<F>(&self, call: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let _ = self.tx.send(Deferred::Call(Box::new(call)));
    }
}
