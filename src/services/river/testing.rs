//! Fakes standing in for the Wayland connection in unit tests.

use super::{
    command::{CommandChannel, CommandInvocation, FallbackRunner},
    discovery::{Binder, Bound, Interface},
    events::{Deferred, EventSink, RiverEvent},
    session::{Session, SessionError, Transport},
    state::{Handles, SessionState},
    tags,
    wiring::TagKind,
};
use anyhow::{Result, anyhow};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc::UnboundedReceiver;
use wayland_client::{DispatchError, backend::WaylandError};

pub struct Fake;

impl Handles for Fake {
    type StatusManager = u32;
    type Control = u32;
    type Output = u32;
    type OutputStatus = u32;
    type Seat = u32;
    type SeatStatus = u32;
}

pub fn fake_session() -> (Session<Fake>, UnboundedReceiver<Deferred>) {
    let (sink, rx) = EventSink::channel();
    (Session::new(sink), rx)
}

/// Collects queued events, running any queued calls on the way.
pub fn drain_events(rx: &mut UnboundedReceiver<Deferred>) -> Vec<RiverEvent> {
    let mut events = Vec::new();
    while let Ok(item) = rx.try_recv() {
        match item {
            Deferred::Event(event) => events.push(event),
            Deferred::Call(call) => call(),
        }
    }
    events
}

#[derive(Default)]
pub struct FakeBinder {
    pub bound: Vec<(Interface, u32, u32)>,
    pub output_statuses: Vec<u32>,
    pub released: Vec<u32>,
}

impl FakeBinder {
    pub fn output_handle_of(name: u32) -> u32 {
        name * 10
    }

    pub fn output_status_of(output_id: u32) -> u32 {
        output_id + 1000
    }
}

impl Binder<Fake> for FakeBinder {
    fn bind(&mut self, interface: Interface, name: u32, version: u32) -> Bound<Fake> {
        self.bound.push((interface, name, version));
        match interface {
            Interface::StatusManager => Bound::StatusManager(name),
            Interface::Control => Bound::Control(name),
            Interface::Output => Bound::Output(Self::output_handle_of(name)),
            Interface::Seat => Bound::Seat(name),
        }
    }

    fn output_status(&mut self, _manager: &u32, _output: &u32, output_id: u32) -> u32 {
        self.output_statuses.push(output_id);
        Self::output_status_of(output_id)
    }

    fn seat_status(&mut self, _manager: &u32, seat: &u32) -> u32 {
        seat + 2000
    }

    fn release_output(&mut self, output: u32, _status: Option<u32>) {
        self.released.push(output / 10);
    }
}

/// Wire events a fake round trip or dispatch delivers.
#[derive(Debug, Clone)]
pub enum Wire {
    Global(u32, &'static str, u32),
    GlobalRemove(u32),
    ViewTags(u32, Vec<u32>),
    FocusedTags(u32, u32),
    UrgentTags(u32, u32),
    FocusedView(String),
}

pub struct FakeTransport {
    binder: FakeBinder,
    roundtrip_batches: Vec<Vec<Wire>>,
    pub dispatches: Vec<Vec<Wire>>,
    pub roundtrips: usize,
}

impl FakeTransport {
    pub fn new(roundtrip_batches: Vec<Vec<Wire>>) -> Self {
        Self {
            binder: FakeBinder::default(),
            roundtrip_batches,
            dispatches: Vec::new(),
            roundtrips: 0,
        }
    }

    fn deliver(&mut self, session: &mut Session<Fake>, batch: Vec<Wire>) {
        for wire in batch {
            match wire {
                Wire::Global(name, interface, version) => {
                    session.on_global(&mut self.binder, name, interface, version)
                }
                Wire::GlobalRemove(name) => session.on_global_remove(&mut self.binder, name),
                Wire::ViewTags(id, words) => {
                    session.on_tags(TagKind::View, id, tags::decode_words(words))
                }
                Wire::FocusedTags(id, mask) => {
                    session.on_tags(TagKind::Focused, id, tags::decode(mask))
                }
                Wire::UrgentTags(id, mask) => {
                    session.on_tags(TagKind::Urgent, id, tags::decode(mask))
                }
                Wire::FocusedView(title) => session.on_focused_view(title),
            }
        }
    }
}

fn closed() -> SessionError {
    SessionError::Dispatch(DispatchError::Backend(WaylandError::Io(
        std::io::Error::other("connection closed"),
    )))
}

impl Transport for FakeTransport {
    type Handles = Fake;
    type Binder = FakeBinder;

    fn binder(&mut self) -> &mut FakeBinder {
        &mut self.binder
    }

    fn roundtrip(&mut self, session: &mut Session<Fake>) -> Result<(), SessionError> {
        self.roundtrips += 1;
        if self.roundtrip_batches.is_empty() {
            return Err(closed());
        }
        let batch = self.roundtrip_batches.remove(0);
        self.deliver(session, batch);
        Ok(())
    }

    fn blocking_dispatch(&mut self, session: &mut Session<Fake>) -> Result<(), SessionError> {
        if self.dispatches.is_empty() {
            return Err(closed());
        }
        let batch = self.dispatches.remove(0);
        self.deliver(session, batch);
        Ok(())
    }

    fn command_channel(&self, state: &SessionState<Fake>) -> Option<Arc<dyn CommandChannel>> {
        state.control?;
        state.seat.as_ref()?;
        Some(Arc::new(FakeChannel::default()))
    }
}

#[derive(Default)]
pub struct FakeChannel {
    submitted: Mutex<Vec<Vec<String>>>,
    broken: bool,
}

impl FakeChannel {
    pub fn broken() -> Self {
        Self {
            submitted: Mutex::default(),
            broken: true,
        }
    }

    pub fn submitted(&self) -> Vec<Vec<String>> {
        self.submitted.lock().unwrap().clone()
    }
}

impl CommandChannel for FakeChannel {
    fn submit(&self, invocation: Arc<CommandInvocation>) -> Result<()> {
        if self.broken {
            return Err(anyhow!("broken pipe"));
        }
        self.submitted
            .lock()
            .unwrap()
            .push(invocation.args().to_vec());
        Ok(())
    }
}

pub struct RecordingRunner {
    pub calls: Arc<Mutex<Vec<Vec<String>>>>,
    result: Result<String, String>,
}

impl RecordingRunner {
    pub fn succeeding(output: &str) -> Self {
        Self {
            calls: Arc::default(),
            result: Ok(output.to_string()),
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            calls: Arc::default(),
            result: Err(message.to_string()),
        }
    }
}

impl FallbackRunner for RecordingRunner {
    fn run(&self, args: &[String]) -> Result<String> {
        self.calls.lock().unwrap().push(args.to_vec());
        self.result.clone().map_err(|message| anyhow!(message))
    }
}
