use super::{
    command::{CommandChannel, CommandSlot},
    discovery::Binder,
    events::{EventSink, RiverEvent},
    state::{Handles, SessionState},
};
use log::{debug, error, info, warn};
use std::{
    convert::Infallible,
    sync::{
        Arc,
        atomic::{AtomicU8, Ordering},
    },
    thread,
    time::Duration,
};
use wayland_client::{ConnectError, DispatchError, backend::WaylandError};

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("failed to connect to the Wayland display: {0}")]
    Connect(#[from] ConnectError),
    #[error("river status manager was not advertised by the compositor")]
    MissingStatusManager,
    #[error("failed to dispatch Wayland events: {0}")]
    Dispatch(#[from] DispatchError),
    #[error("failed to flush the Wayland connection: {0}")]
    Flush(#[from] WaylandError),
}

/// Lifecycle of the protocol worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum SessionPhase {
    Disconnected,
    Connecting,
    DiscoveringGlobals,
    WiringListeners,
    Ready,
    Dispatching,
    Terminated,
}

impl SessionPhase {
    const ALL: [SessionPhase; 7] = [
        SessionPhase::Disconnected,
        SessionPhase::Connecting,
        SessionPhase::DiscoveringGlobals,
        SessionPhase::WiringListeners,
        SessionPhase::Ready,
        SessionPhase::Dispatching,
        SessionPhase::Terminated,
    ];

    /// Phases only move one step forward, except that any live phase may
    /// terminate.
    pub fn can_advance_to(self, next: SessionPhase) -> bool {
        match next {
            SessionPhase::Terminated => self != SessionPhase::Terminated,
            _ => next as u8 == self as u8 + 1,
        }
    }

    fn from_u8(value: u8) -> Self {
        Self::ALL
            .get(usize::from(value))
            .copied()
            .unwrap_or(SessionPhase::Terminated)
    }
}

/// Phase shared between the worker and its owner.
#[derive(Debug, Clone)]
pub struct PhaseCell(Arc<AtomicU8>);

impl Default for PhaseCell {
    fn default() -> Self {
        Self(Arc::new(AtomicU8::new(SessionPhase::Disconnected as u8)))
    }
}

impl PhaseCell {
    pub fn get(&self) -> SessionPhase {
        SessionPhase::from_u8(self.0.load(Ordering::Acquire))
    }

    pub fn advance(&self, next: SessionPhase) -> bool {
        let current = self.get();
        if !current.can_advance_to(next) {
            warn!("Refusing session transition {current:?} -> {next:?}");
            return false;
        }

        debug!("Session {current:?} -> {next:?}");
        self.0.store(next as u8, Ordering::Release);
        true
    }
}

/// Worker-side session: the state store plus the queue its changes are
/// reported on.
pub struct Session<H: Handles> {
    pub state: SessionState<H>,
    sink: EventSink,
}

impl<H: Handles> Session<H> {
    pub fn new(sink: EventSink) -> Self {
        Self {
            state: SessionState::default(),
            sink,
        }
    }

    pub fn sink(&self) -> &EventSink {
        &self.sink
    }

    pub fn emit(&self, event: RiverEvent) {
        self.sink.emit(event);
    }
}

/// Connection operations the session loop is driven by.
pub trait Transport {
    type Handles: Handles;
    type Binder: Binder<Self::Handles>;

    fn binder(&mut self) -> &mut Self::Binder;

    /// Blocks until the compositor has processed every request sent so far
    /// and all resulting events have been dispatched.
    fn roundtrip(&mut self, session: &mut Session<Self::Handles>) -> Result<(), SessionError>;

    fn blocking_dispatch(
        &mut self,
        session: &mut Session<Self::Handles>,
    ) -> Result<(), SessionError>;

    /// Command path over the control interface, when both the control
    /// interface and a seat are bound.
    fn command_channel(
        &self,
        state: &SessionState<Self::Handles>,
    ) -> Option<Arc<dyn CommandChannel>>;
}

#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub dispatch_yield: Duration,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            dispatch_yield: Duration::from_millis(10),
        }
    }
}

/// Runs discovery, wiring and the dispatch loop. Only returns on error.
pub fn run_session<T: Transport>(
    transport: &mut T,
    session: &mut Session<T::Handles>,
    phase: &PhaseCell,
    commands: &CommandSlot,
    options: &SessionOptions,
) -> Result<Infallible, SessionError> {
    phase.advance(SessionPhase::DiscoveringGlobals);
    debug!("Performing initial roundtrip");
    transport.roundtrip(session)?;

    if session.state.status_manager.is_none() {
        error!("River status manager not found");
        return Err(SessionError::MissingStatusManager);
    }

    if session.state.control.is_none() {
        warn!("River control interface not found, commands will fall back to riverctl");
    }

    phase.advance(SessionPhase::WiringListeners);
    session.wire_listeners(transport.binder())?;

    debug!("Performing second roundtrip");
    transport.roundtrip(session)?;

    // Commands issued in response to `ready` must already see the channel.
    if let Some(channel) = transport.command_channel(&session.state) {
        commands.publish(channel);
    }

    phase.advance(SessionPhase::Ready);
    if session.state.mark_ready() {
        info!("River session ready");
        session.emit(RiverEvent::Ready);
    }

    phase.advance(SessionPhase::Dispatching);
    info!("Entering main event loop");
    loop {
        transport.blocking_dispatch(session)?;
        if !options.dispatch_yield.is_zero() {
            thread::sleep(options.dispatch_yield);
        }
    }
}

/// Reports the end of a session: the phase, the command path and a final
/// event for the owner.
pub fn terminate(phase: &PhaseCell, commands: &CommandSlot, sink: &EventSink, reason: String) {
    phase.advance(SessionPhase::Terminated);
    commands.clear();
    sink.emit(RiverEvent::Terminated { reason });
}
