use super::{
    command::{self, CommandChannel, CommandInvocation, CommandOutcome, CommandSlot},
    discovery::{Binder, Bound, Interface},
    events::EventSink,
    protocol::{
        control::{
            zriver_command_callback_v1::{self, ZriverCommandCallbackV1},
            zriver_control_v1::ZriverControlV1,
        },
        status::{
            zriver_output_status_v1::{self, ZriverOutputStatusV1},
            zriver_seat_status_v1::{self, ZriverSeatStatusV1},
            zriver_status_manager_v1::ZriverStatusManagerV1,
        },
    },
    session::{
        self, PhaseCell, Session, SessionError, SessionOptions, SessionPhase, Transport,
        run_session,
    },
    state::{Handles, SessionState},
    tags,
    wiring::TagKind,
};
use log::{debug, error, info};
use std::{
    any::Any,
    convert::Infallible,
    env,
    panic::{self, AssertUnwindSafe},
    sync::{Arc, Mutex, PoisonError},
    thread::{self, JoinHandle},
};
use wayland_client::{
    Connection, Dispatch, EventQueue, Proxy, QueueHandle,
    protocol::{
        wl_output::WlOutput,
        wl_registry::{self, WlRegistry},
        wl_seat::WlSeat,
    },
};

/// Handles backed by live Wayland proxies.
pub struct Wayland;

impl Handles for Wayland {
    type StatusManager = ZriverStatusManagerV1;
    type Control = ZriverControlV1;
    type Output = WlOutput;
    type OutputStatus = ZriverOutputStatusV1;
    type Seat = WlSeat;
    type SeatStatus = ZriverSeatStatusV1;
}

pub struct WaylandBinder {
    registry: WlRegistry,
    qh: QueueHandle<Session<Wayland>>,
}

impl Binder<Wayland> for WaylandBinder {
    fn bind(&mut self, interface: Interface, name: u32, version: u32) -> Bound<Wayland> {
        let registry = &self.registry;
        let qh = &self.qh;
        match interface {
            Interface::StatusManager => Bound::StatusManager(registry.bind(name, version, qh, ())),
            Interface::Control => Bound::Control(registry.bind(name, version, qh, ())),
            Interface::Output => Bound::Output(registry.bind(name, version, qh, ())),
            Interface::Seat => Bound::Seat(registry.bind(name, version, qh, ())),
        }
    }

    fn output_status(
        &mut self,
        manager: &ZriverStatusManagerV1,
        output: &WlOutput,
        output_id: u32,
    ) -> ZriverOutputStatusV1 {
        manager.get_river_output_status(output, &self.qh, output_id)
    }

    fn seat_status(&mut self, manager: &ZriverStatusManagerV1, seat: &WlSeat) -> ZriverSeatStatusV1 {
        manager.get_river_seat_status(seat, &self.qh, ())
    }

    fn release_output(&mut self, output: WlOutput, status: Option<ZriverOutputStatusV1>) {
        if let Some(status) = status {
            status.destroy();
        }
        if output.version() >= 3 {
            output.release();
        }
    }
}

pub struct WaylandTransport {
    connection: Connection,
    event_queue: EventQueue<Session<Wayland>>,
    binder: WaylandBinder,
}

impl WaylandTransport {
    /// Connects to the compositor named by `WAYLAND_DISPLAY` under
    /// `XDG_RUNTIME_DIR`.
    pub fn connect() -> Result<Self, SessionError> {
        let connection = Connection::connect_to_env()?;
        debug!("Display connection created");

        let event_queue = connection.new_event_queue();
        let qh = event_queue.handle();
        let registry = connection.display().get_registry(&qh, ());
        debug!("Registry obtained");

        Ok(Self {
            connection,
            event_queue,
            binder: WaylandBinder { registry, qh },
        })
    }
}

impl Transport for WaylandTransport {
    type Handles = Wayland;
    type Binder = WaylandBinder;

    fn binder(&mut self) -> &mut WaylandBinder {
        &mut self.binder
    }

    fn roundtrip(&mut self, session: &mut Session<Wayland>) -> Result<(), SessionError> {
        self.event_queue.roundtrip(session)?;
        Ok(())
    }

    fn blocking_dispatch(&mut self, session: &mut Session<Wayland>) -> Result<(), SessionError> {
        self.event_queue.blocking_dispatch(session)?;
        Ok(())
    }

    fn command_channel(&self, state: &SessionState<Wayland>) -> Option<Arc<dyn CommandChannel>> {
        let control = state.control.as_ref()?;
        let seat = state.seat.as_ref()?;

        Some(Arc::new(WaylandCommands {
            connection: self.connection.clone(),
            control: control.clone(),
            seat: seat.seat.clone(),
            qh: self.binder.qh.clone(),
            lock: Mutex::new(()),
        }))
    }
}

struct WaylandCommands {
    connection: Connection,
    control: ZriverControlV1,
    seat: WlSeat,
    qh: QueueHandle<Session<Wayland>>,
    // held from the first argument until the flush so argument lists of
    // concurrent commands never interleave
    lock: Mutex<()>,
}

impl CommandChannel for WaylandCommands {
    fn submit(&self, invocation: Arc<CommandInvocation>) -> anyhow::Result<()> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);

        for argument in invocation.args() {
            self.control.add_argument(argument.clone());
        }
        self.control
            .run_command(&self.seat, &self.qh, invocation.clone());
        self.connection.flush().map_err(SessionError::Flush)?;

        debug!("Sent command: {}", invocation.args().join(" "));
        Ok(())
    }
}

/// Starts the protocol worker on its own thread.
///
/// The thread ends only when the connection fails; the reason is reported
/// with a final `terminated` event.
pub fn spawn(
    options: SessionOptions,
    sink: EventSink,
    phase: PhaseCell,
    commands: CommandSlot,
) -> std::io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name("river-status".to_string())
        .spawn(move || {
            info!("Starting connection to River");

            let result = panic::catch_unwind(AssertUnwindSafe(|| {
                connect_and_run(&options, &sink, &phase, &commands)
            }));

            let reason = match result {
                Ok(Ok(never)) => match never {},
                Ok(Err(e)) => {
                    error!("Error in River connection: {e}");
                    e.to_string()
                }
                Err(payload) => {
                    let message = panic_message(payload.as_ref());
                    error!("River connection worker panicked: {message}");
                    message
                }
            };

            session::terminate(&phase, &commands, &sink, reason);
        })
}

fn connect_and_run(
    options: &SessionOptions,
    sink: &EventSink,
    phase: &PhaseCell,
    commands: &CommandSlot,
) -> Result<Infallible, SessionError> {
    phase.advance(SessionPhase::Connecting);
    debug!(
        "XDG_RUNTIME_DIR={}",
        env::var("XDG_RUNTIME_DIR").unwrap_or_else(|_| "Not set".to_string())
    );
    debug!(
        "WAYLAND_DISPLAY={}",
        env::var("WAYLAND_DISPLAY").unwrap_or_else(|_| "Not set".to_string())
    );

    let mut transport = WaylandTransport::connect()?;
    let mut session = Session::new(sink.clone());
    run_session(&mut transport, &mut session, phase, commands, options)
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "worker panicked".to_string()
    }
}

impl Dispatch<WlRegistry, ()> for Session<Wayland> {
    fn event(
        state: &mut Self,
        proxy: &WlRegistry,
        event: wl_registry::Event,
        _data: &(),
        _conn: &Connection,
        qh: &QueueHandle<Self>,
    ) {
        let mut binder = WaylandBinder {
            registry: proxy.clone(),
            qh: qh.clone(),
        };

        match event {
            wl_registry::Event::Global {
                name,
                interface,
                version,
            } => state.on_global(&mut binder, name, &interface, version),
            wl_registry::Event::GlobalRemove { name } => state.on_global_remove(&mut binder, name),
            _ => {}
        }
    }
}

impl Dispatch<ZriverOutputStatusV1, u32> for Session<Wayland> {
    fn event(
        state: &mut Self,
        _proxy: &ZriverOutputStatusV1,
        event: zriver_output_status_v1::Event,
        output_id: &u32,
        _conn: &Connection,
        _qhandle: &QueueHandle<Self>,
    ) {
        match event {
            zriver_output_status_v1::Event::ViewTags { tags } => {
                state.on_tags(TagKind::View, *output_id, tags::decode_array(&tags))
            }
            zriver_output_status_v1::Event::FocusedTags { tags } => {
                state.on_tags(TagKind::Focused, *output_id, tags::decode(tags))
            }
            zriver_output_status_v1::Event::UrgentTags { tags } => {
                state.on_tags(TagKind::Urgent, *output_id, tags::decode(tags))
            }
            zriver_output_status_v1::Event::LayoutName { name } => {
                state.on_layout_name(*output_id, Some(name))
            }
            zriver_output_status_v1::Event::LayoutNameClear => {
                state.on_layout_name(*output_id, None)
            }
        }
    }
}

impl Dispatch<ZriverSeatStatusV1, ()> for Session<Wayland> {
    fn event(
        state: &mut Self,
        _proxy: &ZriverSeatStatusV1,
        event: zriver_seat_status_v1::Event,
        _data: &(),
        _conn: &Connection,
        _qhandle: &QueueHandle<Self>,
    ) {
        match event {
            zriver_seat_status_v1::Event::FocusedView { title } => state.on_focused_view(title),
            zriver_seat_status_v1::Event::FocusedOutput { output } => {
                state.on_output_focus(&output, true)
            }
            zriver_seat_status_v1::Event::UnfocusedOutput { output } => {
                state.on_output_focus(&output, false)
            }
            zriver_seat_status_v1::Event::Mode { name } => state.on_mode(name),
        }
    }
}

impl Dispatch<ZriverCommandCallbackV1, Arc<CommandInvocation>> for Session<Wayland> {
    fn event(
        state: &mut Self,
        _proxy: &ZriverCommandCallbackV1,
        event: zriver_command_callback_v1::Event,
        invocation: &Arc<CommandInvocation>,
        _conn: &Connection,
        _qhandle: &QueueHandle<Self>,
    ) {
        let outcome = match event {
            zriver_command_callback_v1::Event::Success { output } => {
                debug!(target: "RiverService::Command", "Command success: {output}");
                CommandOutcome::Success(output)
            }
            zriver_command_callback_v1::Event::Failure { failure_message } => {
                debug!(target: "RiverService::Command", "Command failure: {failure_message}");
                CommandOutcome::Failure(failure_message)
            }
        };

        command::complete(invocation, outcome, state.sink());
    }
}

impl Dispatch<ZriverStatusManagerV1, ()> for Session<Wayland> {
    fn event(
        _state: &mut Self,
        _proxy: &ZriverStatusManagerV1,
        _event: <ZriverStatusManagerV1 as Proxy>::Event,
        _data: &(),
        _conn: &Connection,
        _qhandle: &QueueHandle<Self>,
    ) {
    } // This interface has no events.
}

impl Dispatch<ZriverControlV1, ()> for Session<Wayland> {
    fn event(
        _state: &mut Self,
        _proxy: &ZriverControlV1,
        _event: <ZriverControlV1 as Proxy>::Event,
        _data: &(),
        _conn: &Connection,
        _qhandle: &QueueHandle<Self>,
    ) {
    } // This interface has no events.
}

impl Dispatch<WlOutput, ()> for Session<Wayland> {
    fn event(
        _state: &mut Self,
        _proxy: &WlOutput,
        _event: <WlOutput as Proxy>::Event,
        _data: &(),
        _conn: &Connection,
        _qhandle: &QueueHandle<Self>,
    ) {
    }
}

impl Dispatch<WlSeat, ()> for Session<Wayland> {
    fn event(
        _state: &mut Self,
        _proxy: &WlSeat,
        _event: <WlSeat as Proxy>::Event,
        _data: &(),
        _conn: &Connection,
        _qhandle: &QueueHandle<Self>,
    ) {
    }
}
