use super::{
    events::RiverEvent,
    session::Session,
    state::{Handles, SeatRecord},
};
use log::{debug, info, trace};

/// Globals the session binds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interface {
    StatusManager,
    Control,
    Output,
    Seat,
}

impl Interface {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "zriver_status_manager_v1" => Some(Interface::StatusManager),
            "zriver_control_v1" => Some(Interface::Control),
            "wl_output" => Some(Interface::Output),
            "wl_seat" => Some(Interface::Seat),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Interface::StatusManager => "zriver_status_manager_v1",
            Interface::Control => "zriver_control_v1",
            Interface::Output => "wl_output",
            Interface::Seat => "wl_seat",
        }
    }

    /// Highest version of the interface this crate understands.
    pub fn max_version(self) -> u32 {
        match self {
            Interface::StatusManager => 4,
            Interface::Control => 1,
            Interface::Output => 4,
            Interface::Seat => 7,
        }
    }
}

pub enum Bound<H: Handles> {
    StatusManager(H::StatusManager),
    Control(H::Control),
    Output(H::Output),
    Seat(H::Seat),
}

/// Creates and releases protocol objects on behalf of the session.
pub trait Binder<H: Handles> {
    fn bind(&mut self, interface: Interface, name: u32, version: u32) -> Bound<H>;

    fn output_status(
        &mut self,
        manager: &H::StatusManager,
        output: &H::Output,
        output_id: u32,
    ) -> H::OutputStatus;

    fn seat_status(&mut self, manager: &H::StatusManager, seat: &H::Seat) -> H::SeatStatus;

    fn release_output(&mut self, output: H::Output, status: Option<H::OutputStatus>);
}

impl<H: Handles> Session<H> {
    pub fn on_global<B: Binder<H>>(
        &mut self,
        binder: &mut B,
        name: u32,
        interface: &str,
        version: u32,
    ) {
        let Some(kind) = Interface::from_name(interface) else {
            trace!(target: "RiverService::Registry", "Ignoring global {interface} (v{version}, name={name})");
            return;
        };

        debug!(target: "RiverService::Registry", "Global: {interface} (v{version}, name={name})");

        let state = &self.state;
        let already_bound = match kind {
            Interface::StatusManager => state.status_manager.is_some(),
            Interface::Control => state.control.is_some(),
            Interface::Seat => state.seat.is_some(),
            Interface::Output => false,
        };
        if already_bound {
            debug!(target: "RiverService::Registry", "Ignoring additional {interface} global {name}");
            return;
        }

        let version = version.min(kind.max_version());
        debug!(target: "RiverService::Registry", "Binding {} v{version}", kind.name());
        match binder.bind(kind, name, version) {
            Bound::StatusManager(manager) => {
                info!("Found river status manager");
                self.state.status_manager = Some(manager);
            }
            Bound::Control(control) => {
                info!("Found river control interface");
                self.state.control = Some(control);
            }
            Bound::Output(output) => {
                info!("Found output {name}");
                self.state.insert_output(name, output);
                if self.state.is_wired() {
                    self.wire_output(binder, name);
                }
            }
            Bound::Seat(seat) => {
                info!("Found seat");
                self.state.seat = Some(SeatRecord::new(seat));
                if self.state.is_wired() {
                    self.wire_seat(binder);
                }
            }
        }
    }

    pub fn on_global_remove<B: Binder<H>>(&mut self, binder: &mut B, name: u32) {
        let Some(record) = self.state.remove_output(name) else {
            return;
        };

        info!("Output {name} removed");
        binder.release_output(record.output, record.status);
        self.emit(RiverEvent::OutputRemoved { output_id: name });
    }
}
