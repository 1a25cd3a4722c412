use std::collections::BTreeMap;

/// Handle types the session stores for bound protocol objects.
///
/// The Wayland implementation uses the generated proxies; tests use plain
/// integers.
pub trait Handles: 'static {
    type StatusManager;
    type Control;
    type Output: PartialEq;
    type OutputStatus;
    type Seat;
    type SeatStatus;
}

pub struct OutputRecord<H: Handles> {
    pub id: u32,
    pub output: H::Output,
    pub status: Option<H::OutputStatus>,
    pub view_tags: Vec<u32>,
    pub focused_tags: Vec<u32>,
    pub urgent_tags: Vec<u32>,
    pub layout_name: Option<String>,
}

impl<H: Handles> OutputRecord<H> {
    pub fn new(id: u32, output: H::Output) -> Self {
        Self {
            id,
            output,
            status: None,
            view_tags: Vec::new(),
            focused_tags: Vec::new(),
            urgent_tags: Vec::new(),
            layout_name: None,
        }
    }
}

pub struct SeatRecord<H: Handles> {
    pub seat: H::Seat,
    pub status: Option<H::SeatStatus>,
    pub focused_window_title: String,
    pub focused_output: Option<u32>,
    pub mode: Option<String>,
}

impl<H: Handles> SeatRecord<H> {
    pub fn new(seat: H::Seat) -> Self {
        Self {
            seat,
            status: None,
            focused_window_title: String::new(),
            focused_output: None,
            mode: None,
        }
    }
}

/// Compositor state as seen by the protocol worker.
pub struct SessionState<H: Handles> {
    ready: bool,
    wired: bool,
    pub outputs: BTreeMap<u32, OutputRecord<H>>,
    pub seat: Option<SeatRecord<H>>,
    pub control: Option<H::Control>,
    pub status_manager: Option<H::StatusManager>,
}

impl<H: Handles> Default for SessionState<H> {
    fn default() -> Self {
        Self {
            ready: false,
            wired: false,
            outputs: BTreeMap::new(),
            seat: None,
            control: None,
            status_manager: None,
        }
    }
}

impl<H: Handles> SessionState<H> {
    pub fn is_ready(&self) -> bool {
        self.ready
    }

    /// Latches readiness. Returns `true` only for the call that flipped it.
    pub fn mark_ready(&mut self) -> bool {
        !std::mem::replace(&mut self.ready, true)
    }

    /// Whether status listeners have been requested for the known objects.
    pub fn is_wired(&self) -> bool {
        self.wired
    }

    pub(super) fn mark_wired(&mut self) {
        self.wired = true;
    }

    pub fn insert_output(&mut self, id: u32, output: H::Output) {
        self.outputs.insert(id, OutputRecord::new(id, output));
    }

    pub fn remove_output(&mut self, id: u32) -> Option<OutputRecord<H>> {
        let record = self.outputs.remove(&id)?;
        if let Some(seat) = &mut self.seat
            && seat.focused_output == Some(id)
        {
            seat.focused_output = None;
        }

        Some(record)
    }

    pub fn output_mut(&mut self, id: u32) -> Option<&mut OutputRecord<H>> {
        self.outputs.get_mut(&id)
    }

    /// Registry name of the output bound as `output`.
    pub fn output_id_of(&self, output: &H::Output) -> Option<u32> {
        self.outputs
            .values()
            .find(|record| record.output == *output)
            .map(|record| record.id)
    }

    #[cfg(test)]
    pub(crate) fn focused_window_title(&self) -> &str {
        self.seat
            .as_ref()
            .map_or("", |seat| seat.focused_window_title.as_str())
    }
}
