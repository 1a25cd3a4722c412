use super::{
    discovery::Binder,
    events::RiverEvent,
    session::{Session, SessionError},
    state::Handles,
};
use log::{debug, info};

/// The three independent tag streams of an output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagKind {
    View,
    Focused,
    Urgent,
}

impl<H: Handles> Session<H> {
    /// Requests status objects for the seat and every known output.
    pub fn wire_listeners<B: Binder<H>>(&mut self, binder: &mut B) -> Result<(), SessionError> {
        if self.state.status_manager.is_none() {
            return Err(SessionError::MissingStatusManager);
        }

        self.wire_seat(binder);

        let ids = self.state.outputs.keys().copied().collect::<Vec<_>>();
        for id in ids {
            self.wire_output(binder, id);
        }

        self.state.mark_wired();
        Ok(())
    }

    pub(super) fn wire_output<B: Binder<H>>(&mut self, binder: &mut B, output_id: u32) {
        let Some(manager) = &self.state.status_manager else {
            return;
        };
        let Some(record) = self.state.outputs.get_mut(&output_id) else {
            return;
        };

        record.status = Some(binder.output_status(manager, &record.output, output_id));
        info!("Set up status for output {output_id}");
    }

    pub(super) fn wire_seat<B: Binder<H>>(&mut self, binder: &mut B) {
        let Some(manager) = &self.state.status_manager else {
            return;
        };
        let Some(seat) = &mut self.state.seat else {
            return;
        };

        seat.status = Some(binder.seat_status(manager, &seat.seat));
        info!("Set up seat status for window tracking");
    }

    pub fn on_tags(&mut self, kind: TagKind, output_id: u32, tags: Vec<u32>) {
        let Some(record) = self.state.output_mut(output_id) else {
            debug!(target: "RiverService::OutputStatus", "Tags for unknown output {output_id}");
            return;
        };

        debug!(target: "RiverService::OutputStatus", "Output {output_id} {kind:?} tags: {tags:?}");
        let event = match kind {
            TagKind::View => {
                record.view_tags.clone_from(&tags);
                RiverEvent::ViewTags { output_id, tags }
            }
            TagKind::Focused => {
                record.focused_tags.clone_from(&tags);
                RiverEvent::FocusedTags { output_id, tags }
            }
            TagKind::Urgent => {
                record.urgent_tags.clone_from(&tags);
                RiverEvent::UrgentTags { output_id, tags }
            }
        };

        self.emit(event);
    }

    pub fn on_layout_name(&mut self, output_id: u32, name: Option<String>) {
        let Some(record) = self.state.output_mut(output_id) else {
            return;
        };

        debug!(target: "RiverService::OutputStatus", "Output {output_id} layout: {name:?}");
        record.layout_name.clone_from(&name);
        self.emit(RiverEvent::LayoutName { output_id, name });
    }

    pub fn on_focused_view(&mut self, title: String) {
        let Some(seat) = &mut self.state.seat else {
            return;
        };

        debug!(target: "RiverService::SeatStatus", "Focused view title: {title}");
        seat.focused_window_title.clone_from(&title);
        self.emit(RiverEvent::ActiveWindow { title });
    }

    pub fn on_mode(&mut self, name: String) {
        let Some(seat) = &mut self.state.seat else {
            return;
        };

        debug!(target: "RiverService::SeatStatus", "Mode: {name}");
        seat.mode = Some(name.clone());
        self.emit(RiverEvent::Mode { name });
    }

    pub fn on_output_focus(&mut self, output: &H::Output, focused: bool) {
        let Some(output_id) = self.state.output_id_of(output) else {
            debug!(target: "RiverService::SeatStatus", "Focus change on an untracked output");
            return;
        };
        let Some(seat) = &mut self.state.seat else {
            return;
        };

        if focused {
            seat.focused_output = Some(output_id);
            self.emit(RiverEvent::FocusedOutput { output_id });
        } else {
            if seat.focused_output == Some(output_id) {
                seat.focused_output = None;
            }
            self.emit(RiverEvent::UnfocusedOutput { output_id });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::river::{
        discovery::Interface,
        testing::{FakeBinder, drain_events, fake_session},
    };
    use pretty_assertions::assert_eq;

    fn wired_session() -> (
        Session<crate::services::river::testing::Fake>,
        tokio::sync::mpsc::UnboundedReceiver<crate::services::river::events::Deferred>,
        FakeBinder,
    ) {
        let (mut session, rx) = fake_session();
        let mut binder = FakeBinder::default();
        session.on_global(&mut binder, 1, Interface::StatusManager.name(), 4);
        session.on_global(&mut binder, 3, Interface::Seat.name(), 7);
        session.on_global(&mut binder, 7, Interface::Output.name(), 4);
        session.on_global(&mut binder, 8, Interface::Output.name(), 4);
        session.wire_listeners(&mut binder).unwrap();
        (session, rx, binder)
    }

    #[test]
    fn every_output_gets_its_own_status() {
        let (session, _rx, binder) = wired_session();

        assert_eq!(
            session.state.outputs[&7].status,
            Some(FakeBinder::output_status_of(7))
        );
        assert_eq!(
            session.state.outputs[&8].status,
            Some(FakeBinder::output_status_of(8))
        );
        assert_eq!(binder.output_statuses, vec![7, 8]);
        assert!(session.state.seat.as_ref().is_some_and(|seat| seat.status.is_some()));
        assert!(session.state.is_wired());
    }

    #[test]
    fn wiring_requires_status_manager() {
        let (mut session, _rx) = fake_session();
        let mut binder = FakeBinder::default();
        session.on_global(&mut binder, 7, Interface::Output.name(), 4);

        assert!(matches!(
            session.wire_listeners(&mut binder),
            Err(SessionError::MissingStatusManager)
        ));
        assert!(binder.output_statuses.is_empty());
    }

    #[test]
    fn tag_streams_are_independent() {
        let (mut session, mut rx, _binder) = wired_session();

        session.on_tags(TagKind::Focused, 7, vec![1]);
        session.on_tags(TagKind::Urgent, 8, vec![4]);

        let record = &session.state.outputs[&7];
        assert_eq!(record.focused_tags, vec![1]);
        assert!(record.view_tags.is_empty());
        assert!(record.urgent_tags.is_empty());
        assert_eq!(session.state.outputs[&8].urgent_tags, vec![4]);
        assert_eq!(
            drain_events(&mut rx),
            vec![
                RiverEvent::FocusedTags {
                    output_id: 7,
                    tags: vec![1]
                },
                RiverEvent::UrgentTags {
                    output_id: 8,
                    tags: vec![4]
                },
            ]
        );
    }

    #[test]
    fn tags_for_removed_output_are_dropped() {
        let (mut session, mut rx, mut binder) = wired_session();
        session.on_global_remove(&mut binder, 8);
        drain_events(&mut rx);

        session.on_tags(TagKind::View, 8, vec![2]);

        assert!(drain_events(&mut rx).is_empty());
    }

    #[test]
    fn focused_view_updates_title() {
        let (mut session, mut rx, _binder) = wired_session();

        session.on_focused_view("nvim".to_string());

        assert_eq!(session.state.focused_window_title(), "nvim");
        assert_eq!(
            drain_events(&mut rx),
            vec![RiverEvent::ActiveWindow {
                title: "nvim".to_string()
            }]
        );
    }

    #[test]
    fn seat_focus_and_mode_are_tracked() {
        let (mut session, mut rx, _binder) = wired_session();

        session.on_output_focus(&FakeBinder::output_handle_of(8), true);
        session.on_mode("locked".to_string());
        session.on_output_focus(&FakeBinder::output_handle_of(8), false);
        session.on_output_focus(&12345, true);

        let seat = session.state.seat.as_ref().unwrap();
        assert_eq!(seat.focused_output, None);
        assert_eq!(seat.mode.as_deref(), Some("locked"));
        assert_eq!(
            drain_events(&mut rx),
            vec![
                RiverEvent::FocusedOutput { output_id: 8 },
                RiverEvent::Mode {
                    name: "locked".to_string()
                },
                RiverEvent::UnfocusedOutput { output_id: 8 },
            ]
        );
    }

    #[test]
    fn layout_name_is_set_and_cleared() {
        let (mut session, mut rx, _binder) = wired_session();

        session.on_layout_name(7, Some("rivertile".to_string()));
        assert_eq!(
            session.state.outputs[&7].layout_name.as_deref(),
            Some("rivertile")
        );
        session.on_layout_name(7, None);
        assert_eq!(session.state.outputs[&7].layout_name, None);

        assert_eq!(
            drain_events(&mut rx),
            vec![
                RiverEvent::LayoutName {
                    output_id: 7,
                    name: Some("rivertile".to_string())
                },
                RiverEvent::LayoutName {
                    output_id: 7,
                    name: None
                },
            ]
        );
    }
}
