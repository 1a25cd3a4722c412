pub mod river;

/// A service whose state is driven by events from an external source.
pub trait ReadOnlyService {
    type UpdateEvent;

    fn update(&mut self, event: Self::UpdateEvent);
}

/// A service that also accepts commands.
pub trait Service: ReadOnlyService {
    type Command;
    type Output;

    fn command(&mut self, command: Self::Command) -> Self::Output;
}
