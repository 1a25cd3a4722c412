pub mod config;
pub mod services;

pub use services::river::{RiverEvent, RiverService};
