//! Data models for presence records and wire events.

pub mod event;
pub mod presence;

pub use event::*;
pub use presence::*;
