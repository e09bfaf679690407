//! Shared state services: presence store, connection registry, rooms,
//! disconnect reconciliation.

pub mod presence;
pub mod reconciler;
pub mod registry;
pub mod rooms;

pub use presence::PresenceStore;
pub use registry::ConnectionRegistry;
pub use rooms::RoomManager;
