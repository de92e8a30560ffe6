//! Room session lifecycle and coordination

mod coordinator;

pub use coordinator::{CoordinatorState, RoomSession, SessionCoordinator};
