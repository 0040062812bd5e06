//! Reservation records, drafts and the lifecycle state machine

pub mod lifecycle;
pub mod storage;

pub use lifecycle::{LifecycleController, LifecycleSettings};
pub use storage::ReservationStorage;
