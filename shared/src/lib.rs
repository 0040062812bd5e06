//! Shared types for the reservation engine
//!
//! Common types used by the server and by presentation-layer clients:
//! error codes, API response structures, domain models and bus messages.

pub mod error;
pub mod message;
pub mod models;
pub mod util;

pub use error::{AppError, AppResult, ErrorCode};
pub use message::{BusMessage, EventType};
