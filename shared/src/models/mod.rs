//! Data models
//!
//! Shared between the server and presentation-layer clients (via API).
//! Reservation ids are opaque UUID strings; timestamps are Unix millis.

pub mod draft;
pub mod operator_view;
pub mod reservation;

// Re-exports
pub use draft::*;
pub use operator_view::*;
pub use reservation::*;
