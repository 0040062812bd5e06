//! 事件通道
//!
//! 只承载 `reservation.created` 通知；订阅者以 ReservationStore 为准。

pub mod bus;

pub use bus::EventBus;
pub use shared::message::{BusMessage, EventType, RESERVATION_CREATED_CHANNEL};
