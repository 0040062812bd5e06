//! Notice payloads delivered to users and operators
//!
//! The engine emits typed notices; rendering them into chat messages is
//! the presentation layer's job.

use serde::{Deserialize, Serialize};

use crate::models::ReservationRequest;

/// Who receives a notice
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "id", rename_all = "snake_case")]
pub enum Recipient {
    User(i64),
    Operator(i64),
}

/// Why operators are asked to phone a guest
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallReason {
    /// Guest said they will not come
    Declined,
    /// Guest did not answer the attendance prompt in time
    NoResponse,
}

/// Visit summary carried by user notices
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VisitInfo {
    pub reservation_id: String,
    pub date: String,
    pub time: String,
    pub table: String,
    pub guests: u32,
}

impl From<&ReservationRequest> for VisitInfo {
    fn from(r: &ReservationRequest) -> Self {
        Self {
            reservation_id: r.id.clone(),
            date: r.date.clone(),
            time: r.time.clone(),
            table: r.table.clone(),
            guests: r.guests,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Notice {
    /// Operator approved; booking exists in the backend
    ReservationConfirmed(VisitInfo),
    /// Operator rejected; the user may try another time
    ReservationRejected(VisitInfo),
    /// Cancellation went through
    ReservationCanceled(VisitInfo),
    /// "Will you come?" question sent before the visit
    AttendancePrompt(VisitInfo),
    /// Operator call-back request
    CallGuest {
        reservation_id: String,
        name: String,
        phone: String,
        reason: CallReason,
    },
}

impl Notice {
    pub fn call_guest(r: &ReservationRequest, reason: CallReason) -> Self {
        Notice::CallGuest {
            reservation_id: r.id.clone(),
            name: r.name.clone(),
            phone: r.phone.clone(),
            reason,
        }
    }

    pub fn reservation_id(&self) -> &str {
        match self {
            Notice::ReservationConfirmed(v)
            | Notice::ReservationRejected(v)
            | Notice::ReservationCanceled(v)
            | Notice::AttendancePrompt(v) => &v.reservation_id,
            Notice::CallGuest { reservation_id, .. } => reservation_id,
        }
    }
}
