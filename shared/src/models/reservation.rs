//! Reservation Model (预约)

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{AppError, AppResult};

/// Date format of `ReservationRequest::date`
pub const DATE_FORMAT: &str = "%Y-%m-%d";
/// Time format of `ReservationRequest::time`
pub const TIME_FORMAT: &str = "%H:%M";

/// Persisted reservation status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReservationStatus {
    Pending,
    Confirmed,
    Declined,
    NoResponse,
    Canceled,
    Rejected,
}

impl ReservationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Confirmed => "CONFIRMED",
            Self::Declined => "DECLINED",
            Self::NoResponse => "NO_RESPONSE",
            Self::Canceled => "CANCELED",
            Self::Rejected => "REJECTED",
        }
    }
}

impl fmt::Display for ReservationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pre-visit confirmation sub-state, meaningful while CONFIRMED
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConfirmationStatus {
    #[default]
    None,
    Waiting,
    Confirmed,
    Declined,
    NoResponse,
}

/// State machine view of a reservation
///
/// Derived from `(status, confirmation_status)`; WAITING_CONFIRMATION is a
/// CONFIRMED record whose confirmation dialogue is open.
///
/// ```text
/// PENDING ──▶ CONFIRMED ──▶ WAITING_CONFIRMATION ──▶ CONFIRMED | DECLINED | NO_RESPONSE
///    │            │
///    ▼            ▼
/// REJECTED     CANCELED
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LifecycleState {
    Pending,
    Confirmed,
    WaitingConfirmation,
    Declined,
    NoResponse,
    Canceled,
    Rejected,
}

impl LifecycleState {
    /// CANCELED and REJECTED have no outgoing edges
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Canceled | Self::Rejected)
    }

    /// Whether `self -> next` is one of the directed lifecycle edges
    pub fn can_transition_to(&self, next: LifecycleState) -> bool {
        use LifecycleState::*;
        matches!(
            (self, next),
            (Pending, Confirmed)
                | (Pending, Rejected)
                | (Confirmed, WaitingConfirmation)
                | (Confirmed, Canceled)
                | (WaitingConfirmation, Confirmed)
                | (WaitingConfirmation, Declined)
                | (WaitingConfirmation, NoResponse)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Confirmed => "CONFIRMED",
            Self::WaitingConfirmation => "WAITING_CONFIRMATION",
            Self::Declined => "DECLINED",
            Self::NoResponse => "NO_RESPONSE",
            Self::Canceled => "CANCELED",
            Self::Rejected => "REJECTED",
        }
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reservation request record
///
/// This is also the payload of the `reservation.created` bus channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReservationRequest {
    pub id: String,
    /// Chat user that submitted the request
    pub user_id: i64,
    #[serde(default)]
    pub name: String,
    pub phone: String,
    #[serde(default)]
    pub guests: u32,
    /// Table number as shown to the guest
    pub table: String,
    /// Table identifier in the booking backend
    #[serde(default)]
    pub table_id: String,
    /// YYYY-MM-DD
    pub date: String,
    /// HH:MM
    pub time: String,
    pub status: ReservationStatus,
    #[serde(default)]
    pub confirmation_status: ConfirmationStatus,
    /// Booking backend reference, set once CONFIRMED
    pub external_reference: Option<String>,
    /// Unix millis
    pub created_at: i64,
}

impl ReservationRequest {
    pub fn lifecycle_state(&self) -> LifecycleState {
        match self.status {
            ReservationStatus::Pending => LifecycleState::Pending,
            ReservationStatus::Confirmed => match self.confirmation_status {
                ConfirmationStatus::Waiting => LifecycleState::WaitingConfirmation,
                _ => LifecycleState::Confirmed,
            },
            ReservationStatus::Declined => LifecycleState::Declined,
            ReservationStatus::NoResponse => LifecycleState::NoResponse,
            ReservationStatus::Canceled => LifecycleState::Canceled,
            ReservationStatus::Rejected => LifecycleState::Rejected,
        }
    }

    /// Move the record along one lifecycle edge.
    ///
    /// Returns false and leaves the record untouched if `next` is not
    /// reachable from the current state.
    pub fn transition(&mut self, next: LifecycleState, external_reference: Option<String>) -> bool {
        let current = self.lifecycle_state();
        if !current.can_transition_to(next) {
            return false;
        }

        match next {
            LifecycleState::Confirmed => {
                self.status = ReservationStatus::Confirmed;
                self.confirmation_status = if current == LifecycleState::WaitingConfirmation {
                    ConfirmationStatus::Confirmed
                } else {
                    ConfirmationStatus::None
                };
            }
            LifecycleState::WaitingConfirmation => {
                self.confirmation_status = ConfirmationStatus::Waiting;
            }
            LifecycleState::Declined => {
                self.status = ReservationStatus::Declined;
                self.confirmation_status = ConfirmationStatus::Declined;
            }
            LifecycleState::NoResponse => {
                self.status = ReservationStatus::NoResponse;
                self.confirmation_status = ConfirmationStatus::NoResponse;
            }
            LifecycleState::Canceled => self.status = ReservationStatus::Canceled,
            LifecycleState::Rejected => self.status = ReservationStatus::Rejected,
            LifecycleState::Pending => return false,
        }

        if let Some(reference) = external_reference {
            self.external_reference = Some(reference);
        }
        true
    }

    /// Local (wall clock) date and time of the visit
    pub fn visit_datetime(&self) -> AppResult<NaiveDateTime> {
        let date = parse_date(&self.date)?;
        let time = parse_time(&self.time)?;
        Ok(date.and_time(time))
    }
}

/// Fields supplied when a draft is submitted
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewReservation {
    pub user_id: Option<i64>,
    #[serde(default)]
    pub name: String,
    pub phone: Option<String>,
    #[serde(default)]
    pub guests: u32,
    pub table: Option<String>,
    pub table_id: Option<String>,
    pub date: Option<String>,
    pub time: Option<String>,
}

impl NewReservation {
    /// Validate required fields and build a PENDING record
    pub fn into_record(self, id: String, created_at: i64) -> AppResult<ReservationRequest> {
        let user_id = self.user_id.ok_or_else(|| AppError::required_field("user_id"))?;
        let phone = required(self.phone, "phone")?;
        let table = required(self.table, "table")?;
        let date = required(self.date, "date")?;
        let time = required(self.time, "time")?;
        parse_date(&date)?;
        parse_time(&time)?;

        Ok(ReservationRequest {
            id,
            user_id,
            name: self.name.trim().to_string(),
            phone,
            guests: self.guests,
            table,
            table_id: self.table_id.unwrap_or_default(),
            date,
            time,
            status: ReservationStatus::Pending,
            confirmation_status: ConfirmationStatus::None,
            external_reference: None,
            created_at,
        })
    }
}

fn required(value: Option<String>, field: &str) -> AppResult<String> {
    match value.map(|v| v.trim().to_string()) {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(AppError::required_field(field)),
    }
}

/// 解析日期字符串 (YYYY-MM-DD)
pub fn parse_date(date: &str) -> AppResult<NaiveDate> {
    NaiveDate::parse_from_str(date, DATE_FORMAT)
        .map_err(|_| AppError::validation(format!("Invalid date format: {}", date)))
}

/// 解析时间字符串 (HH:MM)
pub fn parse_time(time: &str) -> AppResult<NaiveTime> {
    NaiveTime::parse_from_str(time, TIME_FORMAT)
        .map_err(|_| AppError::validation(format!("Invalid time format: {}", time)))
}
