//! Draft Session Model (预约草稿)
//!
//! Per-user in-progress booking data. Drafts expire after a period of
//! inactivity; an expired draft reads as absent.

use serde::{Deserialize, Serialize};

use super::reservation::NewReservation;

/// Field currently being edited by the user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DraftStep {
    Phone,
    Table,
}

/// Typed draft session
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DraftSession {
    pub user_id: i64,
    pub name: Option<String>,
    pub phone: Option<String>,
    pub table: Option<String>,
    pub table_id: Option<String>,
    pub guests: Option<u32>,
    pub date: Option<String>,
    pub time: Option<String>,
    /// Edit cursor
    pub step: Option<DraftStep>,
    /// Last modification (Unix millis)
    pub updated_at: i64,
}

impl DraftSession {
    /// Fresh draft pre-filled with the user's display name
    pub fn start(user_id: i64, name: Option<String>, now: i64) -> Self {
        Self {
            user_id,
            name,
            updated_at: now,
            ..Default::default()
        }
    }

    /// Phone and table chosen; ready for submission
    pub fn is_complete(&self) -> bool {
        has_text(&self.phone) && has_text(&self.table)
    }

    /// Merge a partial update; absent fields are kept
    pub fn apply(&mut self, patch: DraftPatch) {
        if let Some(name) = patch.name {
            self.name = Some(name);
        }
        if let Some(phone) = patch.phone {
            self.phone = Some(phone);
        }
        if let Some(table) = patch.table {
            self.table = Some(table);
        }
        if let Some(table_id) = patch.table_id {
            self.table_id = Some(table_id);
        }
        if let Some(guests) = patch.guests {
            self.guests = Some(guests);
        }
        if let Some(date) = patch.date {
            self.date = Some(date);
        }
        if let Some(time) = patch.time {
            self.time = Some(time);
        }
        if patch.step.is_some() {
            self.step = patch.step;
        }
    }

    pub fn to_new_reservation(&self) -> NewReservation {
        NewReservation {
            user_id: Some(self.user_id),
            name: self.name.clone().unwrap_or_default(),
            phone: self.phone.clone(),
            guests: self.guests.unwrap_or(0),
            table: self.table.clone(),
            table_id: self.table_id.clone(),
            date: self.date.clone(),
            time: self.time.clone(),
        }
    }
}

fn has_text(value: &Option<String>) -> bool {
    value.as_deref().is_some_and(|v| !v.trim().is_empty())
}

/// Partial draft update (PUT /api/drafts/{user_id})
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DraftPatch {
    pub name: Option<String>,
    pub phone: Option<String>,
    pub table: Option<String>,
    pub table_id: Option<String>,
    pub guests: Option<u32>,
    pub date: Option<String>,
    pub time: Option<String>,
    pub step: Option<DraftStep>,
}

/// Result of the table picker
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableSelection {
    pub table: String,
    pub table_id: String,
    pub date: String,
    pub time: String,
    pub guests: u32,
}
