//! Scheduled job records

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Kind of deferred job; at most one live job per (reservation, kind)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobKind {
    /// Ask the guest whether they will come
    ConfirmationPrompt,
    /// Give up waiting for the guest's answer
    ConfirmationTimeout,
}

impl JobKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobKind::ConfirmationPrompt => "CONFIRMATION_PROMPT",
            JobKind::ConfirmationTimeout => "CONFIRMATION_TIMEOUT",
        }
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Durable storage key of a job slot
pub fn job_key(reservation_id: &str, kind: JobKind) -> String {
    format!("{}:{}", reservation_id, kind.as_str())
}

/// Durable deferred unit of work
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduledJob {
    /// Distinguishes a job from whatever later supersedes it in the same slot
    pub id: Uuid,
    pub kind: JobKind,
    pub reservation_id: String,
    /// Unix millis
    pub fire_at: i64,
    #[serde(default)]
    pub payload: serde_json::Value,
    pub created_at: i64,
}

impl ScheduledJob {
    pub fn new(
        kind: JobKind,
        reservation_id: impl Into<String>,
        fire_at: i64,
        payload: serde_json::Value,
        created_at: i64,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            reservation_id: reservation_id.into(),
            fire_at,
            payload,
            created_at,
        }
    }

    pub fn key(&self) -> String {
        job_key(&self.reservation_id, self.kind)
    }

    pub fn handle(&self) -> JobHandle {
        JobHandle {
            id: self.id,
            kind: self.kind,
            reservation_id: self.reservation_id.clone(),
            fire_at: self.fire_at,
        }
    }
}

/// Reference to one scheduled job, returned by `Scheduler::schedule`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobHandle {
    pub id: Uuid,
    pub kind: JobKind,
    pub reservation_id: String,
    pub fire_at: i64,
}

impl JobHandle {
    pub fn key(&self) -> String {
        job_key(&self.reservation_id, self.kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_key() {
        let job = ScheduledJob::new(JobKind::ConfirmationTimeout, "r-1", 10, serde_json::Value::Null, 0);
        assert_eq!(job.key(), "r-1:CONFIRMATION_TIMEOUT");
        assert_eq!(job.handle().key(), job.key());
    }

    #[test]
    fn test_job_kind_serialize() {
        let json = serde_json::to_string(&JobKind::ConfirmationPrompt).unwrap();
        assert_eq!(json, "\"CONFIRMATION_PROMPT\"");
    }
}
