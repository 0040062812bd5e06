//! Shared test harness: in-memory or on-disk stores, a manual clock and
//! recording fakes for the booking backend and notifier.

#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::NaiveDate;
use parking_lot::Mutex;
use tokio::sync::Notify;
use reserve_server::booking::{BookingBackend, BookingError, BookingRequest};
use reserve_server::core::{Config, LifecycleConfig};
use reserve_server::notify::Notifier;
use reserve_server::scheduler::{JobHandler, JobStorage, ManualClock};
use reserve_server::utils::time::local_to_millis;
use reserve_server::{AppResult, ReservationStorage, ServerState};
use shared::message::{Notice, Recipient};
use shared::models::{OperatorView, ReservationRequest, TableSelection};

pub const GUEST: i64 = 42;
pub const OPERATORS: [i64; 2] = [900, 901];

/// Unix millis of a Moscow wall-clock time
pub fn msk(date: &str, time: &str) -> i64 {
    let naive = NaiveDate::parse_from_str(date, "%Y-%m-%d")
        .unwrap()
        .and_time(chrono::NaiveTime::parse_from_str(time, "%H:%M").unwrap());
    local_to_millis(naive, chrono_tz::Europe::Moscow)
}

pub const MINUTE: i64 = 60_000;

#[derive(Debug, Clone, PartialEq)]
pub enum BookingCall {
    Create(BookingRequest),
    Cancel { reference: String, reason: String },
}

#[derive(Default)]
pub struct FakeBooking {
    pub calls: Mutex<Vec<BookingCall>>,
    pub fail_create: AtomicBool,
    pub reject_create: AtomicBool,
    pub fail_cancel: AtomicBool,
    /// Park `cancel_reservation` until `cancel_release` is notified
    pub hold_cancel: AtomicBool,
    pub cancel_entered: Notify,
    pub cancel_release: Notify,
    issued: AtomicUsize,
}

impl FakeBooking {
    pub fn creates(&self) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|c| matches!(c, BookingCall::Create(_)))
            .count()
    }

    pub fn cancels(&self) -> Vec<(String, String)> {
        self.calls
            .lock()
            .iter()
            .filter_map(|c| match c {
                BookingCall::Cancel { reference, reason } => Some((reference.clone(), reason.clone())),
                _ => None,
            })
            .collect()
    }
}

#[async_trait]
impl BookingBackend for FakeBooking {
    async fn create_reservation(&self, request: &BookingRequest) -> Result<String, BookingError> {
        self.calls.lock().push(BookingCall::Create(request.clone()));
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(BookingError::Timeout);
        }
        if self.reject_create.load(Ordering::SeqCst) {
            return Err(BookingError::Rejected("table is busy".into()));
        }
        let n = self.issued.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(format!("ext-{n}"))
    }

    async fn cancel_reservation(
        &self,
        external_reference: &str,
        reason_code: &str,
    ) -> Result<(), BookingError> {
        self.calls.lock().push(BookingCall::Cancel {
            reference: external_reference.to_string(),
            reason: reason_code.to_string(),
        });
        if self.hold_cancel.load(Ordering::SeqCst) {
            self.cancel_entered.notify_one();
            self.cancel_release.notified().await;
        }
        if self.fail_cancel.load(Ordering::SeqCst) {
            return Err(BookingError::Service("status 502".into()));
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    pub sent: Mutex<Vec<(Recipient, Notice)>>,
    pub refreshed: Mutex<Vec<(i64, OperatorView)>>,
}

impl RecordingNotifier {
    pub fn to_user(&self, user_id: i64) -> Vec<Notice> {
        self.sent
            .lock()
            .iter()
            .filter(|(r, _)| *r == Recipient::User(user_id))
            .map(|(_, n)| n.clone())
            .collect()
    }

    pub fn to_operators(&self) -> Vec<(i64, Notice)> {
        self.sent
            .lock()
            .iter()
            .filter_map(|(r, n)| match r {
                Recipient::Operator(id) => Some((*id, n.clone())),
                _ => None,
            })
            .collect()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, recipient: Recipient, notice: Notice) -> AppResult<()> {
        self.sent.lock().push((recipient, notice));
        Ok(())
    }

    async fn refresh_operator_view(&self, operator_id: i64, view: OperatorView) -> AppResult<()> {
        self.refreshed.lock().push((operator_id, view));
        Ok(())
    }
}

pub fn test_config(work_dir: &str) -> Config {
    let mut config = Config::with_work_dir(work_dir);
    config.timezone = chrono_tz::Europe::Moscow;
    config.operator_ids = OPERATORS.to_vec();
    config.lifecycle = LifecycleConfig::default();
    config.draft_ttl_secs = 1800;
    config.event_channel_capacity = 64;
    config
}

pub struct Harness {
    pub clock: Arc<ManualClock>,
    pub booking: Arc<FakeBooking>,
    pub notifier: Arc<RecordingNotifier>,
    pub state: ServerState,
}

impl Harness {
    fn build(store: ReservationStorage, jobs: JobStorage, work_dir: &str, now: i64) -> Self {
        let clock = Arc::new(ManualClock::new(now));
        let booking = Arc::new(FakeBooking::default());
        let notifier = Arc::new(RecordingNotifier::default());
        let state = ServerState::assemble(
            test_config(work_dir),
            store,
            jobs,
            clock.clone(),
            booking.clone(),
            notifier.clone(),
        );
        Self {
            clock,
            booking,
            notifier,
            state,
        }
    }

    pub fn in_memory(now: i64) -> Self {
        Self::build(
            ReservationStorage::open_in_memory().unwrap(),
            JobStorage::open_in_memory().unwrap(),
            "/tmp/reserve-test",
            now,
        )
    }

    /// Stores backed by files under `dir`; reopening the same dir simulates a restart
    pub fn on_disk(dir: &Path, now: i64) -> Self {
        Self::build(
            ReservationStorage::open(dir.join("reservations.redb")).unwrap(),
            JobStorage::open(dir.join("scheduler.redb")).unwrap(),
            dir.to_str().unwrap(),
            now,
        )
    }

    pub fn set_time(&self, date: &str, time: &str) {
        self.clock.set(msk(date, time));
    }

    pub fn now(&self) -> i64 {
        self.state.scheduler.now()
    }

    /// Dispatch every due job and wait for all of them
    pub async fn run_due(&self) -> usize {
        let handler: Arc<dyn JobHandler> = self.state.controller.clone();
        let handles = self.state.scheduler.dispatch_due(&handler).unwrap();
        let count = handles.len();
        for handle in handles {
            handle.await.unwrap();
        }
        count
    }

    /// Walk the draft flow and submit a request for `date time`
    pub async fn submit(&self, user_id: i64, date: &str, time: &str) -> ReservationRequest {
        let controller = &self.state.controller;
        controller
            .start_draft(user_id, Some("Ivan".into()))
            .await
            .unwrap();
        controller.set_phone(user_id, "+7 900 123-45-67").await.unwrap();
        controller
            .select_table(
                user_id,
                TableSelection {
                    table: "5".into(),
                    table_id: "tbl-5".into(),
                    date: date.into(),
                    time: time.into(),
                    guests: 4,
                },
            )
            .await
            .unwrap();
        controller.submit_draft(user_id).await.unwrap()
    }
}
