//! 预约生命周期控制器
//!
//! 所有状态变更都通过 `compare_and_set_status` 完成，"From" 状态作为期望值。
//! CAS 失败即冲突，不产生任何副作用。唯一例外是取消：外部预订已取消后，
//! 本地记录无论处于什么状态都会被删除。
//!
//! ```text
//! PENDING ──approve──▶ CONFIRMED ──prompt job──▶ WAITING_CONFIRMATION
//!    │                  │    ▲                        │   │   │
//!    └─reject─▶ REJECTED│    └──────── confirm ───────┘   │   │
//!                       │                      decline ───┘   └── timeout job
//!                       └─cancel─▶ CANCELED      ▼                   ▼
//!                                              DECLINED          NO_RESPONSE
//! ```
//!
//! 定时任务通过 [`JobHandler`] 回到控制器，和用户/管理员触发的转换走同一条路径。

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono_tz::Tz;
use serde_json::json;
use shared::message::{BusMessage, CallReason, Notice, Recipient, VisitInfo};
use shared::models::{
    DraftPatch, DraftSession, DraftStep, LifecycleState, ReservationRequest, ReservationStatus,
    TableSelection, parse_date, parse_time,
};

use super::storage::ReservationStorage;
use crate::audit_log;
use crate::booking::{BookingBackend, BookingRequest, CANCEL_REASON_COMPENSATION, CANCEL_REASON_GUEST};
use crate::core::Config;
use crate::message::EventBus;
use crate::notify::Notifier;
use crate::scheduler::{JobHandler, JobKind, ScheduledJob, Scheduler};
use crate::utils::retry::with_store_retry;
use crate::utils::{AppError, AppResult, time};

/// 控制器时间参数
#[derive(Debug, Clone)]
pub struct LifecycleSettings {
    pub timezone: Tz,
    pub prompt_lead_minutes: i64,
    pub response_timeout_minutes: i64,
    pub draft_ttl: Duration,
    pub operator_ids: Vec<i64>,
}

impl LifecycleSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            timezone: config.timezone,
            prompt_lead_minutes: config.lifecycle.prompt_lead_minutes,
            response_timeout_minutes: config.lifecycle.response_timeout_minutes,
            draft_ttl: config.draft_ttl(),
            operator_ids: config.operator_ids.clone(),
        }
    }
}

pub struct LifecycleController {
    store: ReservationStorage,
    scheduler: Scheduler,
    bus: EventBus,
    booking: Arc<dyn BookingBackend>,
    notifier: Arc<dyn Notifier>,
    settings: LifecycleSettings,
}

impl std::fmt::Debug for LifecycleController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LifecycleController")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl LifecycleController {
    pub fn new(
        store: ReservationStorage,
        scheduler: Scheduler,
        bus: EventBus,
        booking: Arc<dyn BookingBackend>,
        notifier: Arc<dyn Notifier>,
        settings: LifecycleSettings,
    ) -> Self {
        Self {
            store,
            scheduler,
            bus,
            booking,
            notifier,
            settings,
        }
    }

    pub fn store(&self) -> &ReservationStorage {
        &self.store
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn settings(&self) -> &LifecycleSettings {
        &self.settings
    }

    fn now(&self) -> i64 {
        self.scheduler.now()
    }

    pub fn is_operator(&self, user_id: i64) -> bool {
        self.settings.operator_ids.contains(&user_id)
    }

    // ========== Queries ==========

    pub async fn get(&self, id: &str) -> AppResult<ReservationRequest> {
        with_store_retry("get_reservation", || Ok(self.store.get(id)?)).await
    }

    /// Requests awaiting an operator decision, oldest first
    pub async fn list_pending(&self) -> AppResult<Vec<ReservationRequest>> {
        with_store_retry("list_pending", || {
            Ok(self
                .store
                .list_by_predicate(|r| r.lifecycle_state() == LifecycleState::Pending)?)
        })
        .await
    }

    /// DECLINED and NO_RESPONSE reservations operators must phone about
    pub async fn list_follow_up(&self) -> AppResult<Vec<ReservationRequest>> {
        with_store_retry("list_follow_up", || {
            Ok(self.store.list_by_predicate(|r| {
                matches!(
                    r.status,
                    ReservationStatus::Declined | ReservationStatus::NoResponse
                )
            })?)
        })
        .await
    }

    /// A user's cancellable reservations
    ///
    /// Records awaiting an attendance answer are left out; the guest
    /// answers the prompt before they can cancel.
    pub async fn list_for_user(&self, user_id: i64) -> AppResult<Vec<ReservationRequest>> {
        with_store_retry("list_for_user", || {
            Ok(self.store.list_by_predicate(|r| {
                r.user_id == user_id && r.lifecycle_state() == LifecycleState::Confirmed
            })?)
        })
        .await
    }

    // ========== Drafts ==========

    pub async fn get_draft(&self, user_id: i64) -> AppResult<Option<DraftSession>> {
        let now = self.now();
        with_store_retry("get_draft", || Ok(self.store.get_draft(user_id, now)?)).await
    }

    async fn save_draft(&self, mut draft: DraftSession) -> AppResult<DraftSession> {
        let now = self.now();
        draft.updated_at = now;
        let ttl = self.settings.draft_ttl;
        with_store_retry("set_draft", || Ok(self.store.set_draft(&draft, ttl, now)?)).await?;
        Ok(draft)
    }

    async fn load_or_start_draft(&self, user_id: i64) -> AppResult<DraftSession> {
        match self.get_draft(user_id).await? {
            Some(draft) => Ok(draft),
            None => Ok(DraftSession::start(user_id, None, self.now())),
        }
    }

    /// Reset the user's draft, pre-filled with their display name
    pub async fn start_draft(&self, user_id: i64, name: Option<String>) -> AppResult<DraftSession> {
        let draft = DraftSession::start(user_id, name, self.now());
        self.save_draft(draft).await
    }

    pub async fn update_draft(&self, user_id: i64, patch: DraftPatch) -> AppResult<DraftSession> {
        if let Some(date) = patch.date.as_deref() {
            parse_date(date)?;
        }
        if let Some(time) = patch.time.as_deref() {
            parse_time(time)?;
        }
        let mut draft = self.load_or_start_draft(user_id).await?;
        draft.apply(patch);
        self.save_draft(draft).await
    }

    pub async fn set_phone(&self, user_id: i64, phone: &str) -> AppResult<DraftSession> {
        let phone = phone.trim();
        if phone.is_empty() {
            return Err(AppError::required_field("phone"));
        }
        let mut draft = self.load_or_start_draft(user_id).await?;
        draft.phone = Some(phone.to_string());
        draft.step = None;
        self.save_draft(draft).await
    }

    /// Apply a table picker result
    pub async fn select_table(&self, user_id: i64, selection: TableSelection) -> AppResult<DraftSession> {
        parse_date(&selection.date)?;
        parse_time(&selection.time)?;

        let mut draft = self.load_or_start_draft(user_id).await?;
        draft.table = Some(selection.table);
        draft.table_id = Some(selection.table_id);
        draft.date = Some(selection.date);
        draft.time = Some(selection.time);
        draft.guests = Some(selection.guests);
        draft.step = None;
        self.save_draft(draft).await
    }

    /// Mark which field the user is editing
    pub async fn begin_edit(&self, user_id: i64, step: DraftStep) -> AppResult<DraftSession> {
        let mut draft = self.load_or_start_draft(user_id).await?;
        draft.step = Some(step);
        self.save_draft(draft).await
    }

    pub async fn clear_draft(&self, user_id: i64) -> AppResult<()> {
        with_store_retry("clear_draft", || Ok(self.store.clear_draft(user_id)?)).await
    }

    /// Turn the user's draft into a PENDING reservation
    pub async fn submit_draft(&self, user_id: i64) -> AppResult<ReservationRequest> {
        let draft = self
            .get_draft(user_id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("Draft for user {}", user_id)))?;
        if !draft.is_complete() {
            return Err(AppError::draft_incomplete("Phone and table must be chosen first"));
        }

        let fields = draft.to_new_reservation();
        let now = self.now();
        let record =
            with_store_retry("create_reservation", || self.store.create(fields.clone(), now)).await?;

        if let Err(e) = self.clear_draft(user_id).await {
            tracing::warn!(user_id, error = %e, "Failed to clear submitted draft");
        }

        match BusMessage::reservation_created(&record) {
            Ok(msg) => self.bus.publish(msg.with_source("lifecycle")),
            Err(e) => tracing::error!(reservation_id = %record.id, error = %e, "Failed to encode creation event"),
        }

        tracing::info!(
            reservation_id = %record.id,
            user_id,
            date = %record.date,
            time = %record.time,
            table = %record.table,
            "Reservation request submitted"
        );
        audit_log!(user_id, "reservation.submit", record.id);
        Ok(record)
    }

    // ========== Operator decisions ==========

    async fn transition(
        &self,
        op: &'static str,
        id: &str,
        from: LifecycleState,
        to: LifecycleState,
        external_reference: Option<&str>,
    ) -> AppResult<bool> {
        with_store_retry(op, || {
            Ok(self
                .store
                .compare_and_set_status(id, from, to, external_reference)?)
        })
        .await
    }

    fn conflict(record: &ReservationRequest, expected: LifecycleState) -> AppError {
        AppError::conflict(format!(
            "Reservation {} is {}, expected {}",
            record.id,
            record.lifecycle_state(),
            expected
        ))
        .with_detail("reservation_id", record.id.clone())
        .with_detail("state", record.lifecycle_state().as_str())
    }

    /// Operator approves a PENDING request
    ///
    /// The external booking is created first; if another decision wins the
    /// race before the CAS, that booking is canceled again.
    pub async fn approve(&self, id: &str) -> AppResult<ReservationRequest> {
        let record = self.get(id).await?;
        if record.lifecycle_state() != LifecycleState::Pending {
            return Err(Self::conflict(&record, LifecycleState::Pending));
        }

        let reference = self
            .booking
            .create_reservation(&BookingRequest::from(&record))
            .await
            .map_err(|e| {
                tracing::warn!(reservation_id = %id, error = %e, "Booking backend refused approval");
                AppError::from(e)
            })?;

        let applied = self
            .transition(
                "approve",
                id,
                LifecycleState::Pending,
                LifecycleState::Confirmed,
                Some(reference.as_str()),
            )
            .await?;

        if !applied {
            tracing::warn!(
                reservation_id = %id,
                external_reference = %reference,
                "Approval lost a race, canceling external booking"
            );
            if let Err(e) = self
                .booking
                .cancel_reservation(&reference, CANCEL_REASON_COMPENSATION)
                .await
            {
                tracing::error!(
                    reservation_id = %id,
                    external_reference = %reference,
                    error = %e,
                    "Compensating cancel failed, external booking left behind"
                );
            }
            return Err(AppError::conflict(format!("Reservation {} was decided concurrently", id))
                .with_detail("reservation_id", id));
        }

        let confirmed = self.get(id).await?;
        self.arm_prompt(&confirmed).await;

        tracing::info!(reservation_id = %id, external_reference = %reference, "Reservation confirmed");
        audit_log!("operator", "reservation.approve", id, reference);

        self.notify(Recipient::User(confirmed.user_id), Notice::ReservationConfirmed(VisitInfo::from(&confirmed)))
            .await;
        Ok(confirmed)
    }

    /// Schedule the attendance prompt `prompt_lead_minutes` before the visit
    async fn arm_prompt(&self, record: &ReservationRequest) {
        let visit_at = match time::visit_millis(record, self.settings.timezone) {
            Ok(at) => at,
            Err(e) => {
                tracing::error!(reservation_id = %record.id, error = %e, "Invalid visit time, prompt not armed");
                return;
            }
        };
        let now = self.now();
        let fire_at = time::prompt_fire_at(visit_at, self.settings.prompt_lead_minutes, now);

        match self
            .scheduler
            .schedule(fire_at, JobKind::ConfirmationPrompt, &record.id, json!({}))
            .await
        {
            Ok(handle) => tracing::debug!(
                reservation_id = %record.id,
                fire_at = handle.fire_at,
                immediate = fire_at == now,
                "Confirmation prompt armed"
            ),
            Err(e) => tracing::error!(
                reservation_id = %record.id,
                error = %e,
                "Failed to arm confirmation prompt"
            ),
        }
    }

    /// Operator rejects a PENDING request; the record is removed
    pub async fn reject(&self, id: &str) -> AppResult<()> {
        let record = self.get(id).await?;
        let applied = self
            .transition("reject", id, LifecycleState::Pending, LifecycleState::Rejected, None)
            .await?;
        if !applied {
            let current = self.get(id).await?;
            return Err(Self::conflict(&current, LifecycleState::Pending));
        }

        with_store_retry("delete_reservation", || Ok(self.store.delete(id)?)).await?;

        tracing::info!(reservation_id = %id, "Reservation rejected");
        audit_log!("operator", "reservation.reject", id);

        self.notify(Recipient::User(record.user_id), Notice::ReservationRejected(VisitInfo::from(&record)))
            .await;
        Ok(())
    }

    // ========== Guest actions ==========

    fn ensure_owner(record: &ReservationRequest, user_id: i64) -> AppResult<()> {
        if record.user_id != user_id {
            return Err(AppError::not_owned(&record.id));
        }
        Ok(())
    }

    /// Guest cancels a CONFIRMED reservation
    ///
    /// The prompt job is disarmed before the backend call so no scheduled
    /// transition can move the record while the external booking is being
    /// canceled. Once the backend cancel succeeds the local record is always
    /// removed, even if its state moved in the meantime.
    pub async fn cancel(&self, id: &str, user_id: i64) -> AppResult<()> {
        let record = self.get(id).await?;
        Self::ensure_owner(&record, user_id)?;
        if record.lifecycle_state() != LifecycleState::Confirmed {
            return Err(Self::conflict(&record, LifecycleState::Confirmed));
        }

        let prompt_disarmed = self
            .scheduler
            .cancel_kind(id, JobKind::ConfirmationPrompt)
            .await?;

        // The prompt may have fired between the first read and the disarm
        let record = self.get(id).await?;
        if record.lifecycle_state() != LifecycleState::Confirmed {
            return Err(Self::conflict(&record, LifecycleState::Confirmed));
        }

        let reference = record
            .external_reference
            .as_deref()
            .ok_or_else(|| AppError::internal(format!("Reservation {} has no external reference", id)))?;

        if let Err(e) = self
            .booking
            .cancel_reservation(reference, CANCEL_REASON_GUEST)
            .await
        {
            tracing::warn!(reservation_id = %id, error = %e, "Booking backend refused cancellation");
            if prompt_disarmed {
                self.arm_prompt(&record).await;
            }
            return Err(e.into());
        }

        let applied = self
            .transition("cancel", id, LifecycleState::Confirmed, LifecycleState::Canceled, None)
            .await?;
        if !applied {
            tracing::warn!(
                reservation_id = %id,
                external_reference = %reference,
                "State changed during cancellation, removing record anyway"
            );
        }

        with_store_retry("delete_reservation", || Ok(self.store.delete(id)?)).await?;
        self.disarm(id, JobKind::ConfirmationPrompt).await;
        self.disarm(id, JobKind::ConfirmationTimeout).await;

        tracing::info!(reservation_id = %id, user_id, "Reservation canceled");
        audit_log!(user_id, "reservation.cancel", id, reference);

        self.notify(Recipient::User(user_id), Notice::ReservationCanceled(VisitInfo::from(&record)))
            .await;
        Ok(())
    }

    /// Guest answers the attendance prompt
    pub async fn respond_attendance(&self, id: &str, user_id: i64, attending: bool) -> AppResult<()> {
        if attending {
            self.confirm_attendance(id, user_id).await
        } else {
            self.decline_attendance(id, user_id).await
        }
    }

    pub async fn confirm_attendance(&self, id: &str, user_id: i64) -> AppResult<()> {
        let record = self.get(id).await?;
        Self::ensure_owner(&record, user_id)?;

        let applied = self
            .transition(
                "confirm_attendance",
                id,
                LifecycleState::WaitingConfirmation,
                LifecycleState::Confirmed,
                None,
            )
            .await?;
        if !applied {
            let current = self.get(id).await?;
            return Err(Self::conflict(&current, LifecycleState::WaitingConfirmation));
        }

        self.disarm(id, JobKind::ConfirmationTimeout).await;
        tracing::info!(reservation_id = %id, user_id, "Guest confirmed attendance");
        audit_log!(user_id, "attendance.confirm", id);
        Ok(())
    }

    /// Guest will not come; the external booking is kept for manual follow-up
    pub async fn decline_attendance(&self, id: &str, user_id: i64) -> AppResult<()> {
        let record = self.get(id).await?;
        Self::ensure_owner(&record, user_id)?;

        let applied = self
            .transition(
                "decline_attendance",
                id,
                LifecycleState::WaitingConfirmation,
                LifecycleState::Declined,
                None,
            )
            .await?;
        if !applied {
            let current = self.get(id).await?;
            return Err(Self::conflict(&current, LifecycleState::WaitingConfirmation));
        }

        self.disarm(id, JobKind::ConfirmationTimeout).await;
        tracing::info!(reservation_id = %id, user_id, "Guest declined attendance");
        audit_log!(user_id, "attendance.decline", id);

        self.notify_operators(Notice::call_guest(&record, CallReason::Declined)).await;
        Ok(())
    }

    // ========== Scheduled jobs ==========

    async fn on_prompt_due(&self, job: &ScheduledJob) -> AppResult<()> {
        let id = job.reservation_id.as_str();
        let applied = self
            .transition(
                "prompt",
                id,
                LifecycleState::Confirmed,
                LifecycleState::WaitingConfirmation,
                None,
            )
            .await?;

        if !applied {
            // Re-run after a crash between the transition and arming the timeout
            let Some(current) = with_store_retry("get_reservation", || Ok(self.store.find(id)?)).await? else {
                tracing::debug!(reservation_id = %id, "Prompt skipped, reservation gone");
                return Ok(());
            };
            if current.lifecycle_state() == LifecycleState::WaitingConfirmation
                && self.scheduler.find(id, JobKind::ConfirmationTimeout)?.is_none()
            {
                tracing::warn!(reservation_id = %id, "Waiting without timeout, re-arming");
                self.arm_timeout(id).await?;
            } else {
                tracing::debug!(reservation_id = %id, state = %current.lifecycle_state(), "Prompt skipped");
            }
            return Ok(());
        }

        self.arm_timeout(id).await?;
        let record = self.get(id).await?;
        tracing::info!(reservation_id = %id, user_id = record.user_id, "Attendance prompt sent");
        self.notify(Recipient::User(record.user_id), Notice::AttendancePrompt(VisitInfo::from(&record)))
            .await;
        Ok(())
    }

    async fn arm_timeout(&self, id: &str) -> AppResult<()> {
        let fire_at = time::after_minutes(self.now(), self.settings.response_timeout_minutes);
        self.scheduler
            .schedule(fire_at, JobKind::ConfirmationTimeout, id, json!({}))
            .await?;
        Ok(())
    }

    async fn on_timeout_due(&self, job: &ScheduledJob) -> AppResult<()> {
        let id = job.reservation_id.as_str();
        let applied = self
            .transition(
                "timeout",
                id,
                LifecycleState::WaitingConfirmation,
                LifecycleState::NoResponse,
                None,
            )
            .await?;
        if !applied {
            tracing::debug!(reservation_id = %id, "Timeout skipped, guest already answered");
            return Ok(());
        }

        let record = self.get(id).await?;
        tracing::info!(reservation_id = %id, user_id = record.user_id, "No attendance response");
        self.notify_operators(Notice::call_guest(&record, CallReason::NoResponse)).await;
        Ok(())
    }

    // ========== Side effects ==========

    async fn disarm(&self, id: &str, kind: JobKind) {
        if let Err(e) = self.scheduler.cancel_kind(id, kind).await {
            tracing::warn!(reservation_id = %id, job_kind = %kind, error = %e, "Failed to cancel job");
        }
    }

    async fn notify(&self, recipient: Recipient, notice: Notice) {
        let reservation_id = notice.reservation_id().to_string();
        if let Err(e) = self.notifier.send(recipient, notice).await {
            tracing::warn!(
                reservation_id = %reservation_id,
                recipient = ?recipient,
                error = %e,
                "Failed to deliver notice"
            );
        }
    }

    async fn notify_operators(&self, notice: Notice) {
        if self.settings.operator_ids.is_empty() {
            tracing::warn!(reservation_id = %notice.reservation_id(), "No operators configured for call-back");
        }
        for &operator_id in &self.settings.operator_ids {
            self.notify(Recipient::Operator(operator_id), notice.clone()).await;
        }
    }
}

#[async_trait]
impl JobHandler for LifecycleController {
    async fn execute(&self, job: ScheduledJob) -> AppResult<()> {
        match job.kind {
            JobKind::ConfirmationPrompt => self.on_prompt_due(&job).await,
            JobKind::ConfirmationTimeout => self.on_timeout_due(&job).await,
        }
    }
}
