//! 持久化延迟任务调度器
//!
//! 任务记录写入独立的 redb 文件 (`scheduler.redb`)，进程重启后重新加载，
//! 已过期的任务立即执行。
//!
//! # 执行语义
//!
//! ```text
//! schedule() ──▶ JobStorage (slot = reservation_id:kind) ──▶ notify dispatcher
//!                                                              │
//!        dispatch_due(now) ◀── sleep(earliest fire_at) ◀───────┘
//!              │
//!              ├─ spawn ─▶ JobHandler::execute(job)
//!              │                 │
//!              │                 ▼
//!              └──────────  ack: remove_if_id (无论成功失败)
//! ```
//!
//! - 同一 `(reservation_id, kind)` 只保留一个任务，重新调度即替换
//! - 处理器返回后才删除记录；执行与确认之间崩溃会导致重启后再执行一次，
//!   处理器需要用状态 CAS 保证幂等
//! - 超过宽限期 (`misfire_grace`) 的迟到任务仍会执行，只记录警告

mod clock;
mod job;
mod storage;

pub use clock::{Clock, ManualClock, SystemClock};
pub use job::{JobHandle, JobKind, ScheduledJob, job_key};
pub use storage::JobStorage;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashSet;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::utils::AppResult;
use crate::utils::retry::with_store_retry;

/// 空闲时最长睡眠时间
const MAX_IDLE_SLEEP: Duration = Duration::from_secs(60);
/// 存储读取失败后的重试间隔
const ERROR_BACKOFF: Duration = Duration::from_secs(1);

/// 任务执行入口
#[async_trait]
pub trait JobHandler: Send + Sync + 'static {
    async fn execute(&self, job: ScheduledJob) -> AppResult<()>;
}

struct SchedulerInner {
    storage: JobStorage,
    clock: Arc<dyn Clock>,
    grace_ms: i64,
    wakeup: Notify,
    /// 已派发但尚未确认的任务
    in_flight: DashSet<Uuid>,
}

/// 调度器句柄 (cheap clone)
#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<SchedulerInner>,
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("grace_ms", &self.inner.grace_ms)
            .field("in_flight", &self.inner.in_flight.len())
            .finish()
    }
}

impl Scheduler {
    pub fn new(storage: JobStorage, clock: Arc<dyn Clock>, misfire_grace: Duration) -> Self {
        Self {
            inner: Arc::new(SchedulerInner {
                storage,
                clock,
                grace_ms: misfire_grace.as_millis() as i64,
                wakeup: Notify::new(),
                in_flight: DashSet::new(),
            }),
        }
    }

    pub fn now(&self) -> i64 {
        self.inner.clock.now_millis()
    }

    /// 安排任务；同 key 的旧任务被替换
    pub async fn schedule(
        &self,
        fire_at: i64,
        kind: JobKind,
        reservation_id: &str,
        payload: serde_json::Value,
    ) -> AppResult<JobHandle> {
        let job = ScheduledJob::new(kind, reservation_id, fire_at, payload, self.now());
        let storage = &self.inner.storage;
        let superseded = with_store_retry("schedule_job", || Ok(storage.upsert(&job)?)).await?;

        if let Some(old) = superseded {
            tracing::info!(
                reservation_id = %reservation_id,
                job_kind = %kind,
                old_fire_at = old.fire_at,
                fire_at,
                "Superseded scheduled job"
            );
        } else {
            tracing::debug!(reservation_id = %reservation_id, job_kind = %kind, fire_at, "Job scheduled");
        }

        self.inner.wakeup.notify_one();
        Ok(job.handle())
    }

    /// 取消 handle 指向的任务；已被替换的旧 handle 不会取消新任务
    pub async fn cancel(&self, handle: &JobHandle) -> AppResult<bool> {
        let key = handle.key();
        let storage = &self.inner.storage;
        let removed =
            with_store_retry("cancel_job", || Ok(storage.remove_if_id(&key, handle.id)?)).await?;
        if removed {
            tracing::debug!(reservation_id = %handle.reservation_id, job_kind = %handle.kind, "Job cancelled");
        }
        Ok(removed)
    }

    /// 取消某预约某类型的任务 (无论是哪一个)
    pub async fn cancel_kind(&self, reservation_id: &str, kind: JobKind) -> AppResult<bool> {
        let key = job_key(reservation_id, kind);
        let storage = &self.inner.storage;
        let removed = with_store_retry("cancel_job", || Ok(storage.remove(&key)?)).await?;
        if removed.is_some() {
            tracing::debug!(reservation_id = %reservation_id, job_kind = %kind, "Job cancelled");
        }
        Ok(removed.is_some())
    }

    pub fn find(&self, reservation_id: &str, kind: JobKind) -> AppResult<Option<ScheduledJob>> {
        Ok(self.inner.storage.get(&job_key(reservation_id, kind))?)
    }

    pub fn pending_jobs(&self) -> AppResult<Vec<ScheduledJob>> {
        Ok(self.inner.storage.all()?)
    }

    /// 派发所有到期任务，每个任务一个 tokio task
    ///
    /// 不等待任务执行完成；返回的 JoinHandle 供测试等待。
    pub fn dispatch_due(&self, handler: &Arc<dyn JobHandler>) -> AppResult<Vec<JoinHandle<()>>> {
        let now = self.now();
        let due = self.inner.storage.due(now)?;

        let mut spawned = Vec::with_capacity(due.len());
        for job in due {
            if !self.inner.in_flight.insert(job.id) {
                continue;
            }

            let lateness = now - job.fire_at;
            if lateness > self.inner.grace_ms {
                tracing::warn!(
                    reservation_id = %job.reservation_id,
                    job_kind = %job.kind,
                    late_ms = lateness,
                    "Job fired after misfire grace window"
                );
            }

            let scheduler = self.clone();
            let handler = handler.clone();
            spawned.push(tokio::spawn(async move {
                scheduler.run_job(handler, job).await;
            }));
        }
        Ok(spawned)
    }

    async fn run_job(&self, handler: Arc<dyn JobHandler>, job: ScheduledJob) {
        let id = job.id;
        let key = job.key();
        let reservation_id = job.reservation_id.clone();
        let kind = job.kind;

        tracing::debug!(reservation_id = %reservation_id, job_kind = %kind, "Executing job");
        if let Err(e) = handler.execute(job).await {
            tracing::error!(
                reservation_id = %reservation_id,
                job_kind = %kind,
                error = %e,
                "Scheduled job failed"
            );
        }

        let storage = &self.inner.storage;
        if let Err(e) = with_store_retry("ack_job", || Ok(storage.remove_if_id(&key, id)?)).await {
            tracing::error!(
                reservation_id = %reservation_id,
                job_kind = %kind,
                error = %e,
                "Failed to acknowledge job, it will run again"
            );
        }
        self.inner.in_flight.remove(&id);
        self.inner.wakeup.notify_one();
    }

    /// 距离下一个可派发任务的时间
    fn next_wakeup(&self) -> Duration {
        let jobs = match self.inner.storage.all() {
            Ok(jobs) => jobs,
            Err(e) => {
                tracing::error!(error = %e, "Failed to read scheduled jobs");
                return ERROR_BACKOFF;
            }
        };

        let now = self.now();
        jobs.iter()
            .filter(|j| !self.inner.in_flight.contains(&j.id))
            .map(|j| j.fire_at)
            .min()
            .map(|fire_at| Duration::from_millis((fire_at - now).max(0) as u64).min(MAX_IDLE_SLEEP))
            .unwrap_or(MAX_IDLE_SLEEP)
    }

    /// 调度主循环 (注册为 `TaskKind::Worker`)
    pub async fn run(self, handler: Arc<dyn JobHandler>, shutdown: CancellationToken) {
        match self.inner.storage.all() {
            Ok(jobs) => {
                let now = self.now();
                let overdue = jobs.iter().filter(|j| j.fire_at <= now).count();
                tracing::info!(restored = jobs.len(), overdue, "Scheduler started");
            }
            Err(e) => tracing::error!(error = %e, "Failed to load scheduled jobs"),
        }

        loop {
            if let Err(e) = self.dispatch_due(&handler) {
                tracing::error!(error = %e, "Job dispatch failed");
            }

            let sleep_for = self.next_wakeup();
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = self.inner.wakeup.notified() => {}
                _ = tokio::time::sleep(sleep_for) => {}
            }
        }

        tracing::info!("Scheduler stopped");
    }
}
