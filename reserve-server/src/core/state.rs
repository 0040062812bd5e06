use std::sync::Arc;
use std::time::Duration;

use crate::booking::{BookingBackend, HttpBookingBackend};
use crate::core::Config;
use crate::core::tasks::{BackgroundTasks, TaskKind};
use crate::message::EventBus;
use crate::notify::{LogNotifier, Notifier};
use crate::reservations::{LifecycleController, LifecycleSettings, ReservationStorage};
use crate::scheduler::{Clock, JobHandler, JobStorage, Scheduler, SystemClock};
use crate::views::{OperatorViewRegistry, ViewRefresher};

/// 过期草稿清理间隔
const DRAFT_PURGE_INTERVAL: Duration = Duration::from_secs(300);
/// 旧日志清理间隔
const LOG_CLEANUP_INTERVAL: Duration = Duration::from_secs(24 * 3600);

/// 服务器状态 - 持有所有服务的共享引用
///
/// | 字段 | 说明 |
/// |------|------|
/// | config | 配置项 (不可变) |
/// | store | 预约与草稿存储 (redb) |
/// | scheduler | 持久化延迟任务 |
/// | bus | `reservation.created` 事件通道 |
/// | controller | 生命周期状态机 |
/// | views | 管理员视图注册表 |
/// | notifier | 通知出口 |
#[derive(Clone)]
pub struct ServerState {
    pub config: Config,
    pub store: ReservationStorage,
    pub scheduler: Scheduler,
    pub bus: EventBus,
    pub controller: Arc<LifecycleController>,
    pub views: OperatorViewRegistry,
    pub notifier: Arc<dyn Notifier>,
}

impl std::fmt::Debug for ServerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerState")
            .field("work_dir", &self.config.work_dir)
            .field("scheduler", &self.scheduler)
            .finish_non_exhaustive()
    }
}

impl ServerState {
    /// 由已打开的存储和外部协作方组装状态
    pub fn assemble(
        config: Config,
        store: ReservationStorage,
        jobs: JobStorage,
        clock: Arc<dyn Clock>,
        booking: Arc<dyn BookingBackend>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let grace = Duration::from_secs(config.lifecycle.misfire_grace_secs.max(0) as u64);
        let scheduler = Scheduler::new(jobs, clock, grace);
        let bus = EventBus::with_capacity(config.event_channel_capacity);

        let controller = Arc::new(LifecycleController::new(
            store.clone(),
            scheduler.clone(),
            bus.clone(),
            booking,
            notifier.clone(),
            LifecycleSettings::from_config(&config),
        ));

        Self {
            config,
            store,
            scheduler,
            bus,
            controller,
            views: OperatorViewRegistry::new(),
            notifier,
        }
    }

    /// 初始化服务器状态
    ///
    /// 1. 工作目录结构
    /// 2. 预约库 (`data/reservations.redb`) 和任务库 (`data/scheduler.redb`)
    /// 3. 预订后端客户端
    pub fn initialize(config: &Config) -> anyhow::Result<Self> {
        config.ensure_work_dir_structure()?;

        let store = ReservationStorage::open(config.reservations_db_path())?;
        let jobs = JobStorage::open(config.scheduler_db_path())?;
        let booking = HttpBookingBackend::new(config.booking.clone())?;

        if config.booking.api_key.is_empty() {
            tracing::warn!("BOOKING_API_KEY is not set, approvals will fail");
        }
        if config.operator_ids.is_empty() {
            tracing::warn!("OPERATOR_IDS is empty, call-back notices have no recipient");
        }

        tracing::info!(
            reservations = store.count().unwrap_or(0),
            timezone = %config.timezone,
            "Reservation store opened"
        );

        Ok(Self::assemble(
            config.clone(),
            store,
            jobs,
            Arc::new(SystemClock),
            Arc::new(booking),
            Arc::new(LogNotifier),
        ))
    }

    /// 启动后台任务
    pub fn start_background_tasks(&self) -> BackgroundTasks {
        let mut tasks = BackgroundTasks::new();

        let handler: Arc<dyn JobHandler> = self.controller.clone();
        tasks.spawn(
            "job_scheduler",
            TaskKind::Worker,
            self.scheduler.clone().run(handler, tasks.shutdown_token()),
        );

        let refresher = ViewRefresher::new(
            self.views.clone(),
            self.notifier.clone(),
            self.config.operator_ids.clone(),
        );
        let listener = self.bus.listener(
            "operator_view_refresher",
            move |msg| {
                let refresher = refresher.clone();
                async move {
                    refresher.handle(msg).await;
                }
            },
            tasks.shutdown_token(),
        );
        tasks.spawn("operator_view_refresher", TaskKind::Listener, listener);

        tasks.spawn(
            "draft_purge",
            TaskKind::Periodic,
            purge_drafts(self.store.clone(), self.scheduler.clone(), tasks.shutdown_token()),
        );

        tasks.spawn(
            "log_cleanup",
            TaskKind::Periodic,
            cleanup_logs(self.config.log_dir(), tasks.shutdown_token()),
        );

        tasks.log_summary();
        tasks
    }
}

async fn purge_drafts(
    store: ReservationStorage,
    scheduler: Scheduler,
    shutdown: tokio_util::sync::CancellationToken,
) {
    let mut interval = tokio::time::interval(DRAFT_PURGE_INTERVAL);
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = interval.tick() => {
                match store.purge_expired_drafts(scheduler.now()) {
                    Ok(0) => {}
                    Ok(removed) => tracing::info!(removed, "Purged expired drafts"),
                    Err(e) => tracing::warn!(error = %e, "Draft purge failed"),
                }
            }
        }
    }
}

async fn cleanup_logs(log_dir: std::path::PathBuf, shutdown: tokio_util::sync::CancellationToken) {
    let mut interval = tokio::time::interval(LOG_CLEANUP_INTERVAL);
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = interval.tick() => {
                match crate::utils::logger::cleanup_old_logs(&log_dir) {
                    Ok(0) => {}
                    Ok(removed) => tracing::info!(removed, "Removed old log files"),
                    Err(e) => tracing::warn!(error = %e, "Log cleanup failed"),
                }
            }
        }
    }
}
