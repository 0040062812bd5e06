//! Reserve Server - 预约生命周期与延迟通知引擎
//!
//! # 架构概述
//!
//! - **预约存储** (`reservations::storage`): redb 记录 + 草稿会话
//! - **事件总线** (`message`): `reservation.created` 广播，唤醒管理员视图
//! - **调度器** (`scheduler`): 持久化的确认提醒 / 超时任务，重启后恢复
//! - **生命周期控制器** (`reservations::lifecycle`): 状态机、预订后端调用、通知
//! - **HTTP API** (`api`): 展示层使用的 JSON 接口
//!
//! # 模块结构
//!
//! ```text
//! reserve-server/src/
//! ├── core/          # 配置、状态、后台任务、服务器
//! ├── api/           # HTTP 路由和处理器
//! ├── booking/       # 外部预订后端 (trait + HTTPS 客户端)
//! ├── db/            # redb 公共部分
//! ├── message/       # 事件总线
//! ├── notify/        # 通知出口
//! ├── reservations/  # 存储 + 状态机
//! ├── scheduler/     # 持久化延迟任务
//! ├── views/         # 管理员视图注册表
//! └── utils/         # 日志、时间、重试
//! ```

pub mod api;
pub mod booking;
pub mod core;
pub mod db;
pub mod message;
pub mod notify;
pub mod reservations;
pub mod scheduler;
pub mod utils;
pub mod views;

// Re-export 公共类型
pub use core::{Config, Server, ServerState};
pub use message::{BusMessage, EventBus, EventType};
pub use reservations::{LifecycleController, ReservationStorage};
pub use scheduler::Scheduler;
pub use utils::{AppError, AppResult};

// Re-export unified error types from shared
pub use utils::{ApiResponse, ErrorCategory, ErrorCode};

// Re-export logger functions
pub use utils::logger::{cleanup_old_logs, init_logger, init_logger_with_file};

/// 加载 .env、创建工作目录、初始化日志
pub fn setup_environment() -> anyhow::Result<Config> {
    dotenv::dotenv().ok();

    let config = Config::from_env();
    config.ensure_work_dir_structure()?;

    let log_dir = config.log_dir();
    init_logger_with_file(&config.log_level, config.log_json, Some(&log_dir))?;
    Ok(config)
}
