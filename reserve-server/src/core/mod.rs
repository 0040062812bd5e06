//! 核心模块 - 配置、状态、后台任务和服务器
//!
//! - [`Config`] - 环境变量配置
//! - [`ServerState`] - 共享服务引用
//! - [`BackgroundTasks`] - 后台任务注册表
//! - [`Server`] - HTTP 服务器

pub mod config;
pub mod server;
pub mod state;
pub mod tasks;

pub use config::{BookingConfig, Config, LifecycleConfig};
pub use server::Server;
pub use state::ServerState;
pub use tasks::{BackgroundTasks, TaskKind};
