use std::path::PathBuf;
use std::time::Duration;

use chrono_tz::Tz;

/// 默认业务时区
pub const DEFAULT_TIMEZONE: Tz = chrono_tz::Europe::Moscow;

/// 服务器配置
///
/// # 环境变量
///
/// 所有配置项都可以通过环境变量覆盖，未设置或无法解析时使用默认值：
///
/// | 环境变量 | 默认值 | 说明 |
/// |----------|--------|------|
/// | WORK_DIR | /var/lib/reserve | 工作目录 (数据库、日志) |
/// | ENVIRONMENT | development | 运行环境 |
/// | LOG_LEVEL | info | 日志级别 |
/// | LOG_JSON | false | JSON 格式日志 |
/// | HTTP_PORT | 3000 | HTTP 服务端口 |
/// | BUSINESS_TIMEZONE | Europe/Moscow | 业务时区 |
/// | OPERATOR_IDS | (empty) | 管理员 ID，逗号分隔 |
/// | BOOKING_API_URL | https://api-ru.iiko.services | 预订后端地址 |
/// | BOOKING_API_KEY | (empty) | 预订后端 API key |
/// | BOOKING_ORGANIZATION_ID | (empty) | 预订后端组织 ID |
/// | BOOKING_TERMINAL_GROUP_ID | (empty) | 预订后端终端组 ID |
/// | BOOKING_TIMEOUT_MS | 10000 | 预订后端请求超时 |
/// | DRAFT_TTL_SECS | 1800 | 草稿过期时间 |
/// | PROMPT_LEAD_MINUTES | 120 | 到店前多久发送确认提醒 |
/// | RESPONSE_TIMEOUT_MINUTES | 15 | 等待用户确认的时长 |
/// | MISFIRE_GRACE_SECS | 60 | 定时任务准点宽限 |
/// | EVENT_CHANNEL_CAPACITY | 1024 | 事件通道容量 |
///
/// # 示例
///
/// ```ignore
/// WORK_DIR=/data/reserve OPERATOR_IDS=111,222 cargo run
/// ```
#[derive(Debug, Clone)]
pub struct Config {
    /// 工作目录，存储数据库、日志等文件
    pub work_dir: String,
    /// 运行环境: development | staging | production
    pub environment: String,
    pub log_level: String,
    pub log_json: bool,
    /// HTTP API 服务端口
    pub http_port: u16,
    /// 业务时区 (预约日期/时间按此时区解释)
    pub timezone: Tz,
    /// 管理员 (operator) chat user ids
    pub operator_ids: Vec<i64>,
    pub booking: BookingConfig,
    pub lifecycle: LifecycleConfig,
    /// 草稿过期时间 (秒)
    pub draft_ttl_secs: u64,
    /// 事件通道容量
    pub event_channel_capacity: usize,
}

/// 预订后端连接配置
#[derive(Debug, Clone)]
pub struct BookingConfig {
    pub api_url: String,
    pub api_key: String,
    pub organization_id: String,
    pub terminal_group_id: String,
    pub timeout_ms: u64,
}

impl BookingConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// 生命周期时间参数
#[derive(Debug, Clone, Copy)]
pub struct LifecycleConfig {
    /// 到店前多久发送确认提醒 (分钟)
    pub prompt_lead_minutes: i64,
    /// 等待用户确认的时长 (分钟)
    pub response_timeout_minutes: i64,
    /// 定时任务准点宽限 (秒)，仅影响日志
    pub misfire_grace_secs: i64,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            prompt_lead_minutes: 120,
            response_timeout_minutes: 15,
            misfire_grace_secs: 60,
        }
    }
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

/// 解析逗号分隔的 ID 列表，忽略无法解析的项
pub fn parse_id_list(raw: &str) -> Vec<i64> {
    raw.split(',')
        .filter_map(|part| {
            let part = part.trim();
            if part.is_empty() {
                return None;
            }
            match part.parse() {
                Ok(id) => Some(id),
                Err(_) => {
                    tracing::warn!(value = %part, "Ignoring invalid operator id");
                    None
                }
            }
        })
        .collect()
}

impl Config {
    /// 从环境变量加载配置
    ///
    /// 如果环境变量未设置，使用默认值
    pub fn from_env() -> Self {
        let timezone = std::env::var("BUSINESS_TIMEZONE")
            .ok()
            .and_then(|tz| tz.parse::<Tz>().ok())
            .unwrap_or(DEFAULT_TIMEZONE);

        Self {
            work_dir: std::env::var("WORK_DIR").unwrap_or_else(|_| "/var/lib/reserve".into()),
            environment: std::env::var("ENVIRONMENT").unwrap_or_else(|_| "development".into()),
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".into()),
            log_json: env_or("LOG_JSON", false),
            http_port: env_or("HTTP_PORT", 3000),
            timezone,
            operator_ids: std::env::var("OPERATOR_IDS")
                .map(|raw| parse_id_list(&raw))
                .unwrap_or_default(),
            booking: BookingConfig {
                api_url: std::env::var("BOOKING_API_URL")
                    .unwrap_or_else(|_| "https://api-ru.iiko.services".into()),
                api_key: std::env::var("BOOKING_API_KEY").unwrap_or_default(),
                organization_id: std::env::var("BOOKING_ORGANIZATION_ID").unwrap_or_default(),
                terminal_group_id: std::env::var("BOOKING_TERMINAL_GROUP_ID").unwrap_or_default(),
                timeout_ms: env_or("BOOKING_TIMEOUT_MS", 10_000),
            },
            lifecycle: LifecycleConfig {
                prompt_lead_minutes: env_or("PROMPT_LEAD_MINUTES", 120),
                response_timeout_minutes: env_or("RESPONSE_TIMEOUT_MINUTES", 15),
                misfire_grace_secs: env_or("MISFIRE_GRACE_SECS", 60),
            },
            draft_ttl_secs: env_or("DRAFT_TTL_SECS", 1800),
            event_channel_capacity: env_or("EVENT_CHANNEL_CAPACITY", 1024),
        }
    }

    /// 使用自定义工作目录覆盖配置
    ///
    /// 常用于测试场景
    pub fn with_work_dir(work_dir: impl Into<String>) -> Self {
        let mut config = Self::from_env();
        config.work_dir = work_dir.into();
        config
    }

    /// 数据目录 (work_dir/data)
    pub fn data_dir(&self) -> PathBuf {
        PathBuf::from(&self.work_dir).join("data")
    }

    /// 日志目录 (work_dir/logs)
    pub fn log_dir(&self) -> PathBuf {
        PathBuf::from(&self.work_dir).join("logs")
    }

    pub fn reservations_db_path(&self) -> PathBuf {
        self.data_dir().join("reservations.redb")
    }

    pub fn scheduler_db_path(&self) -> PathBuf {
        self.data_dir().join("scheduler.redb")
    }

    /// 确保工作目录结构存在
    pub fn ensure_work_dir_structure(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(self.data_dir())?;
        std::fs::create_dir_all(self.log_dir())?;
        Ok(())
    }

    pub fn draft_ttl(&self) -> Duration {
        Duration::from_secs(self.draft_ttl_secs)
    }

    /// 是否生产环境
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }

    /// 是否开发环境
    pub fn is_development(&self) -> bool {
        self.environment == "development"
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_env()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_id_list() {
        assert_eq!(parse_id_list("111, 222,,x,333"), vec![111, 222, 333]);
        assert!(parse_id_list("").is_empty());
    }

    #[test]
    fn test_derived_paths() {
        let mut config = Config::from_env();
        config.work_dir = "/tmp/reserve-test".into();
        assert_eq!(
            config.reservations_db_path(),
            PathBuf::from("/tmp/reserve-test/data/reservations.redb")
        );
        assert_eq!(
            config.scheduler_db_path(),
            PathBuf::from("/tmp/reserve-test/data/scheduler.redb")
        );
        assert_eq!(config.log_dir(), PathBuf::from("/tmp/reserve-test/logs"));
    }

    #[test]
    fn test_lifecycle_defaults() {
        let lc = LifecycleConfig::default();
        assert_eq!(lc.prompt_lead_minutes, 120);
        assert_eq!(lc.response_timeout_minutes, 15);
        assert_eq!(lc.misfire_grace_secs, 60);
    }
}
