//! 时间工具函数 (业务时区转换)
//!
//! 预约的日期/时间是业务时区的本地时间，调度器只接收 `i64` Unix millis。

use chrono::{DateTime, NaiveDateTime, TimeDelta};
use chrono_tz::Tz;

use shared::models::ReservationRequest;

use super::AppResult;

const MINUTE_MS: i64 = 60_000;

/// 本地时间 → Unix millis (业务时区)
///
/// 落在夏令时跳跃里的本地时间按跳跃之后处理 (+1h)。
pub fn local_to_millis(naive: NaiveDateTime, tz: Tz) -> i64 {
    naive
        .and_local_timezone(tz)
        .latest()
        .or_else(|| (naive + TimeDelta::hours(1)).and_local_timezone(tz).earliest())
        .map(|dt| dt.timestamp_millis())
        .unwrap_or_else(|| naive.and_utc().timestamp_millis())
}

/// Unix millis → 业务时区时间 (日志用)
pub fn millis_to_local(millis: i64, tz: Tz) -> Option<DateTime<Tz>> {
    DateTime::from_timestamp_millis(millis).map(|dt| dt.with_timezone(&tz))
}

/// 到店时间 (Unix millis)
pub fn visit_millis(reservation: &ReservationRequest, tz: Tz) -> AppResult<i64> {
    Ok(local_to_millis(reservation.visit_datetime()?, tz))
}

/// 确认提醒的触发时间：到店前 `lead_minutes`，已过则立即 (`now`)
pub fn prompt_fire_at(visit_at: i64, lead_minutes: i64, now: i64) -> i64 {
    (visit_at - lead_minutes * MINUTE_MS).max(now)
}

/// `now` 之后 `minutes` 分钟
pub fn after_minutes(now: i64, minutes: i64) -> i64 {
    now + minutes * MINUTE_MS
}
