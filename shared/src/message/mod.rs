//! 消息总线消息类型定义
//!
//! 进程内事件通道使用的消息结构。总线只承载通知性事件，
//! 订阅者收到事件后总是从 ReservationStore 重新读取状态。

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;

use uuid::Uuid;

use crate::models::ReservationRequest;

pub mod payload;
pub use payload::*;

/// Channel name announcing newly submitted reservation requests
pub const RESERVATION_CREATED_CHANNEL: &str = "reservation.created";

/// 消息总线事件类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventType {
    /// 新预约提交
    ReservationCreated = 0,
}

impl EventType {
    /// Named channel this event travels on
    pub fn channel(&self) -> &'static str {
        match self {
            EventType::ReservationCreated => RESERVATION_CREATED_CHANNEL,
        }
    }
}

impl TryFrom<u8> for EventType {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(EventType::ReservationCreated),
            _ => Err(()),
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.channel())
    }
}

/// 消息总线消息体
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BusMessage {
    pub request_id: Uuid,
    pub event_type: EventType,
    pub source: Option<String>,
    pub payload: Vec<u8>,
}

impl BusMessage {
    pub fn new(event_type: EventType, payload: Vec<u8>) -> Self {
        Self {
            request_id: Uuid::new_v4(),
            event_type,
            source: None,
            payload,
        }
    }

    /// 设置来源
    pub fn with_source(mut self, source: &str) -> Self {
        self.source = Some(source.to_string());
        self
    }

    /// 创建预约提交消息 (payload = 提交时的完整记录)
    pub fn reservation_created(record: &ReservationRequest) -> Result<Self, serde_json::Error> {
        Ok(Self::new(
            EventType::ReservationCreated,
            serde_json::to_vec(record)?,
        ))
    }

    /// 解析载荷为指定类型
    pub fn parse_payload<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&self.payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NewReservation;

    #[test]
    fn test_reservation_created_message() {
        let record = NewReservation {
            user_id: Some(1),
            phone: Some("555".into()),
            table: Some("2".into()),
            date: Some("2024-06-01".into()),
            time: Some("12:30".into()),
            ..Default::default()
        }
        .into_record("abc".into(), 10)
        .unwrap();

        let msg = BusMessage::reservation_created(&record).unwrap();
        assert_eq!(msg.event_type, EventType::ReservationCreated);
        assert!(!msg.request_id.is_nil());

        let parsed: ReservationRequest = msg.parse_payload().unwrap();
        assert_eq!(parsed, record);
    }

    #[test]
    fn test_event_type_channel() {
        assert_eq!(EventType::ReservationCreated.to_string(), "reservation.created");
        assert_eq!(EventType::try_from(0u8), Ok(EventType::ReservationCreated));
        assert!(EventType::try_from(9u8).is_err());
    }
}
