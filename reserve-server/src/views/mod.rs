//! 管理员待审列表视图
//!
//! 注册表由展示层写入 (`PUT /api/operators/{id}/view`)；引擎只读取。
//! 收到 `reservation.created` 事件后，为每个有活动视图的管理员请求刷新。

use std::sync::Arc;

use dashmap::DashMap;
use shared::message::{BusMessage, EventType};
use shared::models::{OperatorView, ReservationRequest};

use crate::notify::Notifier;

#[derive(Debug, Default, Clone)]
pub struct OperatorViewRegistry {
    views: Arc<DashMap<i64, OperatorView>>,
}

impl OperatorViewRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, operator_id: i64, view: OperatorView) {
        self.views.insert(operator_id, view);
    }

    pub fn get(&self, operator_id: i64) -> Option<OperatorView> {
        self.views.get(&operator_id).map(|v| *v)
    }

    pub fn remove(&self, operator_id: i64) -> Option<OperatorView> {
        self.views.remove(&operator_id).map(|(_, v)| v)
    }

    pub fn len(&self) -> usize {
        self.views.len()
    }

    pub fn is_empty(&self) -> bool {
        self.views.is_empty()
    }
}

/// 新预约事件 → 刷新管理员视图
#[derive(Clone)]
pub struct ViewRefresher {
    registry: OperatorViewRegistry,
    notifier: Arc<dyn Notifier>,
    operator_ids: Arc<Vec<i64>>,
}

impl ViewRefresher {
    pub fn new(
        registry: OperatorViewRegistry,
        notifier: Arc<dyn Notifier>,
        operator_ids: Vec<i64>,
    ) -> Self {
        Self {
            registry,
            notifier,
            operator_ids: Arc::new(operator_ids),
        }
    }

    /// 处理一条总线消息，返回刷新的视图数量
    pub async fn handle(&self, msg: BusMessage) -> usize {
        if msg.event_type != EventType::ReservationCreated {
            return 0;
        }

        let reservation_id = match msg.parse_payload::<ReservationRequest>() {
            Ok(record) => record.id,
            Err(e) => {
                tracing::warn!(error = %e, "Malformed reservation.created payload");
                return 0;
            }
        };

        let mut refreshed = 0;
        for &operator_id in self.operator_ids.iter() {
            let Some(view) = self.registry.get(operator_id) else {
                continue;
            };
            match self.notifier.refresh_operator_view(operator_id, view).await {
                Ok(()) => refreshed += 1,
                Err(e) => tracing::warn!(
                    operator_id,
                    reservation_id = %reservation_id,
                    error = %e,
                    "Failed to refresh operator view"
                ),
            }
        }
        refreshed
    }
}
