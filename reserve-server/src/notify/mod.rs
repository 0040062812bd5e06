//! 通知出口
//!
//! 引擎只产出类型化的 [`Notice`]；文案和聊天界面渲染由展示层负责。

use async_trait::async_trait;
use shared::message::{Notice, Recipient};
use shared::models::OperatorView;

use crate::utils::AppResult;

#[async_trait]
pub trait Notifier: Send + Sync + 'static {
    /// Deliver a notice to a guest or operator
    async fn send(&self, recipient: Recipient, notice: Notice) -> AppResult<()>;

    /// Ask the presentation layer to redraw an operator's pending list
    async fn refresh_operator_view(&self, operator_id: i64, view: OperatorView) -> AppResult<()>;
}

/// 只写日志的通知器 (未接入展示层时使用)
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, recipient: Recipient, notice: Notice) -> AppResult<()> {
        tracing::info!(
            recipient = ?recipient,
            reservation_id = %notice.reservation_id(),
            notice = ?notice,
            "Notice emitted"
        );
        Ok(())
    }

    async fn refresh_operator_view(&self, operator_id: i64, view: OperatorView) -> AppResult<()> {
        tracing::info!(
            operator_id,
            chat_id = view.chat_id,
            message_id = view.message_id,
            page = view.page,
            "Operator view refresh requested"
        );
        Ok(())
    }
}
