//! 进程内事件总线
//!
//! ```text
//! LifecycleController ──▶ publish() ──▶ broadcast::Sender<BusMessage>
//!                                               │
//!                          ┌────────────────────┼──────────────────┐
//!                          ▼                    ▼                  ▼
//!                    view refresher        listener N          (no subscriber: ok)
//! ```
//!
//! 投递至多一次、不可回放。订阅者落后时丢弃溢出的消息并记录日志，
//! 发布方永远不会被阻塞。

use std::future::Future;

use shared::message::BusMessage;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// 默认通道容量
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<BusMessage>,
    shutdown_token: CancellationToken,
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self {
            tx,
            shutdown_token: CancellationToken::new(),
        }
    }

    /// 发布消息；没有订阅者不算错误
    pub fn publish(&self, msg: BusMessage) {
        let event_type = msg.event_type;
        match self.tx.send(msg) {
            Ok(receivers) => {
                tracing::debug!(channel = %event_type, receivers, "Event published");
            }
            Err(_) => {
                tracing::debug!(channel = %event_type, "Event published with no subscribers");
            }
        }
    }

    /// 订阅者数量
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// 原始接收端 (高级用法)
    pub fn receiver(&self) -> broadcast::Receiver<BusMessage> {
        self.tx.subscribe()
    }

    /// 构建监听循环，交给调用方 spawn (例如 `BackgroundTasks`)
    ///
    /// 接收端在调用时创建，此后发布的消息都会送达。
    pub fn listener<H, Fut>(
        &self,
        name: &'static str,
        handler: H,
        shutdown: CancellationToken,
    ) -> impl Future<Output = ()> + Send + 'static
    where
        H: Fn(BusMessage) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let mut rx = self.tx.subscribe();
        let bus_shutdown = self.shutdown_token.clone();

        async move {
            tracing::debug!(listener = name, "Event listener started");
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = bus_shutdown.cancelled() => break,
                    received = rx.recv() => match received {
                        Ok(msg) => handler(msg).await,
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            tracing::warn!(listener = name, skipped, "Event listener lagged, messages dropped");
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    }
                }
            }
            tracing::debug!(listener = name, "Event listener stopped");
        }
    }

    /// 订阅并在独立任务中按到达顺序逐条处理
    pub fn subscribe<H, Fut>(&self, name: &'static str, handler: H) -> JoinHandle<()>
    where
        H: Fn(BusMessage) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        tokio::spawn(self.listener(name, handler, CancellationToken::new()))
    }

    /// 停止所有监听循环
    pub fn shutdown(&self) {
        tracing::info!("Shutting down event bus");
        self.shutdown_token.cancel();
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
