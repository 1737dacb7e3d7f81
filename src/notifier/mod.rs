//! 실시간 알림
//! 커밋된 상태 변경을 구독자에게 전달한다. 전달 실패는 원장 상태에 영향을 주지 않는다.
// region:    --- Imports
use crate::auction::events::AuctionEvent;
use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::debug;

// endregion: --- Imports

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("이벤트 직렬화 실패: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("메시지 브로커 전송 실패: {0}")]
    Broker(String),
}

/// 이벤트 발행 트레이트
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn publish(&self, event: &AuctionEvent) -> Result<(), NotifyError>;
}

// region:    --- Broadcast Notifier
/// 프로세스 내부 이벤트 허브
/// 느린 구독자는 오래된 이벤트를 놓칠 수 있다 (`RecvError::Lagged`).
#[derive(Clone)]
pub struct BroadcastNotifier {
    tx: broadcast::Sender<AuctionEvent>,
}

impl BroadcastNotifier {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AuctionEvent> {
        self.tx.subscribe()
    }

    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// 구독자 수 반환. 구독자가 없어도 오류가 아니다.
    pub fn send(&self, event: AuctionEvent) -> usize {
        match self.tx.send(event) {
            Ok(receivers) => receivers,
            Err(broadcast::error::SendError(event)) => {
                debug!(
                    "{:<12} --> 구독자 없음, 이벤트 폐기: type={}, round_id={}",
                    "Notifier",
                    event.kind(),
                    event.round_id()
                );
                0
            }
        }
    }
}

impl Default for BroadcastNotifier {
    fn default() -> Self {
        Self::new(1024)
    }
}

#[async_trait]
impl Notifier for BroadcastNotifier {
    async fn publish(&self, event: &AuctionEvent) -> Result<(), NotifyError> {
        self.send(event.clone());
        Ok(())
    }
}
// endregion: --- Broadcast Notifier
