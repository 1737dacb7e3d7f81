//! 경매 엔진
//! 원장 저장소, 알림, 동점자 선택기를 묶는다.
//! 커맨드는 `bidding::commands`, `round::commands` 에, 조회는 `query::handlers` 에 있다.
// region:    --- Imports
use crate::auction::events::AuctionEvent;
use crate::error::AuctionError;
use crate::ledger::LedgerStore;
use crate::notifier::Notifier;
use crate::round::closer::TieBreaker;
use std::future::Future;
use std::sync::Arc;
use tracing::{error, warn};

// endregion: --- Imports

/// 동시성 충돌 시 최대 시도 횟수 (최초 1회 + 재시도 1회)
const MAX_ATTEMPTS: usize = 2;

#[derive(Clone)]
pub struct AuctionEngine {
    pub(crate) store: Arc<dyn LedgerStore>,
    notifier: Arc<dyn Notifier>,
    pub(crate) tie_breaker: Arc<dyn TieBreaker>,
}

impl AuctionEngine {
    pub fn new(
        store: Arc<dyn LedgerStore>,
        notifier: Arc<dyn Notifier>,
        tie_breaker: Arc<dyn TieBreaker>,
    ) -> Self {
        Self {
            store,
            notifier,
            tie_breaker,
        }
    }

    pub fn store(&self) -> &dyn LedgerStore {
        self.store.as_ref()
    }

    /// 저장소가 동시성 충돌을 보고하면 한 번 더 시도한다.
    /// 두 번째도 실패하면 충돌 오류를 그대로 반환 (HTTP 503).
    pub(crate) async fn with_retry<T, F, Fut>(&self, op: &'static str, f: F) -> Result<T, AuctionError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, AuctionError>>,
    {
        let mut attempt = 1;
        loop {
            match f().await {
                Err(e) if e.is_conflict() && attempt < MAX_ATTEMPTS => {
                    warn!(
                        "{:<12} --> 동시 갱신 충돌로 재시도: op={}, attempt={}, error={}",
                        "Engine", op, attempt, e
                    );
                    attempt += 1;
                }
                result => return result,
            }
        }
    }

    /// 커밋 이후 호출. 전달 실패는 기록만 하고 호출자에게 전파하지 않는다.
    pub(crate) async fn publish(&self, event: AuctionEvent) {
        if let Err(e) = self.notifier.publish(&event).await {
            error!(
                "{:<12} --> 이벤트 발행 실패: type={}, round_id={}, error={}",
                "Engine",
                event.kind(),
                event.round_id(),
                e
            );
        }
    }
}
