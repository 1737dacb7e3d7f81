//! 원장 저장소
//! Auction, Round, Participation, Pledge 의 유일한 진실 공급원.
//! 각 메서드는 하나의 원자적 단위이며 구현체가 필요한 잠금을 책임진다.
//! - 입찰 제출과 라운드 종료는 같은 라운드 행 잠금으로 직렬화
//! - 입찰 상향은 (user, round) 입찰 행 잠금 안에서 읽기-비교-쓰기
// region:    --- Imports
use crate::auction::model::{
    Auction, Participant, Participation, Pledge, PledgeRecord, Round, UserProfile,
};
use crate::bidding::validator::PledgeChange;
use crate::error::AuctionError;
use crate::query::aggregate::OverallResult;
use crate::round::closer::{RoundResult, TieBreaker};
use crate::round::lifecycle::{NewAuction, NextRoundParams, PledgeRange};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tracing::warn;

// endregion: --- Imports

// region:    --- Modules
pub mod memory;
pub mod postgres;
mod queries;

pub use memory::MemoryLedgerStore;
pub use postgres::PostgresLedgerStore;
// endregion: --- Modules

// region:    --- Ledger Store Trait
/// 입찰 반영 결과
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PledgeOutcome {
    pub pledge: Pledge,
    pub change: PledgeChange,
}

/// 원장 저장소 트레이트
#[async_trait]
pub trait LedgerStore: Send + Sync {
    // 사용자
    async fn upsert_user(&self, username: &str, display_name: &str) -> Result<UserProfile, AuctionError>;
    async fn get_user(&self, user_id: i64) -> Result<Option<UserProfile>, AuctionError>;

    // 경매
    async fn create_auction(&self, new: &NewAuction) -> Result<Auction, AuctionError>;
    async fn get_auction(&self, auction_id: i64) -> Result<Option<Auction>, AuctionError>;
    /// 즉시 구매 전용 상품 활성화 (라운드 없음)
    async fn open_buy_now(&self, auction_id: i64) -> Result<Auction, AuctionError>;
    /// 활성 라운드가 없을 때 전체 평균 순위를 계산해 경매를 종료
    async fn finalize_auction(
        &self,
        auction_id: i64,
        now: DateTime<Utc>,
    ) -> Result<(Auction, OverallResult), AuctionError>;

    // 라운드
    async fn get_round(&self, round_id: i64) -> Result<Option<Round>, AuctionError>;
    async fn list_rounds(&self, auction_id: i64) -> Result<Vec<Round>, AuctionError>;
    async fn active_round(&self, auction_id: i64) -> Result<Option<Round>, AuctionError>;
    async fn create_next_round(
        &self,
        auction_id: i64,
        params: &NextRoundParams,
    ) -> Result<Round, AuctionError>;
    async fn activate_round(
        &self,
        round_id: i64,
        range: Option<PledgeRange>,
        now: DateTime<Utc>,
    ) -> Result<(Round, Auction), AuctionError>;
    async fn close_round(
        &self,
        round_id: i64,
        tie_breaker: &dyn TieBreaker,
        now: DateTime<Utc>,
    ) -> Result<RoundResult, AuctionError>;

    // 참가비
    async fn get_participation(
        &self,
        user_id: i64,
        round_id: i64,
    ) -> Result<Option<Participation>, AuctionError>;
    async fn begin_participation(
        &self,
        user_id: i64,
        round_id: i64,
        fee: Decimal,
    ) -> Result<Participation, AuctionError>;
    async fn mark_participation_paid(
        &self,
        user_id: i64,
        round_id: i64,
        fee: Decimal,
        paid_at: DateTime<Utc>,
    ) -> Result<Participation, AuctionError>;
    async fn mark_participation_failed(
        &self,
        user_id: i64,
        round_id: i64,
    ) -> Result<Participation, AuctionError>;
    async fn round_participants(&self, round_id: i64) -> Result<Vec<Participant>, AuctionError>;
    async fn auction_participations(&self, auction_id: i64) -> Result<Vec<Participation>, AuctionError>;

    // 입찰
    async fn submit_pledge(
        &self,
        user_id: i64,
        round_id: i64,
        amount: Decimal,
        now: DateTime<Utc>,
    ) -> Result<PledgeOutcome, AuctionError>;
    async fn get_pledge(&self, user_id: i64, round_id: i64) -> Result<Option<Pledge>, AuctionError>;
    async fn round_pledges(&self, round_id: i64) -> Result<Vec<PledgeRecord>, AuctionError>;
    async fn auction_pledges(&self, auction_id: i64) -> Result<Vec<PledgeRecord>, AuctionError>;
}
// endregion: --- Ledger Store Trait

// region:    --- Integrity
/// 결제 완료 참가 기록이 없는 입찰 제외
/// 정상 흐름에서는 발생하지 않으므로 발견 시 운영자 조사를 위해 경고를 남긴다.
pub fn retain_backed(records: Vec<PledgeRecord>, tag: &str) -> (Vec<PledgeRecord>, usize) {
    let (valid, invalid): (Vec<_>, Vec<_>) = records.into_iter().partition(PledgeRecord::is_backed);
    for record in &invalid {
        warn!(
            "{:<12} --> 무결성 오류: 결제 완료 참가 기록 없는 입찰 제외 round_id={}, user_id={}, pledge_id={}, amount={}, payment_status={:?}, submitted_at={}, updated_at={}",
            tag,
            record.pledge.round_id,
            record.pledge.user_id,
            record.pledge.id,
            record.pledge.pledge_amount,
            record.payment_status,
            record.pledge.submitted_at,
            record.pledge.updated_at
        );
    }
    let excluded = invalid.len();
    (valid, excluded)
}
// endregion: --- Integrity
