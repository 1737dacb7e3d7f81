/// 경매/라운드 관리 커맨드
/// 1. 경매 생성, 활성화, 최종 확정
/// 2. 라운드 생성, 활성화, 종료
// region:    --- Imports
use crate::auction::events::{AuctionEvent, RoundAction, RoundUpdate};
use crate::auction::model::{Auction, ProductType, Round, RoundStatus};
use crate::engine::AuctionEngine;
use crate::error::{AuctionError, Rejection};
use crate::query::aggregate::OverallResult;
use crate::round::closer::RoundResult;
use crate::round::lifecycle::{self, NewAuction, NextRoundParams, PledgeRange};
use chrono::Utc;
use serde::Serialize;
use tracing::{info, warn};
// endregion: --- Imports

// region:    --- Results
/// 경매 활성화 결과. 즉시 구매 상품이면 round 는 None
#[derive(Debug, Clone, Serialize)]
pub struct AuctionActivation {
    pub auction: Auction,
    pub round: Option<Round>,
}

/// 라운드 종료 후 다음 라운드 생성 결과
#[derive(Debug, Clone, Serialize)]
pub struct RoundAdvance {
    pub closed: RoundResult,
    pub next_round: Round,
}

#[derive(Debug, Clone, Serialize)]
pub struct FinalizedAuction {
    pub auction: Auction,
    pub result: OverallResult,
}
// endregion: --- Results

// region:    --- Commands
impl AuctionEngine {
    /// 1-1. 경매 생성 (draft, 라운드 없음)
    pub async fn create_auction(&self, new: NewAuction) -> Result<Auction, AuctionError> {
        info!("{:<12} --> 경매 생성 요청: {:?}", "Admin", new);
        self.store.create_auction(&new).await
    }

    /// 1-2. 경매 활성화
    /// - 즉시 구매 상품: 라운드 없이 active
    /// - 라운드가 없으면 1라운드를 만들어 `range` 로 활성화
    /// - 그 외에는 가장 최근 라운드 활성화
    pub async fn activate_auction(
        &self,
        auction_id: i64,
        range: Option<PledgeRange>,
    ) -> Result<AuctionActivation, AuctionError> {
        info!("{:<12} --> 경매 활성화 요청: auction_id={}", "Admin", auction_id);
        let auction = self
            .store
            .get_auction(auction_id)
            .await?
            .ok_or_else(|| AuctionError::not_found("auction", auction_id))?;

        if auction.product_type == ProductType::BuyNow {
            let auction = self.store.open_buy_now(auction_id).await?;
            return Ok(AuctionActivation {
                auction,
                round: None,
            });
        }

        let rounds = self.store.list_rounds(auction_id).await?;
        let round_id = match rounds.last() {
            Some(latest) => latest.id,
            None => {
                let range = range.ok_or_else(|| {
                    Rejection::validation("1라운드 활성화에는 min_pledge 와 max_pledge 가 필요합니다.")
                })?;
                let params = NextRoundParams {
                    min_pledge: Some(range.min_pledge),
                    max_pledge: Some(range.max_pledge),
                    ..NextRoundParams::default()
                };
                self.create_next_round(auction_id, params).await?.id
            }
        };

        let (round, auction) = self.activate_round_inner(round_id, range).await?;
        Ok(AuctionActivation {
            auction,
            round: Some(round),
        })
    }

    /// 1-3. 경매 최종 확정 (전체 라운드 평균 기준 최종 낙찰자 기록)
    pub async fn finalize_auction(&self, auction_id: i64) -> Result<FinalizedAuction, AuctionError> {
        info!("{:<12} --> 경매 최종 확정 요청: auction_id={}", "Admin", auction_id);
        let (auction, result) = self
            .with_retry("finalize_auction", || {
                self.store.finalize_auction(auction_id, Utc::now())
            })
            .await?;
        info!(
            "{:<12} --> 경매 종료: auction_id={}, winner={:?}, total_rounds={}",
            "Admin",
            auction_id,
            auction.winner_user_id,
            result.total_rounds
        );
        Ok(FinalizedAuction { auction, result })
    }

    /// 2-1. 다음 라운드 생성 (draft, 자동 활성화 없음)
    pub async fn create_next_round(
        &self,
        auction_id: i64,
        params: NextRoundParams,
    ) -> Result<Round, AuctionError> {
        info!(
            "{:<12} --> 다음 라운드 생성 요청: auction_id={}, params={:?}",
            "Admin", auction_id, params
        );
        let round = self
            .with_retry("create_next_round", || {
                self.store.create_next_round(auction_id, &params)
            })
            .await?;
        info!(
            "{:<12} --> 라운드 생성: round_id={}, round_number={}",
            "Admin", round.id, round.round_number
        );
        self.publish(AuctionEvent::RoundUpdate(RoundUpdate::new(
            RoundAction::Created,
            round.clone(),
        )))
        .await;
        Ok(round)
    }

    /// 2-2. 라운드 활성화
    pub async fn activate_round(
        &self,
        round_id: i64,
        range: Option<PledgeRange>,
    ) -> Result<Round, AuctionError> {
        info!("{:<12} --> 라운드 활성화 요청: round_id={}", "Admin", round_id);
        let (round, _) = self.activate_round_inner(round_id, range).await?;
        Ok(round)
    }

    async fn activate_round_inner(
        &self,
        round_id: i64,
        range: Option<PledgeRange>,
    ) -> Result<(Round, Auction), AuctionError> {
        let (round, auction) = self
            .with_retry("activate_round", || {
                self.store.activate_round(round_id, range, Utc::now())
            })
            .await?;
        info!(
            "{:<12} --> 라운드 활성화: auction_id={}, round_number={}, min={:?}, max={:?}",
            "Admin", round.auction_id, round.round_number, round.min_pledge, round.max_pledge
        );
        self.publish(AuctionEvent::RoundUpdate(RoundUpdate::new(
            RoundAction::Activated,
            round.clone(),
        )))
        .await;
        Ok((round, auction))
    }

    /// 2-3. 라운드 종료 및 낙찰자 선정
    pub async fn close_round(&self, round_id: i64) -> Result<RoundResult, AuctionError> {
        info!("{:<12} --> 라운드 종료 요청: round_id={}", "Admin", round_id);
        let result = self
            .with_retry("close_round", || {
                self.store
                    .close_round(round_id, self.tie_breaker.as_ref(), Utc::now())
            })
            .await?;
        match &result.winner {
            Some(winner) => info!(
                "{:<12} --> 라운드 종료: round_id={}, winner_user_id={}, amount={}, tie_set_size={}",
                "Admin", round_id, winner.user_id, winner.amount, result.tie_set_size
            ),
            None => info!("{:<12} --> 라운드 종료: round_id={}, 낙찰자 없음", "Admin", round_id),
        }
        self.publish(AuctionEvent::RoundUpdate(RoundUpdate::new(
            RoundAction::Closed,
            result.round.clone(),
        )))
        .await;
        Ok(result)
    }

    /// 2-4. 라운드 종료 후 다음 라운드 생성
    /// 다음 라운드 파라미터는 종료 전에 검증하므로 잘못된 값이면 아무 것도 바뀌지 않는다.
    pub async fn close_and_advance(
        &self,
        round_id: i64,
        params: NextRoundParams,
    ) -> Result<RoundAdvance, AuctionError> {
        let round = self
            .store
            .get_round(round_id)
            .await?
            .ok_or_else(|| AuctionError::not_found("round", round_id))?;
        let auction = self
            .store
            .get_auction(round.auction_id)
            .await?
            .ok_or_else(|| AuctionError::not_found("auction", round.auction_id))?;
        let as_closed = Round {
            status: RoundStatus::Closed,
            ..round.clone()
        };
        lifecycle::plan_next_round(&auction, Some(&as_closed), &params)?;

        let closed = self.close_round(round_id).await?;
        let next_round = self
            .create_next_round(round.auction_id, params)
            .await
            .map_err(|e| {
                warn!(
                    "{:<12} --> 라운드 {} 는 종료되었으나 다음 라운드 생성 실패: {}",
                    "Admin", round_id, e
                );
                e
            })?;
        Ok(RoundAdvance { closed, next_round })
    }
}
// endregion: --- Commands
