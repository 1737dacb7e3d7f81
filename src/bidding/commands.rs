/// 입찰 관련 커맨드 처리
/// 1. 입찰 (생성/상향)
/// 2. 참가비 결제 시작/확인/실패
/// 3. 사용자 등록
// region:    --- Imports
use crate::auction::events::{AuctionEvent, BidPlaced};
use crate::auction::model::{Participation, Pledge, UserProfile};
use crate::bidding::validator::PledgeChange;
use crate::engine::AuctionEngine;
use crate::error::{AuctionError, Rejection};
use crate::query::leaderboard::{self, LeaderboardView};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{error, info};
// endregion: --- Imports

// region:    --- Commands
/// 입찰 명령
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct PlacePledgeCommand {
    pub user_id: i64,
    pub round_id: i64,
    pub pledge_amount: Decimal,
}

/// 참가비 결제 명령
#[derive(Debug, Serialize, Deserialize, Clone, Copy)]
pub struct ParticipationCommand {
    pub user_id: i64,
    pub round_id: i64,
    pub fee_paid: Decimal,
    /// 결제 서비스가 확인한 결제 시각. 없으면 확인 요청을 받은 시각
    #[serde(default)]
    pub paid_at: Option<DateTime<Utc>>,
}

/// 입찰 처리 결과
#[derive(Debug, Clone, Serialize)]
pub struct PledgeReceipt {
    pub pledge: Pledge,
    pub previous_amount: Option<Decimal>,
    /// 같은 금액 재제출이면 false
    pub updated: bool,
    /// 입찰자 기준 리더보드. 커밋 후 조회 실패 시 None
    pub leaderboard: Option<LeaderboardView>,
}

impl AuctionEngine {
    /// 사용자 등록/갱신 (인증은 외부 서비스 담당)
    pub async fn upsert_user(&self, username: &str, display_name: &str) -> Result<UserProfile, AuctionError> {
        let username = username.trim();
        if username.is_empty() {
            return Err(Rejection::validation("username 은 비어있을 수 없습니다.").into());
        }
        let display_name = match display_name.trim() {
            "" => username,
            name => name,
        };
        self.with_retry("upsert_user", || self.store.upsert_user(username, display_name))
            .await
    }

    /// 1. 입찰
    pub async fn place_pledge(&self, cmd: PlacePledgeCommand) -> Result<PledgeReceipt, AuctionError> {
        info!("{:<12} --> 입찰 요청 처리 시작: {:?}", "Command", cmd);

        let outcome = self
            .with_retry("place_pledge", || {
                self.store
                    .submit_pledge(cmd.user_id, cmd.round_id, cmd.pledge_amount, Utc::now())
            })
            .await?;

        let previous_amount = match outcome.change {
            PledgeChange::Raise { previous } => Some(previous),
            _ => None,
        };
        let updated = outcome.change != PledgeChange::Unchanged;

        if updated {
            self.publish(AuctionEvent::BidPlaced(BidPlaced {
                auction_id: outcome.pledge.auction_id,
                round_id: outcome.pledge.round_id,
                user_id: outcome.pledge.user_id,
                amount: outcome.pledge.pledge_amount,
                previous_amount,
                submitted_at: outcome.pledge.updated_at,
            }))
            .await;
        }

        let leaderboard = match self.pledge_leaderboards(cmd.round_id, cmd.user_id).await {
            Ok((public, personal)) => {
                if updated {
                    self.publish(AuctionEvent::LeaderboardUpdate(public)).await;
                }
                Some(personal)
            }
            Err(e) => {
                error!(
                    "{:<12} --> 입찰 후 리더보드 계산 실패: round_id={}, error={}",
                    "Command", cmd.round_id, e
                );
                None
            }
        };

        info!(
            "{:<12} --> 입찰 처리 완료: pledge_id={}, amount={}, updated={}",
            "Command", outcome.pledge.id, outcome.pledge.pledge_amount, updated
        );
        Ok(PledgeReceipt {
            pledge: outcome.pledge,
            previous_amount,
            updated,
            leaderboard,
        })
    }

    /// 전체 공개용/입찰자용 리더보드를 한 번의 조회로 계산
    async fn pledge_leaderboards(
        &self,
        round_id: i64,
        user_id: i64,
    ) -> Result<(LeaderboardView, LeaderboardView), AuctionError> {
        let round = self
            .store
            .get_round(round_id)
            .await?
            .ok_or_else(|| AuctionError::not_found("round", round_id))?;
        let records = self.store.round_pledges(round_id).await?;
        let public = leaderboard::compute(&round, records.clone(), None);
        let personal = leaderboard::compute(&round, records, Some(user_id));
        Ok((public, personal))
    }

    /// 2-1. 참가비 결제 시작
    pub async fn begin_participation(&self, cmd: ParticipationCommand) -> Result<Participation, AuctionError> {
        info!("{:<12} --> 참가비 결제 시작: {:?}", "Command", cmd);
        self.with_retry("begin_participation", || {
            self.store
                .begin_participation(cmd.user_id, cmd.round_id, cmd.fee_paid)
        })
        .await
    }

    /// 2-2. 참가비 결제 확인 (결제 서비스 콜백, 재전송에 멱등)
    pub async fn mark_participation_paid(
        &self,
        cmd: ParticipationCommand,
    ) -> Result<Participation, AuctionError> {
        info!("{:<12} --> 참가비 결제 확인: {:?}", "Command", cmd);
        let paid_at = cmd.paid_at.unwrap_or_else(Utc::now);
        self.with_retry("mark_participation_paid", || {
            self.store
                .mark_participation_paid(cmd.user_id, cmd.round_id, cmd.fee_paid, paid_at)
        })
        .await
    }

    /// 2-3. 참가비 결제 실패
    pub async fn mark_participation_failed(
        &self,
        user_id: i64,
        round_id: i64,
    ) -> Result<Participation, AuctionError> {
        info!(
            "{:<12} --> 참가비 결제 실패 기록: user_id={}, round_id={}",
            "Command", user_id, round_id
        );
        self.with_retry("mark_participation_failed", || {
            self.store.mark_participation_failed(user_id, round_id)
        })
        .await
    }

    /// 결제 완료 여부
    pub async fn has_paid(&self, user_id: i64, round_id: i64) -> Result<bool, AuctionError> {
        Ok(self
            .store
            .get_participation(user_id, round_id)
            .await?
            .is_some_and(|p| p.is_completed()))
    }
}

// endregion: --- Commands
