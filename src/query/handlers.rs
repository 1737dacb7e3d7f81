// region:    --- Imports
use super::aggregate::{self, OverallResult};
use super::leaderboard::{self, LeaderboardEntry, LeaderboardView};
use crate::auction::model::{Auction, Participant, Participation, Round, UserProfile};
use crate::bidding::validator::sum_money;
use crate::engine::AuctionEngine;
use crate::error::AuctionError;
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use tracing::info;

// endregion: --- Imports

// region:    --- Report Models
#[derive(Debug, Clone, Serialize)]
pub struct RoundParticipants {
    pub round_id: i64,
    pub participants: Vec<Participant>,
    pub total_revenue: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoundRevenue {
    pub round_id: i64,
    pub round_number: i32,
    pub participants: usize,
    pub revenue: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RevenueSummary {
    pub auction_id: i64,
    pub rounds: Vec<RoundRevenue>,
    pub total_participations: usize,
    /// 한 번 이상 결제를 완료한 서로 다른 사용자 수
    pub distinct_payers: usize,
    pub total_revenue: Decimal,
}
// endregion: --- Report Models

// region:    --- Query Handlers
impl AuctionEngine {
    /// 사용자 조회
    pub async fn get_user(&self, user_id: i64) -> Result<UserProfile, AuctionError> {
        self.store
            .get_user(user_id)
            .await?
            .ok_or_else(|| AuctionError::not_found("user", user_id))
    }

    /// 경매 조회
    pub async fn get_auction(&self, auction_id: i64) -> Result<Auction, AuctionError> {
        info!("{:<12} --> 경매 조회 id: {}", "Query", auction_id);
        self.store
            .get_auction(auction_id)
            .await?
            .ok_or_else(|| AuctionError::not_found("auction", auction_id))
    }

    /// 라운드 조회
    pub async fn get_round(&self, round_id: i64) -> Result<Round, AuctionError> {
        self.store
            .get_round(round_id)
            .await?
            .ok_or_else(|| AuctionError::not_found("round", round_id))
    }

    /// 경매의 라운드 목록 (round_number 순)
    pub async fn list_rounds(&self, auction_id: i64) -> Result<Vec<Round>, AuctionError> {
        info!("{:<12} --> 라운드 목록 조회 auction_id: {}", "Query", auction_id);
        self.get_auction(auction_id).await?;
        self.store.list_rounds(auction_id).await
    }

    /// 현재 활성 라운드
    pub async fn current_round(&self, auction_id: i64) -> Result<Option<Round>, AuctionError> {
        self.get_auction(auction_id).await?;
        self.store.active_round(auction_id).await
    }

    /// 라운드 리더보드
    pub async fn leaderboard(
        &self,
        round_id: i64,
        viewer: Option<i64>,
    ) -> Result<LeaderboardView, AuctionError> {
        info!(
            "{:<12} --> 리더보드 조회 round_id: {}, viewer: {:?}",
            "Query", round_id, viewer
        );
        let round = self.get_round(round_id).await?;
        let records = self.store.round_pledges(round_id).await?;
        Ok(leaderboard::compute(&round, records, viewer))
    }

    /// 전체 입찰 순위 (관리자용, 상위 10개 제한 없음)
    pub async fn ranked_pledges(&self, round_id: i64) -> Result<Vec<LeaderboardEntry>, AuctionError> {
        self.get_round(round_id).await?;
        let records = self.store.round_pledges(round_id).await?;
        Ok(leaderboard::rank(records, None))
    }

    /// 라운드 결제 완료 참가자
    pub async fn round_participants(&self, round_id: i64) -> Result<RoundParticipants, AuctionError> {
        self.get_round(round_id).await?;
        let participants = self.store.round_participants(round_id).await?;
        let total_revenue = sum_money(participants.iter().map(|p| p.participation.fee_paid));
        Ok(RoundParticipants {
            round_id,
            participants,
            total_revenue,
        })
    }

    /// 참가비 결제 상태
    pub async fn participation_status(
        &self,
        user_id: i64,
        round_id: i64,
    ) -> Result<Option<Participation>, AuctionError> {
        self.store.get_participation(user_id, round_id).await
    }

    /// 경매 참가비 수익 요약 (결제 완료 건만 집계)
    pub async fn revenue_summary(&self, auction_id: i64) -> Result<RevenueSummary, AuctionError> {
        info!("{:<12} --> 수익 요약 조회 auction_id: {}", "Query", auction_id);
        let rounds = self.list_rounds(auction_id).await?;
        let participations = self.store.auction_participations(auction_id).await?;
        Ok(summarize_revenue(auction_id, &rounds, &participations))
    }

    /// 전체 라운드 평균 기준 순위 (읽기 전용, 진행 중인 라운드 포함)
    pub async fn calculate_overall_winner(&self, auction_id: i64) -> Result<OverallResult, AuctionError> {
        info!("{:<12} --> 최종 순위 계산 auction_id: {}", "Query", auction_id);
        let rounds = self.list_rounds(auction_id).await?;
        let records = self.store.auction_pledges(auction_id).await?;
        Ok(aggregate::calculate(auction_id, &rounds, records))
    }
}

fn summarize_revenue(auction_id: i64, rounds: &[Round], participations: &[Participation]) -> RevenueSummary {
    let mut per_round: BTreeMap<i64, (usize, Decimal)> = BTreeMap::new();
    let mut payers = BTreeSet::new();
    for participation in participations.iter().filter(|p| p.is_completed()) {
        let entry = per_round.entry(participation.round_id).or_default();
        entry.0 += 1;
        entry.1 = sum_money([entry.1, participation.fee_paid]);
        payers.insert(participation.user_id);
    }

    let rounds: Vec<RoundRevenue> = rounds
        .iter()
        .map(|round| {
            let (participants, revenue) = per_round.get(&round.id).copied().unwrap_or_default();
            RoundRevenue {
                round_id: round.id,
                round_number: round.round_number,
                participants,
                revenue,
            }
        })
        .collect();

    RevenueSummary {
        auction_id,
        total_participations: rounds.iter().map(|r| r.participants).sum(),
        total_revenue: sum_money(rounds.iter().map(|r| r.revenue)),
        distinct_payers: payers.len(),
        rounds,
    }
}
// endregion: --- Query Handlers
