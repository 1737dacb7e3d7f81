use crate::auction::model::Round;
use crate::query::leaderboard::LeaderboardView;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// 실시간 알림 이벤트
/// 전송 형식: {"type": "leaderboard_update" | "bid_placed" | "round_update", "data": {...}}
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum AuctionEvent {
    // 리더보드 갱신
    LeaderboardUpdate(LeaderboardView),
    // 입찰 생성/상향
    BidPlaced(BidPlaced),
    // 라운드 생성/활성화/종료
    RoundUpdate(RoundUpdate),
}

impl AuctionEvent {
    pub fn auction_id(&self) -> i64 {
        match self {
            AuctionEvent::LeaderboardUpdate(view) => view.auction_id,
            AuctionEvent::BidPlaced(bid) => bid.auction_id,
            AuctionEvent::RoundUpdate(update) => update.round.auction_id,
        }
    }

    pub fn round_id(&self) -> i64 {
        match self {
            AuctionEvent::LeaderboardUpdate(view) => view.round_id,
            AuctionEvent::BidPlaced(bid) => bid.round_id,
            AuctionEvent::RoundUpdate(update) => update.round.id,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            AuctionEvent::LeaderboardUpdate(_) => "leaderboard_update",
            AuctionEvent::BidPlaced(_) => "bid_placed",
            AuctionEvent::RoundUpdate(_) => "round_update",
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct BidPlaced {
    pub auction_id: i64,
    pub round_id: i64,
    pub user_id: i64,
    pub amount: Decimal,
    pub previous_amount: Option<Decimal>,
    pub submitted_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RoundAction {
    Created,
    Activated,
    Closed,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RoundUpdate {
    pub action: RoundAction,
    pub is_active: bool,
    pub round: Round,
}

impl RoundUpdate {
    pub fn new(action: RoundAction, round: Round) -> Self {
        Self {
            action,
            is_active: round.is_active(),
            round,
        }
    }
}
