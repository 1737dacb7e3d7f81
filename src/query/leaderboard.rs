//! 라운드 리더보드 계산 (읽기 전용)
//! - 금액 내림차순, 같은 금액이면 그 금액에 먼저 도달한 입찰이 위
//! - 상위 10개만 표시, 순위 밖의 조회 사용자는 별도로 자기 순위를 받는다
//! - 최고 금액 동점자가 10명을 넘으면 상위 10개 신원은 고정된 순서가 아님을 표시
// region:    --- Imports
use crate::auction::model::{PledgeRecord, Round};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

// endregion: --- Imports

/// 표시되는 상위 입찰 수
pub const TOP_N: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    pub position: usize,
    pub user_id: i64,
    pub username: String,
    pub display_name: String,
    pub pledge_amount: Decimal,
    pub submitted_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub is_current_user: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaderboardView {
    pub auction_id: i64,
    pub round_id: i64,
    pub round_number: i32,
    pub round_base_price: Decimal,
    pub is_active: bool,
    pub top_bids: Vec<LeaderboardEntry>,
    pub total_participants: usize,
    pub highest_amount: Option<Decimal>,
    pub tied_at_top_count: usize,
    /// 최고 금액 동점자가 TOP_N 을 넘어 표시 신원이 고정되지 않음
    pub top_rotated: bool,
    pub user_in_top_10: bool,
    /// 조회 사용자가 TOP_N 밖일 때만 채워짐
    pub user_position: Option<usize>,
    pub user_bid: Option<Decimal>,
}

/// 전체 순위 (결제 완료된 입찰만)
pub fn rank(records: Vec<PledgeRecord>, viewer: Option<i64>) -> Vec<LeaderboardEntry> {
    let mut backed: Vec<PledgeRecord> = records.into_iter().filter(PledgeRecord::is_backed).collect();
    backed.sort_by(|a, b| {
        b.pledge
            .pledge_amount
            .cmp(&a.pledge.pledge_amount)
            .then(a.pledge.updated_at.cmp(&b.pledge.updated_at))
            .then(a.pledge.id.cmp(&b.pledge.id))
    });

    backed
        .into_iter()
        .enumerate()
        .map(|(index, record)| LeaderboardEntry {
            position: index + 1,
            user_id: record.pledge.user_id,
            is_current_user: viewer == Some(record.pledge.user_id),
            username: record.username,
            display_name: record.display_name,
            pledge_amount: record.pledge.pledge_amount,
            submitted_at: record.pledge.submitted_at,
            updated_at: record.pledge.updated_at,
        })
        .collect()
}

/// 리더보드 계산
pub fn compute(round: &Round, records: Vec<PledgeRecord>, viewer: Option<i64>) -> LeaderboardView {
    let ranked = rank(records, viewer);

    let highest_amount = ranked.first().map(|e| e.pledge_amount);
    let tied_at_top_count = highest_amount
        .map(|top| ranked.iter().take_while(|e| e.pledge_amount == top).count())
        .unwrap_or(0);

    let own = ranked.iter().find(|e| e.is_current_user);
    let user_in_top_10 = own.is_some_and(|e| e.position <= TOP_N);
    let (user_position, user_bid) = match own {
        Some(entry) if entry.position > TOP_N => (Some(entry.position), Some(entry.pledge_amount)),
        _ => (None, None),
    };

    let total_participants = ranked.len();
    let top_bids = ranked.into_iter().take(TOP_N).collect();

    LeaderboardView {
        auction_id: round.auction_id,
        round_id: round.id,
        round_number: round.round_number,
        round_base_price: round.base_price,
        is_active: round.is_active(),
        top_bids,
        total_participants,
        highest_amount,
        tied_at_top_count,
        top_rotated: tied_at_top_count > TOP_N,
        user_in_top_10,
        user_position,
        user_bid,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auction::model::{PaymentStatus, Pledge, RoundStatus};
    use chrono::Duration;
    use rust_decimal_macros::dec;

    fn round() -> Round {
        Round {
            id: 5,
            auction_id: 2,
            round_number: 1,
            base_price: dec!(100),
            min_pledge: Some(dec!(100)),
            max_pledge: None,
            participation_fee: dec!(10),
            status: RoundStatus::Active,
            winner_user_id: None,
            winner_participation_id: None,
            winning_amount: None,
            created_at: Utc::now(),
            activated_at: Some(Utc::now()),
            closed_at: None,
        }
    }

    fn record(user_id: i64, amount: Decimal, offset_secs: i64) -> PledgeRecord {
        let at = Utc::now() + Duration::seconds(offset_secs);
        PledgeRecord {
            pledge: Pledge {
                id: user_id,
                user_id,
                round_id: 5,
                auction_id: 2,
                pledge_amount: amount,
                submitted_at: at,
                updated_at: at,
            },
            username: format!("user{}", user_id),
            display_name: format!("User {}", user_id),
            participation_id: Some(user_id + 100),
            payment_status: Some(PaymentStatus::Completed),
        }
    }

    #[test]
    fn ties_are_displayed_first_to_reach_first() {
        let records = vec![
            record(1, dec!(500), 30),
            record(2, dec!(700), 20),
            record(3, dec!(500), 10),
        ];
        let view = compute(&round(), records, Some(1));
        let order: Vec<i64> = view.top_bids.iter().map(|e| e.user_id).collect();
        assert_eq!(order, vec![2, 3, 1]);
        assert_eq!(view.top_bids[2].position, 3);
        assert!(view.top_bids[2].is_current_user);
        assert!(!view.top_bids[0].is_current_user);
        assert_eq!(view.highest_amount, Some(dec!(700)));
        assert_eq!(view.tied_at_top_count, 1);
        assert!(view.user_in_top_10);
        assert_eq!(view.user_position, None);
    }

    #[test]
    fn viewer_outside_top_ten_gets_own_position() {
        let records: Vec<PledgeRecord> = (1..=15)
            .map(|i| record(i, Decimal::from(2000 - i * 10), i))
            .collect();
        let view = compute(&round(), records, Some(13));
        assert_eq!(view.top_bids.len(), TOP_N);
        assert_eq!(view.total_participants, 15);
        assert!(!view.user_in_top_10);
        assert_eq!(view.user_position, Some(13));
        assert_eq!(view.user_bid, Some(dec!(1870)));
        assert!(view.top_bids.iter().all(|e| !e.is_current_user));
    }

    #[test]
    fn more_than_ten_tied_at_top_flags_rotation() {
        let records: Vec<PledgeRecord> = (1..=12).map(|i| record(i, dec!(5000), i)).collect();
        let view = compute(&round(), records, None);
        assert_eq!(view.tied_at_top_count, 12);
        assert!(view.top_rotated);
        assert_eq!(view.top_bids.len(), 10);
    }

    #[test]
    fn unpaid_pledges_are_not_ranked() {
        let mut stray = record(9, dec!(9999), 0);
        stray.payment_status = Some(PaymentStatus::Pending);
        let view = compute(&round(), vec![stray, record(1, dec!(100), 1)], None);
        assert_eq!(view.total_participants, 1);
        assert_eq!(view.highest_amount, Some(dec!(100)));
    }

    #[test]
    fn empty_round() {
        let view = compute(&round(), Vec::new(), Some(1));
        assert!(view.top_bids.is_empty());
        assert_eq!(view.highest_amount, None);
        assert_eq!(view.tied_at_top_count, 0);
        assert!(!view.top_rotated);
    }
}
