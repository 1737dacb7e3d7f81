//! 라운드 종료 시 낙찰자 선정
//! 최고 입찰 금액과 같은 입찰들(동점 집합) 중 균등 무작위로 한 명을 고른다.
//! 리더보드의 표시 순서(먼저 도달한 사람 우선)와는 다른 규칙이다.
// region:    --- Imports
use crate::auction::model::{PledgeRecord, Round};
use crate::ledger::retain_backed;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Mutex;

// endregion: --- Imports

// region:    --- Tie Breaker
/// 동점자 중 낙찰자 인덱스 선택
pub trait TieBreaker: Send + Sync {
    /// `0..candidates` 범위의 인덱스 반환 (candidates >= 1)
    fn pick(&self, candidates: usize) -> usize;
}

/// 시드 주입이 가능한 균등 난수 선택기
pub struct RandomTieBreaker {
    rng: Mutex<StdRng>,
}

impl RandomTieBreaker {
    pub fn new(seed: Option<u64>) -> Self {
        match seed {
            Some(seed) => Self::seeded(seed),
            None => Self::from_entropy(),
        }
    }

    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    pub fn from_entropy() -> Self {
        Self {
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }
}

impl TieBreaker for RandomTieBreaker {
    fn pick(&self, candidates: usize) -> usize {
        if candidates <= 1 {
            return 0;
        }
        let mut rng = self.rng.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        rng.gen_range(0..candidates)
    }
}
// endregion: --- Tie Breaker

// region:    --- Winner Selection
/// 라운드 낙찰자
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundWinner {
    pub user_id: i64,
    pub username: String,
    pub display_name: String,
    pub participation_id: i64,
    pub pledge_id: i64,
    pub amount: Decimal,
}

/// 낙찰자 선정 결과
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WinnerSelection {
    pub winner: Option<RoundWinner>,
    pub tie_set_size: usize,
    pub valid_pledges: usize,
    pub excluded_pledges: usize,
}

/// 라운드 종료 결과
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoundResult {
    pub round: Round,
    /// 입찰이 없으면 None
    pub winner: Option<RoundWinner>,
    pub tie_set_size: usize,
    pub valid_pledges: usize,
    pub excluded_pledges: usize,
}

impl RoundResult {
    pub fn new(round: Round, selection: WinnerSelection) -> Self {
        Self {
            round,
            winner: selection.winner,
            tie_set_size: selection.tie_set_size,
            valid_pledges: selection.valid_pledges,
            excluded_pledges: selection.excluded_pledges,
        }
    }
}

/// 낙찰자 선정
/// 결제 완료 참가 기록이 없는 입찰은 무결성 오류로 기록하고 제외한다.
pub fn select_winner(records: Vec<PledgeRecord>, tie_breaker: &dyn TieBreaker) -> WinnerSelection {
    let (valid, excluded_pledges) = retain_backed(records, "RoundCloser");

    let Some(highest) = valid.iter().map(|r| r.pledge.pledge_amount).max() else {
        return WinnerSelection {
            winner: None,
            tie_set_size: 0,
            valid_pledges: 0,
            excluded_pledges,
        };
    };

    let mut tie_set: Vec<&PledgeRecord> = valid
        .iter()
        .filter(|r| r.pledge.pledge_amount == highest)
        .collect();
    // 저장소 조회 순서와 무관하게 같은 난수에 같은 결과
    tie_set.sort_by_key(|r| r.pledge.id);

    let index = tie_breaker.pick(tie_set.len()).min(tie_set.len() - 1);
    let chosen = tie_set[index];

    WinnerSelection {
        winner: Some(RoundWinner {
            user_id: chosen.pledge.user_id,
            username: chosen.username.clone(),
            display_name: chosen.display_name.clone(),
            participation_id: chosen.participation_id.unwrap_or_default(),
            pledge_id: chosen.pledge.id,
            amount: chosen.pledge.pledge_amount,
        }),
        tie_set_size: tie_set.len(),
        valid_pledges: valid.len(),
        excluded_pledges,
    }
}
// endregion: --- Winner Selection

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auction::model::{PaymentStatus, Pledge};
    use chrono::Utc;
    use rust_decimal_macros::dec;
    use std::collections::HashMap;

    fn record(id: i64, user: &str, amount: Decimal, status: Option<PaymentStatus>) -> PledgeRecord {
        let now = Utc::now();
        PledgeRecord {
            pledge: Pledge {
                id,
                user_id: id,
                round_id: 1,
                auction_id: 1,
                pledge_amount: amount,
                submitted_at: now,
                updated_at: now,
            },
            username: user.to_string(),
            display_name: user.to_string(),
            participation_id: status.map(|_| id * 10),
            payment_status: status,
        }
    }

    fn paid(id: i64, user: &str, amount: Decimal) -> PledgeRecord {
        record(id, user, amount, Some(PaymentStatus::Completed))
    }

    #[test]
    fn no_pledges_means_no_winner() {
        let selection = select_winner(Vec::new(), &RandomTieBreaker::seeded(1));
        assert_eq!(selection.winner, None);
        assert_eq!(selection.tie_set_size, 0);
    }

    #[test]
    fn single_highest_pledge_wins() {
        let records = vec![paid(1, "alice", dec!(3000)), paid(2, "bob", dec!(4500))];
        let selection = select_winner(records, &RandomTieBreaker::seeded(1));
        let winner = selection.winner.unwrap();
        assert_eq!(winner.username, "bob");
        assert_eq!(winner.amount, dec!(4500));
        assert_eq!(winner.participation_id, 20);
        assert_eq!(selection.tie_set_size, 1);
    }

    #[test]
    fn unbacked_pledges_are_excluded() {
        let records = vec![
            paid(1, "alice", dec!(3000)),
            record(2, "mallory", dec!(9000), None),
            record(3, "pending", dec!(8000), Some(PaymentStatus::Pending)),
        ];
        let selection = select_winner(records, &RandomTieBreaker::seeded(1));
        assert_eq!(selection.winner.unwrap().username, "alice");
        assert_eq!(selection.excluded_pledges, 2);
        assert_eq!(selection.valid_pledges, 1);
    }

    #[test]
    fn every_tied_member_is_selectable() {
        let breaker = RandomTieBreaker::seeded(42);
        let mut wins: HashMap<String, usize> = HashMap::new();
        for _ in 0..1000 {
            let records = vec![
                paid(1, "alice", dec!(5000)),
                paid(2, "bob", dec!(5000)),
                paid(3, "carol", dec!(3000)),
            ];
            let winner = select_winner(records, &breaker).winner.unwrap();
            *wins.entry(winner.username).or_default() += 1;
        }
        assert!(wins["alice"] > 100, "alice wins: {:?}", wins);
        assert!(wins["bob"] > 100, "bob wins: {:?}", wins);
        assert!(!wins.contains_key("carol"));
    }

    #[test]
    fn seeded_breakers_are_reproducible() {
        let a = RandomTieBreaker::seeded(7);
        let b = RandomTieBreaker::seeded(7);
        let picks_a: Vec<usize> = (0..20).map(|_| a.pick(5)).collect();
        let picks_b: Vec<usize> = (0..20).map(|_| b.pick(5)).collect();
        assert_eq!(picks_a, picks_b);
        assert!(picks_a.iter().all(|&i| i < 5));
    }
}
