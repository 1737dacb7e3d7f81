//! 경매 전체 라운드 평균 입찰 계산 (읽기 전용)
//! 평균 = (참가한 라운드 입찰 합계) / (생성된 전체 라운드 수)
//! 참가하지 않은 라운드는 0 으로 계산하며 draft 라운드도 분모에 포함된다.
//! 평균이 같으면 마지막 기여 입찰을 더 먼저 확정한 사용자, 그 다음 user_id 가 작은 사용자가 위.
// region:    --- Imports
use crate::auction::model::{PledgeRecord, Round};
use crate::bidding::validator::sum_money;
use crate::ledger::retain_backed;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::warn;

// endregion: --- Imports

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundContribution {
    pub round_id: i64,
    pub round_number: i32,
    pub participated: bool,
    pub pledge_amount: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticipantStanding {
    pub rank: usize,
    pub user_id: i64,
    pub username: String,
    pub display_name: String,
    pub total_pledge: Decimal,
    pub rounds_participated: usize,
    pub total_rounds: usize,
    pub average_pledge: Decimal,
    /// 마지막 기여 입찰이 현재 금액이 된 시각 (동점 처리 기준)
    pub reached_at: DateTime<Utc>,
    pub round_details: Vec<RoundContribution>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OverallResult {
    pub auction_id: i64,
    pub total_rounds: usize,
    pub total_participants: usize,
    pub winner: Option<ParticipantStanding>,
    pub standings: Vec<ParticipantStanding>,
}

struct Tally {
    username: String,
    display_name: String,
    amounts: BTreeMap<i64, Decimal>,
    reached_at: DateTime<Utc>,
}

/// 전체 순위 계산
/// `rounds` 는 해당 경매의 모든 라운드, `records` 는 해당 경매의 살아있는 입찰
pub fn calculate(auction_id: i64, rounds: &[Round], records: Vec<PledgeRecord>) -> OverallResult {
    let mut ordered: Vec<&Round> = rounds.iter().collect();
    ordered.sort_by_key(|r| r.round_number);
    let total_rounds = ordered.len();

    let (valid, _) = retain_backed(records, "Aggregate");

    let mut tallies: BTreeMap<i64, Tally> = BTreeMap::new();
    for record in valid {
        let pledge = record.pledge;
        if !ordered.iter().any(|r| r.id == pledge.round_id) {
            warn!(
                "{:<12} --> 경매에 속하지 않은 라운드의 입찰 제외: auction_id={}, round_id={}, user_id={}, pledge_id={}",
                "Aggregate", auction_id, pledge.round_id, pledge.user_id, pledge.id
            );
            continue;
        }
        let tally = tallies.entry(pledge.user_id).or_insert_with(|| Tally {
            username: record.username,
            display_name: record.display_name,
            amounts: BTreeMap::new(),
            reached_at: pledge.updated_at,
        });
        tally.amounts.insert(pledge.round_id, pledge.pledge_amount);
        tally.reached_at = tally.reached_at.max(pledge.updated_at);
    }

    if total_rounds == 0 {
        return OverallResult {
            auction_id,
            total_rounds,
            total_participants: 0,
            winner: None,
            standings: Vec::new(),
        };
    }

    let denominator = Decimal::from(total_rounds as u64);
    let mut standings: Vec<ParticipantStanding> = tallies
        .into_iter()
        .map(|(user_id, tally)| {
            let round_details: Vec<RoundContribution> = ordered
                .iter()
                .map(|round| {
                    let amount = tally.amounts.get(&round.id).copied();
                    RoundContribution {
                        round_id: round.id,
                        round_number: round.round_number,
                        participated: amount.is_some(),
                        pledge_amount: amount.unwrap_or(Decimal::ZERO),
                    }
                })
                .collect();
            let total_pledge = sum_money(round_details.iter().map(|d| d.pledge_amount));
            ParticipantStanding {
                rank: 0,
                user_id,
                username: tally.username,
                display_name: tally.display_name,
                total_pledge,
                rounds_participated: tally.amounts.len(),
                total_rounds,
                average_pledge: total_pledge / denominator,
                reached_at: tally.reached_at,
                round_details,
            }
        })
        .collect();

    standings.sort_by(|a, b| {
        b.average_pledge
            .cmp(&a.average_pledge)
            .then(a.reached_at.cmp(&b.reached_at))
            .then(a.user_id.cmp(&b.user_id))
    });
    for (index, standing) in standings.iter_mut().enumerate() {
        standing.rank = index + 1;
    }

    OverallResult {
        auction_id,
        total_rounds,
        total_participants: standings.len(),
        winner: standings.first().cloned(),
        standings,
    }
}
