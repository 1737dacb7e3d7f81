//! 메모리 원장 저장소
//! 전체 상태를 하나의 뮤텍스로 보호하므로 모든 연산이 직렬화된다.
//! 테스트와 단일 노드 데모용.
// region:    --- Imports
use super::{LedgerStore, PledgeOutcome};
use crate::auction::model::{
    Auction, AuctionStatus, Participant, Participation, PaymentStatus, Pledge, PledgeRecord,
    ProductType, Round, RoundStatus, UserProfile,
};
use crate::bidding::participation::{
    plan_begin, plan_confirm, plan_fail, BeginWrite, ConfirmWrite, FailWrite,
};
use crate::bidding::validator::{validate_pledge, PledgeChange, PledgeContext};
use crate::error::AuctionError;
use crate::query::aggregate::{self, OverallResult};
use crate::round::closer::{select_winner, RoundResult, TieBreaker};
use crate::round::lifecycle::{
    check_buy_now_activation, check_close, check_finalize, check_new_auction, plan_activation,
    plan_next_round, NewAuction, NextRoundParams, PledgeRange,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use tokio::sync::Mutex;
use tracing::debug;

// endregion: --- Imports

// region:    --- State
#[derive(Default)]
struct LedgerState {
    last_id: i64,
    users: BTreeMap<i64, UserProfile>,
    auctions: BTreeMap<i64, Auction>,
    rounds: BTreeMap<i64, Round>,
    participations: BTreeMap<i64, Participation>,
    pledges: BTreeMap<i64, Pledge>,
}

impl LedgerState {
    fn next_id(&mut self) -> i64 {
        self.last_id += 1;
        self.last_id
    }

    fn auction(&self, auction_id: i64) -> Result<&Auction, AuctionError> {
        self.auctions
            .get(&auction_id)
            .ok_or_else(|| AuctionError::not_found("auction", auction_id))
    }

    fn round(&self, round_id: i64) -> Result<&Round, AuctionError> {
        self.rounds
            .get(&round_id)
            .ok_or_else(|| AuctionError::not_found("round", round_id))
    }

    fn user(&self, user_id: i64) -> Result<&UserProfile, AuctionError> {
        self.users
            .get(&user_id)
            .ok_or_else(|| AuctionError::not_found("user", user_id))
    }

    fn rounds_of(&self, auction_id: i64) -> Vec<Round> {
        let mut rounds: Vec<Round> = self
            .rounds
            .values()
            .filter(|r| r.auction_id == auction_id)
            .cloned()
            .collect();
        rounds.sort_by_key(|r| r.round_number);
        rounds
    }

    fn active_round_of(&self, auction_id: i64) -> Option<Round> {
        self.rounds
            .values()
            .find(|r| r.auction_id == auction_id && r.is_active())
            .cloned()
    }

    fn participation_of(&self, user_id: i64, round_id: i64) -> Option<Participation> {
        self.participations
            .values()
            .find(|p| p.user_id == user_id && p.round_id == round_id)
            .cloned()
    }

    fn pledge_of(&self, user_id: i64, round_id: i64) -> Option<Pledge> {
        self.pledges
            .values()
            .find(|p| p.user_id == user_id && p.round_id == round_id)
            .cloned()
    }

    fn records(&self, keep: impl Fn(&Pledge) -> bool) -> Vec<PledgeRecord> {
        self.pledges
            .values()
            .filter(|p| keep(p))
            .map(|pledge| {
                let user = self.users.get(&pledge.user_id);
                let participation = self.participation_of(pledge.user_id, pledge.round_id);
                PledgeRecord {
                    pledge: pledge.clone(),
                    username: user.map(|u| u.username.clone()).unwrap_or_default(),
                    display_name: user.map(|u| u.display_name.clone()).unwrap_or_default(),
                    participation_id: participation.as_ref().map(|p| p.id),
                    payment_status: participation.map(|p| p.payment_status),
                }
            })
            .collect()
    }
}
// endregion: --- State

// region:    --- Memory Ledger Store
#[derive(Default)]
pub struct MemoryLedgerStore {
    state: Mutex<LedgerState>,
}

impl MemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 결제 기록 없이 입찰 행을 직접 삽입 (무결성 오류 재현용)
    pub async fn insert_unbacked_pledge(
        &self,
        user_id: i64,
        round_id: i64,
        amount: Decimal,
    ) -> Result<Pledge, AuctionError> {
        let mut state = self.state.lock().await;
        let auction_id = state.round(round_id)?.auction_id;
        let now = Utc::now();
        let pledge = Pledge {
            id: state.next_id(),
            user_id,
            round_id,
            auction_id,
            pledge_amount: amount,
            submitted_at: now,
            updated_at: now,
        };
        state.pledges.insert(pledge.id, pledge.clone());
        Ok(pledge)
    }
}

#[async_trait]
impl LedgerStore for MemoryLedgerStore {
    async fn upsert_user(&self, username: &str, display_name: &str) -> Result<UserProfile, AuctionError> {
        let mut state = self.state.lock().await;
        if let Some(user) = state.users.values_mut().find(|u| u.username == username) {
            user.display_name = display_name.to_string();
            return Ok(user.clone());
        }
        let user = UserProfile {
            id: state.next_id(),
            username: username.to_string(),
            display_name: display_name.to_string(),
        };
        state.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn get_user(&self, user_id: i64) -> Result<Option<UserProfile>, AuctionError> {
        Ok(self.state.lock().await.users.get(&user_id).cloned())
    }

    async fn create_auction(&self, new: &NewAuction) -> Result<Auction, AuctionError> {
        check_new_auction(new)?;
        let mut state = self.state.lock().await;
        let auction = Auction {
            id: state.next_id(),
            title: new.title.trim().to_string(),
            base_price: new.base_price,
            participation_fee: new.participation_fee,
            status: AuctionStatus::Draft,
            product_type: new.product_type.unwrap_or(ProductType::Auction),
            winner_user_id: None,
            winning_average: None,
            created_at: Utc::now(),
            closed_at: None,
        };
        state.auctions.insert(auction.id, auction.clone());
        Ok(auction)
    }

    async fn get_auction(&self, auction_id: i64) -> Result<Option<Auction>, AuctionError> {
        Ok(self.state.lock().await.auctions.get(&auction_id).cloned())
    }

    async fn open_buy_now(&self, auction_id: i64) -> Result<Auction, AuctionError> {
        let mut state = self.state.lock().await;
        check_buy_now_activation(state.auction(auction_id)?)?;
        let auction = state
            .auctions
            .get_mut(&auction_id)
            .ok_or_else(|| AuctionError::not_found("auction", auction_id))?;
        auction.status = AuctionStatus::Active;
        Ok(auction.clone())
    }

    async fn finalize_auction(
        &self,
        auction_id: i64,
        now: DateTime<Utc>,
    ) -> Result<(Auction, OverallResult), AuctionError> {
        let mut state = self.state.lock().await;
        let active = state.active_round_of(auction_id);
        check_finalize(state.auction(auction_id)?, active.as_ref())?;

        let rounds = state.rounds_of(auction_id);
        let records = state.records(|p| p.auction_id == auction_id);
        let overall = aggregate::calculate(auction_id, &rounds, records);

        let auction = state
            .auctions
            .get_mut(&auction_id)
            .ok_or_else(|| AuctionError::not_found("auction", auction_id))?;
        auction.status = AuctionStatus::Closed;
        auction.closed_at = Some(now);
        auction.winner_user_id = overall.winner.as_ref().map(|w| w.user_id);
        auction.winning_average = overall.winner.as_ref().map(|w| w.average_pledge);
        Ok((auction.clone(), overall))
    }

    async fn get_round(&self, round_id: i64) -> Result<Option<Round>, AuctionError> {
        Ok(self.state.lock().await.rounds.get(&round_id).cloned())
    }

    async fn list_rounds(&self, auction_id: i64) -> Result<Vec<Round>, AuctionError> {
        Ok(self.state.lock().await.rounds_of(auction_id))
    }

    async fn active_round(&self, auction_id: i64) -> Result<Option<Round>, AuctionError> {
        Ok(self.state.lock().await.active_round_of(auction_id))
    }

    async fn create_next_round(
        &self,
        auction_id: i64,
        params: &NextRoundParams,
    ) -> Result<Round, AuctionError> {
        let mut state = self.state.lock().await;
        let last = state.rounds_of(auction_id).pop();
        let draft = plan_next_round(state.auction(auction_id)?, last.as_ref(), params)?;
        let round = Round {
            id: state.next_id(),
            auction_id,
            round_number: draft.round_number,
            base_price: draft.base_price,
            min_pledge: draft.min_pledge,
            max_pledge: draft.max_pledge,
            participation_fee: draft.participation_fee,
            status: RoundStatus::Draft,
            winner_user_id: None,
            winner_participation_id: None,
            winning_amount: None,
            created_at: Utc::now(),
            activated_at: None,
            closed_at: None,
        };
        state.rounds.insert(round.id, round.clone());
        Ok(round)
    }

    async fn activate_round(
        &self,
        round_id: i64,
        range: Option<PledgeRange>,
        now: DateTime<Utc>,
    ) -> Result<(Round, Auction), AuctionError> {
        let mut state = self.state.lock().await;
        let round = state.round(round_id)?.clone();
        let auction = state.auction(round.auction_id)?.clone();
        let active = state.active_round_of(auction.id);
        let plan = plan_activation(&auction, &round, active.as_ref(), range)?;

        let round = state
            .rounds
            .get_mut(&round_id)
            .ok_or_else(|| AuctionError::not_found("round", round_id))?;
        round.status = RoundStatus::Active;
        round.min_pledge = plan.min_pledge;
        round.max_pledge = plan.max_pledge;
        round.activated_at = Some(now);
        let round = round.clone();

        let auction = state
            .auctions
            .get_mut(&round.auction_id)
            .ok_or_else(|| AuctionError::not_found("auction", round.auction_id))?;
        if plan.activates_auction {
            auction.status = AuctionStatus::Active;
        }
        Ok((round, auction.clone()))
    }

    async fn close_round(
        &self,
        round_id: i64,
        tie_breaker: &dyn TieBreaker,
        now: DateTime<Utc>,
    ) -> Result<RoundResult, AuctionError> {
        let mut state = self.state.lock().await;
        check_close(state.round(round_id)?)?;

        let selection = select_winner(state.records(|p| p.round_id == round_id), tie_breaker);

        let round = state
            .rounds
            .get_mut(&round_id)
            .ok_or_else(|| AuctionError::not_found("round", round_id))?;
        round.status = RoundStatus::Closed;
        round.closed_at = Some(now);
        round.winner_user_id = selection.winner.as_ref().map(|w| w.user_id);
        round.winner_participation_id = selection.winner.as_ref().map(|w| w.participation_id);
        round.winning_amount = selection.winner.as_ref().map(|w| w.amount);
        Ok(RoundResult::new(round.clone(), selection))
    }

    async fn get_participation(
        &self,
        user_id: i64,
        round_id: i64,
    ) -> Result<Option<Participation>, AuctionError> {
        Ok(self.state.lock().await.participation_of(user_id, round_id))
    }

    async fn begin_participation(
        &self,
        user_id: i64,
        round_id: i64,
        fee: Decimal,
    ) -> Result<Participation, AuctionError> {
        let mut state = self.state.lock().await;
        state.user(user_id)?;
        let existing = state.participation_of(user_id, round_id);
        let write = plan_begin(state.round(round_id)?, existing.as_ref(), fee)?;

        let id = match write {
            BeginWrite::Insert => state.next_id(),
            BeginWrite::Restart { participation_id } => participation_id,
        };
        let participation = Participation {
            id,
            user_id,
            round_id,
            fee_paid: fee,
            payment_status: PaymentStatus::Pending,
            created_at: existing.map_or_else(Utc::now, |p| p.created_at),
            paid_at: None,
        };
        state.participations.insert(id, participation.clone());
        Ok(participation)
    }

    async fn mark_participation_paid(
        &self,
        user_id: i64,
        round_id: i64,
        fee: Decimal,
        paid_at: DateTime<Utc>,
    ) -> Result<Participation, AuctionError> {
        let mut state = self.state.lock().await;
        state.user(user_id)?;
        let existing = state.participation_of(user_id, round_id);
        let write = plan_confirm(state.round(round_id)?, existing.as_ref(), fee)?;

        let participation = match (write, existing) {
            (ConfirmWrite::AlreadyCompleted, Some(existing)) => {
                debug!(
                    "{:<12} --> 이미 완료된 결제 확인 재수신: user_id={}, round_id={}",
                    "Ledger", user_id, round_id
                );
                return Ok(existing);
            }
            (ConfirmWrite::Complete { .. }, Some(existing)) => Participation {
                fee_paid: fee,
                payment_status: PaymentStatus::Completed,
                paid_at: Some(paid_at),
                ..existing
            },
            _ => Participation {
                id: state.next_id(),
                user_id,
                round_id,
                fee_paid: fee,
                payment_status: PaymentStatus::Completed,
                created_at: paid_at,
                paid_at: Some(paid_at),
            },
        };
        state
            .participations
            .insert(participation.id, participation.clone());
        Ok(participation)
    }

    async fn mark_participation_failed(
        &self,
        user_id: i64,
        round_id: i64,
    ) -> Result<Participation, AuctionError> {
        let mut state = self.state.lock().await;
        let existing = state
            .participation_of(user_id, round_id)
            .ok_or_else(|| AuctionError::not_found("participation", round_id))?;
        let write = plan_fail(state.round(round_id)?, &existing)?;
        match write {
            FailWrite::AlreadyFailed => Ok(existing),
            FailWrite::Fail { participation_id } => {
                let failed = Participation {
                    payment_status: PaymentStatus::Failed,
                    ..existing
                };
                state.participations.insert(participation_id, failed.clone());
                Ok(failed)
            }
        }
    }

    async fn round_participants(&self, round_id: i64) -> Result<Vec<Participant>, AuctionError> {
        let state = self.state.lock().await;
        let mut participants: Vec<Participant> = state
            .participations
            .values()
            .filter(|p| p.round_id == round_id && p.is_completed())
            .map(|p| {
                let user = state.users.get(&p.user_id);
                Participant {
                    participation: p.clone(),
                    username: user.map(|u| u.username.clone()).unwrap_or_default(),
                    display_name: user.map(|u| u.display_name.clone()).unwrap_or_default(),
                }
            })
            .collect();
        participants.sort_by(|a, b| b.participation.paid_at.cmp(&a.participation.paid_at));
        Ok(participants)
    }

    async fn auction_participations(&self, auction_id: i64) -> Result<Vec<Participation>, AuctionError> {
        let state = self.state.lock().await;
        Ok(state
            .participations
            .values()
            .filter(|p| {
                state
                    .rounds
                    .get(&p.round_id)
                    .is_some_and(|r| r.auction_id == auction_id)
            })
            .cloned()
            .collect())
    }

    async fn submit_pledge(
        &self,
        user_id: i64,
        round_id: i64,
        amount: Decimal,
        now: DateTime<Utc>,
    ) -> Result<PledgeOutcome, AuctionError> {
        let mut state = self.state.lock().await;
        let round = state.round(round_id)?.clone();
        let participation = state.participation_of(user_id, round_id);
        let existing = state.pledge_of(user_id, round_id);

        let change = validate_pledge(
            &PledgeContext {
                round: &round,
                participation: participation.as_ref(),
                existing: existing.as_ref(),
            },
            amount,
        )?;

        let pledge = match (change, existing) {
            (PledgeChange::Unchanged, Some(current)) => current,
            (PledgeChange::Raise { .. }, Some(current)) => Pledge {
                pledge_amount: amount,
                updated_at: now,
                ..current
            },
            _ => Pledge {
                id: state.next_id(),
                user_id,
                round_id,
                auction_id: round.auction_id,
                pledge_amount: amount,
                submitted_at: now,
                updated_at: now,
            },
        };
        state.pledges.insert(pledge.id, pledge.clone());
        Ok(PledgeOutcome { pledge, change })
    }

    async fn get_pledge(&self, user_id: i64, round_id: i64) -> Result<Option<Pledge>, AuctionError> {
        Ok(self.state.lock().await.pledge_of(user_id, round_id))
    }

    async fn round_pledges(&self, round_id: i64) -> Result<Vec<PledgeRecord>, AuctionError> {
        Ok(self.state.lock().await.records(|p| p.round_id == round_id))
    }

    async fn auction_pledges(&self, auction_id: i64) -> Result<Vec<PledgeRecord>, AuctionError> {
        Ok(self.state.lock().await.records(|p| p.auction_id == auction_id))
    }
}
// endregion: --- Memory Ledger Store
