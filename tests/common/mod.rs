#![allow(dead_code)]

use pledge_auction::auction::model::{Auction, Round, UserProfile};
use pledge_auction::bidding::commands::{ParticipationCommand, PlacePledgeCommand, PledgeReceipt};
use pledge_auction::engine::AuctionEngine;
use pledge_auction::error::AuctionError;
use pledge_auction::ledger::MemoryLedgerStore;
use pledge_auction::notifier::BroadcastNotifier;
use pledge_auction::round::closer::RandomTieBreaker;
use pledge_auction::round::lifecycle::{NewAuction, PledgeRange};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;

/// 트레이싱 초기화 (여러 테스트에서 호출해도 안전)
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .without_time()
        .with_target(false)
        .with_test_writer()
        .try_init();
}

pub struct TestApp {
    pub engine: AuctionEngine,
    pub store: Arc<MemoryLedgerStore>,
    pub hub: BroadcastNotifier,
}

/// 메모리 저장소 기반 엔진
pub fn setup() -> TestApp {
    init_tracing();
    let store = Arc::new(MemoryLedgerStore::new());
    let hub = BroadcastNotifier::new(256);
    let engine = AuctionEngine::new(
        store.clone(),
        Arc::new(hub.clone()),
        Arc::new(RandomTieBreaker::seeded(7)),
    );
    TestApp { engine, store, hub }
}

impl TestApp {
    pub async fn user(&self, name: &str) -> UserProfile {
        self.engine.upsert_user(name, name).await.unwrap()
    }

    /// base_price 1000, 참가비 100 인 draft 경매
    pub async fn auction(&self) -> Auction {
        self.engine
            .create_auction(NewAuction {
                title: "한정판 시계".to_string(),
                base_price: dec!(1000),
                participation_fee: dec!(100),
                product_type: None,
            })
            .await
            .unwrap()
    }

    /// 1라운드를 [min, max] 로 열어둔 경매
    pub async fn open_round(&self, min: Decimal, max: Decimal) -> (Auction, Round) {
        let auction = self.auction().await;
        let activation = self
            .engine
            .activate_auction(
                auction.id,
                Some(PledgeRange {
                    min_pledge: min,
                    max_pledge: max,
                }),
            )
            .await
            .unwrap();
        (activation.auction, activation.round.unwrap())
    }

    pub async fn pay(&self, user: &UserProfile, round: &Round) {
        self.engine
            .mark_participation_paid(ParticipationCommand {
                user_id: user.id,
                round_id: round.id,
                fee_paid: round.participation_fee,
                paid_at: None,
            })
            .await
            .unwrap();
    }

    pub async fn pledge(
        &self,
        user: &UserProfile,
        round: &Round,
        amount: Decimal,
    ) -> Result<PledgeReceipt, AuctionError> {
        self.engine
            .place_pledge(PlacePledgeCommand {
                user_id: user.id,
                round_id: round.id,
                pledge_amount: amount,
            })
            .await
    }

    pub async fn stored_amount(&self, user: &UserProfile, round: &Round) -> Option<Decimal> {
        self.engine
            .store()
            .get_pledge(user.id, round.id)
            .await
            .unwrap()
            .map(|p| p.pledge_amount)
    }
}

/// 거절 코드 추출
pub fn code(err: &AuctionError) -> &'static str {
    err.rejection().map(|r| r.code()).unwrap_or("NOT_A_REJECTION")
}
