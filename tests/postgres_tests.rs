//! PostgreSQL 저장소 테스트
//! DATABASE_URL 이 가리키는 데이터베이스가 필요하므로 기본 실행에서 제외된다.
//! 실행: DATABASE_URL=postgres://... cargo test --test postgres_tests -- --ignored

mod common;

use common::code;
use pledge_auction::bidding::commands::{ParticipationCommand, PlacePledgeCommand};
use pledge_auction::config::DatabaseConfig;
use pledge_auction::database::DatabaseManager;
use pledge_auction::engine::AuctionEngine;
use pledge_auction::ledger::PostgresLedgerStore;
use pledge_auction::notifier::BroadcastNotifier;
use pledge_auction::round::closer::RandomTieBreaker;
use pledge_auction::round::lifecycle::{NewAuction, NextRoundParams, PledgeRange};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;

async fn setup() -> AuctionEngine {
    common::init_tracing();
    let config = DatabaseConfig {
        url: std::env::var("DATABASE_URL").expect("DATABASE_URL 이 필요합니다"),
        max_connections: 10,
        reset: false,
    };
    let db = Arc::new(DatabaseManager::connect(&config).await.unwrap());
    db.initialize_database(false).await.unwrap();
    AuctionEngine::new(
        Arc::new(PostgresLedgerStore::new(db)),
        Arc::new(BroadcastNotifier::default()),
        Arc::new(RandomTieBreaker::seeded(3)),
    )
}

/// 테스트 실행마다 겹치지 않는 사용자 이름
fn unique(prefix: &str) -> String {
    format!("{}-{}", prefix, chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default())
}

async fn open_auction(engine: &AuctionEngine) -> (i64, i64) {
    let auction = engine
        .create_auction(NewAuction {
            title: "DB 테스트 경매".to_string(),
            base_price: dec!(1000),
            participation_fee: dec!(100),
            product_type: None,
        })
        .await
        .unwrap();
    let activation = engine
        .activate_auction(
            auction.id,
            Some(PledgeRange {
                min_pledge: dec!(1000),
                max_pledge: dec!(5000),
            }),
        )
        .await
        .unwrap();
    (auction.id, activation.round.unwrap().id)
}

async fn paid_user(engine: &AuctionEngine, round_id: i64, name: &str) -> i64 {
    let user = engine.upsert_user(&unique(name), name).await.unwrap();
    engine
        .mark_participation_paid(ParticipationCommand {
            user_id: user.id,
            round_id,
            fee_paid: dec!(100),
            paid_at: None,
        })
        .await
        .unwrap();
    user.id
}

fn pledge(user_id: i64, round_id: i64, amount: Decimal) -> PlacePledgeCommand {
    PlacePledgeCommand {
        user_id,
        round_id,
        pledge_amount: amount,
    }
}

#[tokio::test]
#[ignore]
async fn test_round_lifecycle_on_postgres() {
    let engine = setup().await;
    let (auction_id, round_id) = open_auction(&engine).await;
    let dave = paid_user(&engine, round_id, "dave").await;
    let eve = paid_user(&engine, round_id, "eve").await;

    let err = engine.place_pledge(pledge(dave, round_id, dec!(800))).await.unwrap_err();
    assert_eq!(code(&err), "BELOW_MINIMUM");
    engine.place_pledge(pledge(dave, round_id, dec!(2000))).await.unwrap();
    engine.place_pledge(pledge(eve, round_id, dec!(1000))).await.unwrap();
    let err = engine.place_pledge(pledge(dave, round_id, dec!(1500))).await.unwrap_err();
    assert_eq!(code(&err), "CANNOT_LOWER_PLEDGE");

    let advance = engine
        .close_and_advance(round_id, NextRoundParams::default())
        .await
        .unwrap();
    assert_eq!(advance.closed.winner.map(|w| w.user_id), Some(dave));
    let err = engine.place_pledge(pledge(dave, round_id, dec!(3000))).await.unwrap_err();
    assert_eq!(code(&err), "ROUND_CLOSED");

    let round2 = engine.activate_round(advance.next_round.id, None).await.unwrap();
    engine
        .mark_participation_paid(ParticipationCommand {
            user_id: eve,
            round_id: round2.id,
            fee_paid: dec!(100),
            paid_at: None,
        })
        .await
        .unwrap();
    engine.place_pledge(pledge(eve, round2.id, dec!(3000))).await.unwrap();
    engine.close_round(round2.id).await.unwrap();

    let finalized = engine.finalize_auction(auction_id).await.unwrap();
    assert_eq!(finalized.result.total_rounds, 2);
    assert_eq!(finalized.auction.winner_user_id, Some(eve));
    assert_eq!(finalized.auction.winning_average, Some(dec!(2000)));
}

/// 동시 상향과 종료 경합
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[ignore]
async fn test_concurrent_pledges_and_close_on_postgres() {
    let engine = setup().await;
    let (_, round_id) = open_auction(&engine).await;
    let mut users = Vec::new();
    for i in 0..6 {
        users.push(paid_user(&engine, round_id, &format!("racer{}", i)).await);
    }

    let mut tasks = Vec::new();
    for (i, user_id) in users.iter().copied().enumerate() {
        let engine = engine.clone();
        tasks.push(tokio::spawn(async move {
            for step in 1..=10i64 {
                let amount = dec!(1000) + Decimal::from(step * 100 + i as i64);
                if engine.place_pledge(pledge(user_id, round_id, amount)).await.is_err() {
                    break;
                }
            }
        }));
    }
    let result = engine.close_round(round_id).await.unwrap();
    for task in tasks {
        task.await.unwrap();
    }

    let ranked = engine.ranked_pledges(round_id).await.unwrap();
    if let Some(top) = ranked.first() {
        assert_eq!(result.winner.map(|w| w.amount), Some(top.pledge_amount));
    }
}
