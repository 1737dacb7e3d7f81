// region:    --- Imports
use pledge_auction::config::Config;
use pledge_auction::database::DatabaseManager;
use pledge_auction::engine::AuctionEngine;
use pledge_auction::handlers::{self, AppState};
use pledge_auction::ledger::{LedgerStore, PostgresLedgerStore};
use pledge_auction::message_broker::{EventRelay, KafkaManager, KafkaNotifier};
use pledge_auction::notifier::{BroadcastNotifier, Notifier};
use pledge_auction::round::closer::RandomTieBreaker;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info};
// endregion: --- Imports

// region:    --- Main
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // logging 초기화
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .without_time()
        .with_target(false)
        .init();

    let config = Config::from_env()?;

    // DatabaseManager 생성
    let db_manager = Arc::new(DatabaseManager::connect(&config.database).await?);

    // 데이터베이스 초기화
    if let Err(e) = db_manager.initialize_database(config.database.reset).await {
        error!("{:<12} --> 데이터베이스 초기화 실패: {:?}", "Main", e);
        return Err(e.into());
    }
    info!("{:<12} --> 데이터베이스 초기화 성공", "Main");

    let store: Arc<dyn LedgerStore> = Arc::new(PostgresLedgerStore::new(Arc::clone(&db_manager)));

    // 이벤트 발행: Kafka 가 설정되면 토픽을 거쳐 모든 인스턴스의 허브로 전달
    let hub = BroadcastNotifier::default();
    let notifier: Arc<dyn Notifier> = match &config.kafka {
        Some(kafka) => {
            let kafka_manager = KafkaManager::new(kafka)?;
            kafka_manager
                .create_topic(kafka_manager.events_topic(), 5, 1)
                .await?;
            info!("{:<12} --> Kafka 초기화 성공", "Main");

            let relay = EventRelay::new(
                kafka_manager.get_consumer(),
                hub.clone(),
                kafka.events_topic.clone(),
            );
            tokio::spawn(relay.start());

            Arc::new(KafkaNotifier::new(
                kafka_manager.get_producer(),
                kafka.events_topic.clone(),
            ))
        }
        None => {
            info!("{:<12} --> Kafka 미설정, 로컬 허브로만 이벤트 전달", "Main");
            Arc::new(hub.clone())
        }
    };

    let tie_breaker = Arc::new(RandomTieBreaker::new(config.tie_break_seed));
    let engine = AuctionEngine::new(store, notifier, tie_breaker);
    let routes_all = handlers::router(AppState { engine, hub });

    let listener = TcpListener::bind(&config.bind_addr).await?;
    info!(
        "{:<12} --> Web Server: Listening on {}",
        "Main",
        listener.local_addr()?
    );

    // 서버 실행
    if let Err(err) = axum::serve(listener, routes_all.into_make_service()).await {
        error!("{:<12} --> Server error: {}", "Main", err);
    }
    Ok(())
}
// endregion: --- Main
