//! Kafka 연동
//! 여러 인스턴스가 같은 토픽을 통해 실시간 이벤트를 공유한다.
//! 발행은 `KafkaNotifier`, 수신 후 로컬 허브로의 전달은 `EventRelay` 가 담당.
// region:    --- Imports
use crate::auction::events::AuctionEvent;
use crate::config::KafkaConfig;
use crate::notifier::{BroadcastNotifier, NotifyError, Notifier};
use async_trait::async_trait;
use rdkafka::admin::{AdminClient, AdminOptions, NewTopic, TopicReplication};
use rdkafka::client::DefaultClientContext;
use rdkafka::consumer::{Consumer, StreamConsumer};
use rdkafka::error::{KafkaError, RDKafkaErrorCode};
use rdkafka::message::Message;
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::ClientConfig;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

// endregion: --- Imports

// region:    --- Kafka Producer
#[derive(Clone)]
pub struct KafkaProducer {
    producer: Arc<FutureProducer>,
}

/// KafkaProducer 구현
impl KafkaProducer {
    pub fn new(brokers: &str) -> Result<Self, KafkaError> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", brokers)
            .set("message.timeout.ms", "5000")
            .create()?;

        Ok(KafkaProducer {
            producer: Arc::new(producer),
        })
    }

    /// 메시지 전송
    pub async fn send_message(&self, topic: &str, key: &str, value: &str) -> Result<(), NotifyError> {
        debug!(
            "{:<12} --> Kafka 메시지 전송: topic={}, key={}",
            "Producer", topic, key
        );
        let record = FutureRecord::to(topic).key(key).payload(value);

        self.producer
            .send(record, Duration::from_secs(0))
            .await
            .map_err(|(e, _)| NotifyError::Broker(format!("Error sending message: {:?}", e)))?;

        Ok(())
    }
}

// endregion: --- Kafka Producer

// region:    --- Kafka Consumer
pub struct KafkaConsumer {
    consumer: Arc<StreamConsumer>,
}

/// KafkaConsumer 구현
impl KafkaConsumer {
    pub fn new(brokers: &str, group_id: &str) -> Result<Self, KafkaError> {
        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", brokers)
            .set("group.id", group_id)
            .set("enable.auto.commit", "true")
            // 실시간 알림이므로 과거 이벤트는 재생하지 않는다
            .set("auto.offset.reset", "latest")
            .set("session.timeout.ms", "6000")
            .set("allow.auto.create.topics", "true")
            .create()?;

        Ok(KafkaConsumer {
            consumer: Arc::new(consumer),
        })
    }

    /// 이벤트 수신 루프. 구독 실패 시에만 반환한다.
    pub async fn consume_events<F>(&self, topic: &str, handler: F) -> Result<(), KafkaError>
    where
        F: Fn(AuctionEvent) + Send + 'static,
    {
        info!(
            "{:<12} --> Kafka 이벤트 수신 시작: topic={}",
            "Consumer", topic
        );
        self.consumer.subscribe(&[topic])?;

        loop {
            match self.consumer.recv().await {
                Ok(message) => {
                    debug!(
                        "{:<12} --> 메시지 수신: topic={}, partition={}, offset={}",
                        "Consumer",
                        message.topic(),
                        message.partition(),
                        message.offset()
                    );

                    match message.payload() {
                        Some(payload) => match serde_json::from_slice::<AuctionEvent>(payload) {
                            Ok(event) => handler(event),
                            Err(e) => error!("{:<12} --> deserialize 오류: {:?}", "Consumer", e),
                        },
                        None => warn!("{:<12} --> 빈 페이로드 수신", "Consumer"),
                    }
                }
                Err(e) => error!("{:<12} --> 메시지 수신 오류: {:?}", "Consumer", e),
            }
        }
    }
}

// endregion: --- Kafka Consumer

// region:    --- Kafka Manager
pub struct KafkaManager {
    producer: Arc<KafkaProducer>,
    consumer: Arc<KafkaConsumer>,
    config: KafkaConfig,
}

/// KafkaManager 구현
impl KafkaManager {
    pub fn new(config: &KafkaConfig) -> Result<Self, KafkaError> {
        let producer = Arc::new(KafkaProducer::new(&config.brokers)?);
        let consumer = Arc::new(KafkaConsumer::new(&config.brokers, &config.group_id)?);

        Ok(KafkaManager {
            producer,
            consumer,
            config: config.clone(),
        })
    }

    /// 프로듀서 반환
    pub fn get_producer(&self) -> Arc<KafkaProducer> {
        Arc::clone(&self.producer)
    }

    /// 컨슈머 반환
    pub fn get_consumer(&self) -> Arc<KafkaConsumer> {
        Arc::clone(&self.consumer)
    }

    pub fn events_topic(&self) -> &str {
        &self.config.events_topic
    }

    /// 토픽 생성 (이미 있으면 성공으로 취급)
    pub async fn create_topic(
        &self,
        topic_name: &str,
        num_partitions: i32,
        replication_factor: i32,
    ) -> Result<(), KafkaError> {
        info!("{:<12} --> Kafka 토픽 생성 시작: {}", "Manager", topic_name);

        let admin_client: AdminClient<DefaultClientContext> = ClientConfig::new()
            .set("bootstrap.servers", &self.config.brokers)
            .create()?;

        let new_topic = NewTopic::new(
            topic_name,
            num_partitions,
            TopicReplication::Fixed(replication_factor),
        );

        let results = admin_client
            .create_topics(&[new_topic], &AdminOptions::new())
            .await?;
        for result in results {
            match result {
                Ok(topic) => info!("{:<12} --> Kafka 토픽 생성 성공: {}", "Manager", topic),
                Err((topic, RDKafkaErrorCode::TopicAlreadyExists)) => {
                    info!("{:<12} --> Kafka 토픽 이미 존재: {}", "Manager", topic)
                }
                Err((topic, code)) => {
                    error!(
                        "{:<12} --> Kafka 토픽 생성 실패: {} ({:?})",
                        "Manager", topic, code
                    );
                    return Err(KafkaError::AdminOp(code));
                }
            }
        }
        Ok(())
    }
}

// endregion: --- Kafka Manager

// region:    --- Kafka Notifier
/// 라운드 id 를 키로 이벤트를 발행 (같은 라운드의 이벤트는 같은 파티션에서 순서 유지)
pub struct KafkaNotifier {
    producer: Arc<KafkaProducer>,
    topic: String,
}

impl KafkaNotifier {
    pub fn new(producer: Arc<KafkaProducer>, topic: impl Into<String>) -> Self {
        Self {
            producer,
            topic: topic.into(),
        }
    }
}

#[async_trait]
impl Notifier for KafkaNotifier {
    async fn publish(&self, event: &AuctionEvent) -> Result<(), NotifyError> {
        let payload = serde_json::to_string(event)?;
        let key = event.round_id().to_string();
        self.producer.send_message(&self.topic, &key, &payload).await
    }
}
// endregion: --- Kafka Notifier

// region:    --- Event Relay
/// 토픽의 이벤트를 로컬 허브 구독자(WebSocket)에게 전달
pub struct EventRelay {
    consumer: Arc<KafkaConsumer>,
    hub: BroadcastNotifier,
    topic: String,
}

impl EventRelay {
    pub fn new(consumer: Arc<KafkaConsumer>, hub: BroadcastNotifier, topic: impl Into<String>) -> Self {
        Self {
            consumer,
            hub,
            topic: topic.into(),
        }
    }

    pub async fn start(self) {
        let hub = self.hub.clone();
        if let Err(e) = self
            .consumer
            .consume_events(&self.topic, move |event| {
                hub.send(event);
            })
            .await
        {
            error!("{:<12} --> 이벤트 릴레이 중단: {:?}", "Relay", e);
        }
    }
}
// endregion: --- Event Relay
