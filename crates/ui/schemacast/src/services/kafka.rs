//! Kafka transport on top of `rskafka`.
//!
//! The client connects lazily on first use. Consumers read every partition of
//! a topic from its earliest offset; each fetch continues where the previous
//! one stopped.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rskafka::client::{
    partition::{Compression, OffsetAt, PartitionClient, UnknownTopicHandling},
    Client, ClientBuilder, Credentials, SaslConfig,
};
use rskafka::record::Record;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use crate::config::KafkaConfig;

/// Upper bound for one fetch response per partition.
const FETCH_MAX_BYTES: i32 = 1024 * 1024;
/// How long the broker may hold a fetch open when there is nothing new.
const FETCH_WAIT_MS: i32 = 250;

#[derive(Debug, thiserror::Error)]
pub enum BrokerError {
    #[error("KAFKA_BOOTSTRAP_SERVERS not configured")]
    NotConfigured,
    #[error("SASL username and password are required")]
    MissingCredentials,
    #[error("TLS setup failed: {0}")]
    Tls(#[from] rustls::Error),
    #[error("kafka: {0}")]
    Client(#[from] rskafka::client::error::Error),
    #[error("topic `{0}` does not exist")]
    UnknownTopic(String),
    #[error("topic `{0}` has no partitions")]
    NoPartitions(String),
    #[error("timed out after {}s", .0.as_secs())]
    Timeout(Duration),
}

/// A fully encoded message ready to be produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundRecord {
    pub topic: String,
    pub key: Option<Vec<u8>>,
    pub value: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsumedMessage {
    pub partition: i32,
    pub offset: i64,
    pub key: Option<Vec<u8>>,
    pub value: Option<Vec<u8>>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    Messages(Vec<ConsumedMessage>),
    /// Every partition is caught up.
    Empty,
    /// Nothing arrived before the deadline.
    TimedOut,
}

#[async_trait]
pub trait Broker: Send + Sync {
    async fn publish(&self, record: OutboundRecord) -> Result<(), BrokerError>;

    async fn open_consumer(&self, topic: &str) -> Result<ConsumerHandle, BrokerError>;
}

#[async_trait]
pub trait MessageConsumer: Send {
    async fn fetch(&mut self, max: usize, timeout: Duration) -> Result<FetchOutcome, BrokerError>;

    async fn close(self: Box<Self>);
}

/// Owned consumer. Moves into a fetch task and comes back with its result.
pub struct ConsumerHandle {
    topic: String,
    inner: Box<dyn MessageConsumer>,
}

impl ConsumerHandle {
    pub fn new(topic: impl Into<String>, inner: Box<dyn MessageConsumer>) -> Self {
        Self {
            topic: topic.into(),
            inner,
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub async fn fetch(&mut self, max: usize, timeout: Duration) -> Result<FetchOutcome, BrokerError> {
        self.inner.fetch(max, timeout).await
    }

    pub async fn close(self) {
        debug!(topic = %self.topic, "closing consumer");
        self.inner.close().await;
    }
}

impl fmt::Debug for ConsumerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConsumerHandle")
            .field("topic", &self.topic)
            .finish_non_exhaustive()
    }
}

/// One poll of an underlying record stream. An empty batch means caught up.
#[async_trait]
pub trait RecordSource: Send {
    /// Returns at most `max` records.
    async fn poll(&mut self, max: usize) -> Result<Vec<ConsumedMessage>, BrokerError>;
}

/// Gather up to `max` records within `timeout`.
///
/// Stops early on an empty poll. Records gathered before a deadline or a later
/// error are returned; an error before the first record is propagated.
pub async fn collect_batch<S>(source: &mut S, max: usize, timeout: Duration) -> Result<FetchOutcome, BrokerError>
where
    S: RecordSource + ?Sized,
{
    let deadline = tokio::time::Instant::now() + timeout;
    let mut out: Vec<ConsumedMessage> = Vec::new();
    let mut timed_out = false;

    while out.len() < max {
        let want = max - out.len();
        match tokio::time::timeout_at(deadline, source.poll(want)).await {
            Err(_) => {
                timed_out = true;
                break;
            }
            Ok(Ok(batch)) if batch.is_empty() => break,
            Ok(Ok(batch)) => out.extend(batch.into_iter().take(want)),
            Ok(Err(err)) if out.is_empty() => return Err(err),
            Ok(Err(err)) => {
                warn!(error = %err, kept = out.len(), "fetch interrupted, returning partial batch");
                break;
            }
        }
    }

    Ok(match (out.is_empty(), timed_out) {
        (false, _) => FetchOutcome::Messages(out),
        (true, true) => FetchOutcome::TimedOut,
        (true, false) => FetchOutcome::Empty,
    })
}

/// Partition for a record: hash of the key, round-robin without one.
pub fn choose_partition(key: Option<&[u8]>, partitions: &[i32], round_robin: &AtomicUsize) -> Option<i32> {
    if partitions.is_empty() {
        return None;
    }
    let slot = match key {
        Some(key) => (fnv1a(key) % partitions.len() as u64) as usize,
        None => round_robin.fetch_add(1, Ordering::Relaxed) % partitions.len(),
    };
    partitions.get(slot).copied()
}

fn fnv1a(bytes: &[u8]) -> u64 {
    bytes.iter().fold(0xcbf2_9ce4_8422_2325_u64, |hash, b| {
        (hash ^ u64::from(*b)).wrapping_mul(0x0000_0100_0000_01b3)
    })
}

pub struct KafkaBroker {
    cfg: KafkaConfig,
    client: OnceCell<Arc<Client>>,
    round_robin: AtomicUsize,
}

impl KafkaBroker {
    /// Fails fast on settings that can never connect.
    pub fn new(cfg: KafkaConfig) -> Result<Self, BrokerError> {
        if !cfg.is_configured() {
            return Err(BrokerError::NotConfigured);
        }
        if cfg.security_protocol.uses_sasl()
            && (cfg.sasl_username.is_empty() || cfg.sasl_password.is_empty())
        {
            return Err(BrokerError::MissingCredentials);
        }
        Ok(Self {
            cfg,
            client: OnceCell::new(),
            round_robin: AtomicUsize::new(0),
        })
    }

    async fn client(&self) -> Result<&Arc<Client>, BrokerError> {
        self.client.get_or_try_init(|| connect(&self.cfg)).await
    }

    async fn partitions(&self, client: &Client, topic: &str) -> Result<Vec<i32>, BrokerError> {
        let topics = client.list_topics().await?;
        let found = topics
            .into_iter()
            .find(|t| t.name == topic)
            .ok_or_else(|| BrokerError::UnknownTopic(topic.to_string()))?;
        let partitions: Vec<i32> = found.partitions.into_iter().collect();
        if partitions.is_empty() {
            return Err(BrokerError::NoPartitions(topic.to_string()));
        }
        Ok(partitions)
    }
}

async fn connect(cfg: &KafkaConfig) -> Result<Arc<Client>, BrokerError> {
    let mut builder = ClientBuilder::new(cfg.brokers());
    if cfg.security_protocol.uses_tls() {
        builder = builder.tls_config(Arc::new(tls_config()?));
    }
    if cfg.security_protocol.uses_sasl() {
        builder = builder.sasl_config(SaslConfig::Plain(Credentials::new(
            cfg.sasl_username.clone(),
            cfg.sasl_password.clone(),
        )));
    }
    info!(
        brokers = %cfg.bootstrap_servers,
        protocol = %cfg.security_protocol,
        "connecting to kafka"
    );
    Ok(Arc::new(builder.build().await?))
}

fn tls_config() -> Result<rustls::ClientConfig, BrokerError> {
    let mut roots = rustls::RootCertStore::empty();
    roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    let provider = Arc::new(rustls::crypto::ring::default_provider());
    Ok(rustls::ClientConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()?
        .with_root_certificates(roots)
        .with_no_client_auth())
}

#[async_trait]
impl Broker for KafkaBroker {
    async fn publish(&self, record: OutboundRecord) -> Result<(), BrokerError> {
        let client = self.client().await?;
        let partitions = self.partitions(client, &record.topic).await?;
        let partition = choose_partition(record.key.as_deref(), &partitions, &self.round_robin)
            .ok_or_else(|| BrokerError::NoPartitions(record.topic.clone()))?;

        let producer = client
            .partition_client(record.topic.clone(), partition, UnknownTopicHandling::Error)
            .await?;
        let offsets = producer
            .produce(
                vec![Record {
                    key: record.key,
                    value: Some(record.value),
                    headers: BTreeMap::new(),
                    timestamp: Utc::now(),
                }],
                Compression::NoCompression,
            )
            .await?;
        info!(topic = %record.topic, partition, ?offsets, "message produced");
        Ok(())
    }

    async fn open_consumer(&self, topic: &str) -> Result<ConsumerHandle, BrokerError> {
        let client = self.client().await?;
        let mut cursors = Vec::new();
        for partition in self.partitions(client, topic).await? {
            let pc = client
                .partition_client(topic.to_string(), partition, UnknownTopicHandling::Error)
                .await?;
            let next_offset = pc.get_offset(OffsetAt::Earliest).await?;
            cursors.push(PartitionCursor {
                client: pc,
                partition,
                next_offset,
                caught_up: false,
            });
        }
        info!(topic, partitions = cursors.len(), "consumer opened");
        Ok(ConsumerHandle::new(topic, Box::new(KafkaConsumer { cursors })))
    }
}

struct PartitionCursor {
    client: PartitionClient,
    partition: i32,
    next_offset: i64,
    caught_up: bool,
}

struct KafkaConsumer {
    cursors: Vec<PartitionCursor>,
}

#[async_trait]
impl RecordSource for KafkaConsumer {
    async fn poll(&mut self, max: usize) -> Result<Vec<ConsumedMessage>, BrokerError> {
        let mut out = Vec::new();
        for cursor in self.cursors.iter_mut().filter(|c| !c.caught_up) {
            if out.len() >= max {
                break;
            }
            let (records, high_watermark) = cursor
                .client
                .fetch_records(cursor.next_offset, 1..FETCH_MAX_BYTES, FETCH_WAIT_MS)
                .await?;
            if records.is_empty() {
                cursor.caught_up = cursor.next_offset >= high_watermark;
                continue;
            }
            for item in records.into_iter().take(max - out.len()) {
                cursor.next_offset = item.offset + 1;
                out.push(ConsumedMessage {
                    partition: cursor.partition,
                    offset: item.offset,
                    key: item.record.key,
                    value: item.record.value,
                    timestamp: item.record.timestamp,
                });
            }
        }
        Ok(out)
    }
}

#[async_trait]
impl MessageConsumer for KafkaConsumer {
    async fn fetch(&mut self, max: usize, timeout: Duration) -> Result<FetchOutcome, BrokerError> {
        // A new fetch may find records produced since the last one.
        for cursor in &mut self.cursors {
            cursor.caught_up = false;
        }
        collect_batch(self, max, timeout).await
    }

    async fn close(self: Box<Self>) {
        drop(self);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::VecDeque;

    fn msg(offset: i64) -> ConsumedMessage {
        ConsumedMessage {
            partition: 0,
            offset,
            key: None,
            value: Some(vec![offset as u8]),
            timestamp: DateTime::<Utc>::UNIX_EPOCH,
        }
    }

    enum Step {
        Batch(Vec<ConsumedMessage>),
        Fail,
        Hang,
    }

    struct Scripted {
        steps: VecDeque<Step>,
    }

    impl Scripted {
        fn new(steps: Vec<Step>) -> Self {
            Self {
                steps: steps.into(),
            }
        }
    }

    #[async_trait]
    impl RecordSource for Scripted {
        async fn poll(&mut self, max: usize) -> Result<Vec<ConsumedMessage>, BrokerError> {
            match self.steps.pop_front() {
                Some(Step::Batch(mut batch)) => {
                    batch.truncate(max);
                    Ok(batch)
                }
                Some(Step::Fail) => Err(BrokerError::UnknownTopic("t".into())),
                Some(Step::Hang) => std::future::pending().await,
                None => Ok(Vec::new()),
            }
        }
    }

    fn offsets(outcome: FetchOutcome) -> Vec<i64> {
        match outcome {
            FetchOutcome::Messages(m) => m.into_iter().map(|m| m.offset).collect(),
            other => panic!("expected messages, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn short_topic_returns_what_is_available() {
        let mut src = Scripted::new(vec![Step::Batch(vec![msg(0), msg(1), msg(2)])]);
        let outcome = collect_batch(&mut src, 10, Duration::from_secs(5)).await.unwrap();
        assert_eq!(offsets(outcome), vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn batch_is_capped_at_max() {
        let mut src = Scripted::new(vec![
            Step::Batch((0..6).map(msg).collect()),
            Step::Batch((6..12).map(msg).collect()),
        ]);
        let outcome = collect_batch(&mut src, 10, Duration::from_secs(5)).await.unwrap();
        assert_eq!(offsets(outcome), (0..10).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn caught_up_topic_is_empty() {
        let mut src = Scripted::new(vec![]);
        let outcome = collect_batch(&mut src, 10, Duration::from_secs(5)).await.unwrap();
        assert_eq!(outcome, FetchOutcome::Empty);
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_without_records_times_out() {
        let mut src = Scripted::new(vec![Step::Hang]);
        let outcome = collect_batch(&mut src, 10, Duration::from_secs(5)).await.unwrap();
        assert_eq!(outcome, FetchOutcome::TimedOut);
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_keeps_partial_batch() {
        let mut src = Scripted::new(vec![Step::Batch(vec![msg(7)]), Step::Hang]);
        let outcome = collect_batch(&mut src, 10, Duration::from_secs(5)).await.unwrap();
        assert_eq!(offsets(outcome), vec![7]);
    }

    #[tokio::test]
    async fn first_error_is_propagated_later_error_is_not() {
        let mut failing = Scripted::new(vec![Step::Fail]);
        assert!(collect_batch(&mut failing, 10, Duration::from_secs(5)).await.is_err());

        let mut partial = Scripted::new(vec![Step::Batch(vec![msg(1)]), Step::Fail]);
        let outcome = collect_batch(&mut partial, 10, Duration::from_secs(5)).await.unwrap();
        assert_eq!(offsets(outcome), vec![1]);
    }

    #[test]
    fn keyed_records_stick_to_a_partition() {
        let rr = AtomicUsize::new(0);
        let parts = [0, 1, 2, 3];
        let first = choose_partition(Some(&b"customer-42"[..]), &parts, &rr);
        for _ in 0..5 {
            assert_eq!(choose_partition(Some(&b"customer-42"[..]), &parts, &rr), first);
        }
    }

    #[test]
    fn unkeyed_records_rotate() {
        let rr = AtomicUsize::new(0);
        let parts = [5, 6];
        let picks: Vec<_> = (0..4).map(|_| choose_partition(None, &parts, &rr)).collect();
        assert_eq!(picks, vec![Some(5), Some(6), Some(5), Some(6)]);
        assert_eq!(choose_partition(None, &[], &rr), None);
    }

    #[test]
    fn sasl_without_credentials_is_rejected() {
        let cfg = KafkaConfig {
            bootstrap_servers: "broker:9092".into(),
            security_protocol: crate::config::SecurityProtocol::SaslSsl,
            ..Default::default()
        };
        assert!(matches!(KafkaBroker::new(cfg), Err(BrokerError::MissingCredentials)));
        assert!(matches!(
            KafkaBroker::new(KafkaConfig::default()),
            Err(BrokerError::NotConfigured)
        ));
    }
}
