/*!
Task executor.

Interprets `Effect::Async(TaskKind)` outside the event loop:

- The loop calls [`TaskExecutor::spawn`], which allocates a task id and sends
  a `Dispatch` over an unbounded channel.
- A single `Worker` pulls dispatches and starts one Tokio task per dispatch,
  so a slow publish never holds up a schema fetch.
- Every task ends by emitting exactly one `InternalEvent::Task(TaskResult)`
  back into the loop.

Deadlines live here, not in the gateways: publish and consumer open are
bounded by [`PUBLISH_TIMEOUT`], fetches by [`CONSUME_TIMEOUT`].

The executor never panics on purpose. If the loop has gone away the result is
dropped; a consumer handle inside it is closed first.
*/

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::core::effects::{InternalEvent, TaskKind, TaskResult};
use crate::services::kafka::{Broker, BrokerError, ConsumerHandle};
use crate::services::registry::SchemaRegistry;

pub const PUBLISH_TIMEOUT: Duration = Duration::from_secs(10);
pub const CONSUME_TIMEOUT: Duration = Duration::from_secs(5);

/// Monotonic task identifier type.
pub type TaskId = u64;

/// Remote collaborators the tasks talk to.
#[derive(Clone)]
pub struct Gateways {
    pub registry: Arc<dyn SchemaRegistry>,
    /// `None` when no bootstrap servers are configured.
    pub broker: Option<Arc<dyn Broker>>,
}

/// Cloneable handle for scheduling background tasks.
#[derive(Clone)]
pub struct TaskExecutor {
    tx: mpsc::UnboundedSender<Dispatch>,
}

struct Dispatch {
    id: TaskId,
    kind: TaskKind,
}

impl TaskExecutor {
    /// Create the executor and spawn its worker. Must be called inside a Tokio runtime.
    pub fn new(gateways: Gateways, internal_tx: mpsc::UnboundedSender<InternalEvent>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel::<Dispatch>();
        Worker {
            rx,
            gateways,
            internal_tx,
        }
        .spawn();
        Self { tx }
    }

    /// Schedule a task. Returns the allocated id for log correlation.
    pub fn spawn(&self, kind: TaskKind) -> TaskId {
        static NEXT_ID: AtomicU64 = AtomicU64::new(1);
        let id = NEXT_ID.fetch_add(1, Ordering::Relaxed);
        if let Err(e) = self.tx.send(Dispatch { id, kind }) {
            warn!("TaskExecutor channel closed; failed to schedule task {}", e.0.kind);
        }
        id
    }
}

struct Worker {
    rx: mpsc::UnboundedReceiver<Dispatch>,
    gateways: Gateways,
    internal_tx: mpsc::UnboundedSender<InternalEvent>,
}

impl Worker {
    fn spawn(mut self) {
        tokio::spawn(async move {
            while let Some(dispatch) = self.rx.recv().await {
                let gateways = self.gateways.clone();
                let tx = self.internal_tx.clone();
                tokio::spawn(async move {
                    let Dispatch { id, kind } = dispatch;
                    debug!("[task:{id}] start {kind}");
                    let result = run(&gateways, kind).await;
                    emit(&tx, id, result).await;
                });
            }
            info!("TaskExecutor worker stopped (channel closed)");
        });
    }
}

async fn emit(tx: &mpsc::UnboundedSender<InternalEvent>, id: TaskId, result: TaskResult) {
    if let Err(mpsc::error::SendError(event)) = tx.send(InternalEvent::Task(result)) {
        debug!("[task:{id}] loop gone; result dropped");
        let consumer = match event {
            InternalEvent::Task(TaskResult::Fetched { consumer, .. }) => Some(consumer),
            InternalEvent::Task(TaskResult::ConsumerOpened { result: Ok(consumer), .. }) => {
                Some(consumer)
            }
            _ => None,
        };
        if let Some(consumer) = consumer {
            consumer.close().await;
        }
    }
}

fn broker(gateways: &Gateways) -> Result<&Arc<dyn Broker>, BrokerError> {
    gateways.broker.as_ref().ok_or(BrokerError::NotConfigured)
}

async fn run(gateways: &Gateways, kind: TaskKind) -> TaskResult {
    match kind {
        TaskKind::ListSubjects => {
            let result = gateways.registry.list_subjects().await;
            if let Err(err) = &result {
                warn!(error = %err, "listing subjects failed");
            }
            TaskResult::SubjectsLoaded(result.map_err(|e| e.to_string()))
        }
        TaskKind::FetchSchema { tag } => {
            let result = gateways.registry.latest_schema(&tag.subject).await;
            match &result {
                Ok(found) => info!(
                    subject = %found.subject,
                    version = found.version,
                    id = found.id,
                    "schema fetched"
                ),
                Err(err) => warn!(subject = %tag.subject, error = %err, "schema fetch failed"),
            }
            TaskResult::SchemaLoaded {
                tag,
                result: result.map_err(|e| e.to_string()),
            }
        }
        TaskKind::Publish { tag, record } => {
            let topic = record.topic.clone();
            let result: Result<(), BrokerError> = async {
                let broker = broker(gateways)?;
                tokio::time::timeout(PUBLISH_TIMEOUT, broker.publish(record))
                    .await
                    .map_err(|_| BrokerError::Timeout(PUBLISH_TIMEOUT))?
            }
            .await;
            match &result {
                Ok(()) => info!(%topic, "message published"),
                Err(err) => warn!(%topic, error = %err, "publish failed"),
            }
            TaskResult::Published {
                tag,
                topic,
                result: result.map_err(|e| e.to_string()),
            }
        }
        TaskKind::OpenConsumer { tag, topic } => {
            let result: Result<ConsumerHandle, BrokerError> = async {
                let broker = broker(gateways)?;
                tokio::time::timeout(PUBLISH_TIMEOUT, broker.open_consumer(&topic))
                    .await
                    .map_err(|_| BrokerError::Timeout(PUBLISH_TIMEOUT))?
            }
            .await;
            if let Err(err) = &result {
                warn!(%topic, error = %err, "opening consumer failed");
            }
            TaskResult::ConsumerOpened {
                tag,
                result: result.map_err(|e| e.to_string()),
            }
        }
        TaskKind::Fetch {
            tag,
            mut consumer,
            max,
        } => {
            let result = consumer.fetch(max, CONSUME_TIMEOUT).await;
            match &result {
                Ok(outcome) => debug!(topic = consumer.topic(), ?outcome, "fetch finished"),
                Err(err) => warn!(topic = consumer.topic(), error = %err, "fetch failed"),
            }
            TaskResult::Fetched {
                tag,
                consumer,
                result: result.map_err(|e| e.to_string()),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::state::RequestTag;
    use crate::services::kafka::OutboundRecord;
    use crate::services::registry::{RegistryError, SubjectSchema};
    use async_trait::async_trait;

    struct Subjects;

    #[async_trait]
    impl SchemaRegistry for Subjects {
        async fn list_subjects(&self) -> Result<Vec<String>, RegistryError> {
            Ok(vec!["orders-value".into()])
        }

        async fn latest_schema(&self, subject: &str) -> Result<SubjectSchema, RegistryError> {
            Ok(SubjectSchema {
                subject: subject.into(),
                version: 1,
                id: 1,
                schema_type: None,
                schema: "\"string\"".into(),
            })
        }
    }

    struct Stalled;

    #[async_trait]
    impl Broker for Stalled {
        async fn publish(&self, _record: OutboundRecord) -> Result<(), BrokerError> {
            std::future::pending().await
        }

        async fn open_consumer(&self, _topic: &str) -> Result<ConsumerHandle, BrokerError> {
            std::future::pending().await
        }
    }

    fn tag() -> RequestTag {
        RequestTag {
            seq: 1,
            subject: "orders-value".into(),
            schema_id: Some(1),
        }
    }

    fn executor(broker: Option<Arc<dyn Broker>>) -> (TaskExecutor, mpsc::UnboundedReceiver<InternalEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let gateways = Gateways {
            registry: Arc::new(Subjects),
            broker,
        };
        (TaskExecutor::new(gateways, tx), rx)
    }

    #[tokio::test]
    async fn completions_come_back_as_internal_events() {
        let (exec, mut rx) = executor(None);
        exec.spawn(TaskKind::ListSubjects);
        match rx.recv().await {
            Some(InternalEvent::Task(TaskResult::SubjectsLoaded(Ok(subjects)))) => {
                assert_eq!(subjects, vec!["orders-value".to_string()]);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn publish_without_broker_fails_fast() {
        let (exec, mut rx) = executor(None);
        exec.spawn(TaskKind::Publish {
            tag: tag(),
            record: OutboundRecord {
                topic: "orders".into(),
                key: None,
                value: vec![0, 0, 0, 0, 1],
            },
        });
        match rx.recv().await {
            Some(InternalEvent::Task(TaskResult::Published { result: Err(err), .. })) => {
                assert_eq!(err, "KAFKA_BOOTSTRAP_SERVERS not configured");
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn publish_is_bounded_by_timeout() {
        let (exec, mut rx) = executor(Some(Arc::new(Stalled)));
        exec.spawn(TaskKind::Publish {
            tag: tag(),
            record: OutboundRecord {
                topic: "orders".into(),
                key: None,
                value: vec![0, 0, 0, 0, 1],
            },
        });
        match rx.recv().await {
            Some(InternalEvent::Task(TaskResult::Published { result: Err(err), tag, .. })) => {
                assert_eq!(err, "timed out after 10s");
                assert_eq!(tag.seq, 1);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }
}
