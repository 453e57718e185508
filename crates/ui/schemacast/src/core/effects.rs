/*!
Effect & task model.

The reducer never performs work itself. It returns `Effect`s which the loop
interprets:

- `Effect::Async(TaskKind)` is handed to the [`TaskExecutor`](crate::core::executor::TaskExecutor)
  and runs on the Tokio runtime. Its outcome re-enters as
  `InternalEvent::Task(TaskResult)`.
- `Effect::Io(IoRequest)` is local, quick work (draft files, clipboard,
  external editor). The loop performs it inline and feeds the outcome back as
  an `InternalEvent`.
- `Effect::CloseConsumer` releases a consumer handle in the background.

Every network completion carries the `RequestTag` it was issued with so the
reducer can drop results that no longer match what is on screen.
*/

use std::fmt;
use std::path::PathBuf;

use crate::core::state::RequestTag;
use crate::domain::drafts::{DraftEntry, SavedDraft};
use crate::services::kafka::{ConsumerHandle, FetchOutcome, OutboundRecord};
use crate::services::registry::SubjectSchema;

/// Declarative instruction emitted by the reducer.
#[derive(Debug)]
pub enum Effect {
    /// Spawn background (network) work.
    Async(TaskKind),
    /// Quick local work performed by the loop itself.
    Io(IoRequest),
    /// Release a consumer nobody is looking at anymore.
    CloseConsumer(ConsumerHandle),
}

impl Effect {
    pub fn async_task(kind: TaskKind) -> Self {
        Effect::Async(kind)
    }
}

#[derive(Debug)]
pub enum TaskKind {
    ListSubjects,
    FetchSchema { tag: RequestTag },
    Publish { tag: RequestTag, record: OutboundRecord },
    OpenConsumer { tag: RequestTag, topic: String },
    /// The handle travels with the task and comes back in the result.
    Fetch { tag: RequestTag, consumer: ConsumerHandle, max: usize },
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskKind::ListSubjects => write!(f, "ListSubjects"),
            TaskKind::FetchSchema { tag } => write!(f, "FetchSchema({}#{})", tag.subject, tag.seq),
            TaskKind::Publish { tag, record } => write!(
                f,
                "Publish(topic={} bytes={} #{})",
                record.topic,
                record.value.len(),
                tag.seq
            ),
            TaskKind::OpenConsumer { tag, topic } => {
                write!(f, "OpenConsumer(topic={topic} #{})", tag.seq)
            }
            TaskKind::Fetch { tag, consumer, max } => {
                write!(f, "Fetch(topic={} max={max} #{})", consumer.topic(), tag.seq)
            }
        }
    }
}

/// Outcome of a [`TaskKind`], errors already flattened to display text.
#[derive(Debug)]
pub enum TaskResult {
    SubjectsLoaded(Result<Vec<String>, String>),
    SchemaLoaded {
        tag: RequestTag,
        result: Result<SubjectSchema, String>,
    },
    Published {
        tag: RequestTag,
        topic: String,
        result: Result<(), String>,
    },
    ConsumerOpened {
        tag: RequestTag,
        result: Result<ConsumerHandle, String>,
    },
    Fetched {
        tag: RequestTag,
        consumer: ConsumerHandle,
        result: Result<FetchOutcome, String>,
    },
}

/// What a copy request put on the clipboard, for the confirmation line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum CopyTarget {
    Schema,
    Payload,
    Message,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IoRequest {
    SaveDraft {
        topic: String,
        schema_id: u32,
        payload: String,
        key: Option<String>,
        name: Option<String>,
    },
    ListDrafts { topic: String },
    LoadDraft { path: PathBuf },
    OpenEditor { text: String },
    Copy { what: CopyTarget, text: String },
}

/// Events produced by the system rather than the user.
#[derive(Debug)]
pub enum InternalEvent {
    Task(TaskResult),
    DraftSaved(Result<PathBuf, String>),
    DraftsListed {
        topic: String,
        result: Result<Vec<DraftEntry>, String>,
    },
    DraftLoaded(Result<SavedDraft, String>),
    EditorClosed(Result<String, String>),
    Copied {
        what: CopyTarget,
        result: Result<(), String>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_labels_name_the_work() {
        let tag = RequestTag {
            seq: 4,
            subject: "orders-value".into(),
            schema_id: Some(9),
        };
        let label = TaskKind::Publish {
            tag,
            record: OutboundRecord {
                topic: "orders".into(),
                key: None,
                value: vec![0; 12],
            },
        }
        .to_string();
        assert_eq!(label, "Publish(topic=orders bytes=12 #4)");
        assert_eq!(CopyTarget::Payload.to_string(), "payload");
    }
}
