//! Local side effects performed inline by the loop.
//!
//! Each request completes within the current event step and yields exactly one
//! [`InternalEvent`]. The editor hand-off is the exception in that the caller
//! has to suspend the terminal around it; see [`IoRequest::needs_terminal`].

use tracing::{info, warn};

use crate::core::effects::{InternalEvent, IoRequest};
use crate::domain::drafts::DraftStore;
use crate::domain::editor;
use crate::services::clipboard;

impl IoRequest {
    /// The request takes over the terminal (external editor).
    pub fn needs_terminal(&self) -> bool {
        matches!(self, IoRequest::OpenEditor { .. })
    }
}

pub struct LocalIo {
    drafts: DraftStore,
}

impl LocalIo {
    pub fn new(drafts: DraftStore) -> Self {
        Self { drafts }
    }

    pub fn perform(&self, request: IoRequest) -> InternalEvent {
        match request {
            IoRequest::SaveDraft {
                topic,
                schema_id,
                payload,
                key,
                name,
            } => {
                let result = self
                    .drafts
                    .save(&topic, schema_id, &payload, key.as_deref(), name.as_deref());
                match &result {
                    Ok(path) => info!(%topic, path = %path.display(), "draft saved"),
                    Err(err) => warn!(%topic, error = %err, "saving draft failed"),
                }
                InternalEvent::DraftSaved(result.map_err(|e| e.to_string()))
            }
            IoRequest::ListDrafts { topic } => {
                let result = self.drafts.list(&topic).map_err(|e| e.to_string());
                InternalEvent::DraftsListed { topic, result }
            }
            IoRequest::LoadDraft { path } => {
                let result = self.drafts.load(&path);
                if let Err(err) = &result {
                    warn!(error = %err, "loading draft failed");
                }
                InternalEvent::DraftLoaded(result.map_err(|e| e.to_string()))
            }
            IoRequest::OpenEditor { text } => {
                InternalEvent::EditorClosed(editor::open(&text).map_err(|e| e.to_string()))
            }
            IoRequest::Copy { what, text } => {
                let result = clipboard::copy(&text);
                if let Err(err) = &result {
                    warn!(%what, error = %err, "clipboard unavailable");
                }
                InternalEvent::Copied {
                    what,
                    result: result.map_err(|e| e.to_string()),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use paths::PathContext;

    #[test]
    fn save_then_list_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let io = LocalIo::new(DraftStore::new(PathContext::with_base_path(dir.path(), "schemacast")));

        let saved = io.perform(IoRequest::SaveDraft {
            topic: "orders".into(),
            schema_id: 4,
            payload: "{\"id\": 1}".into(),
            key: Some("k".into()),
            name: Some("one".into()),
        });
        let InternalEvent::DraftSaved(Ok(path)) = saved else {
            panic!("save failed");
        };

        let listed = io.perform(IoRequest::ListDrafts {
            topic: "orders".into(),
        });
        let InternalEvent::DraftsListed { result: Ok(entries), .. } = listed else {
            panic!("list failed");
        };
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].path, path);

        match io.perform(IoRequest::LoadDraft { path }) {
            InternalEvent::DraftLoaded(Ok(draft)) => {
                assert_eq!(draft.schema_id, 4);
                assert_eq!(draft.key.as_deref(), Some("k"));
                assert_eq!(draft.name, "one");
            }
            other => panic!("load failed: {other:?}"),
        }
    }

    #[test]
    fn only_the_editor_needs_the_terminal() {
        assert!(IoRequest::OpenEditor { text: String::new() }.needs_terminal());
        assert!(!IoRequest::ListDrafts { topic: "t".into() }.needs_terminal());
    }
}
