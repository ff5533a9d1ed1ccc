//! Application shell tying the store, the preview pane and notices together.
//!
//! [`DigestApp`] owns the current selection and reacts to user actions the
//! way the interactive front end does: saving selects the saved digest,
//! deleting the selected digest clears the selection, every selection change
//! resets the preview, and outcomes are reported through a [`Notifier`].

use crate::api::Summarizer;
use crate::models::{DigestConfig, DigestDraft, DigestId};
use crate::notify::{Notice, Notifier};
use crate::persistence::KeyValueStore;
use crate::preview::{PreviewError, PreviewOrchestrator, PreviewState};
use crate::state::StoreError;
use crate::store::{Deletion, DigestStore};
use crate::webhook::{CodecError, encode_automation_url};
use tracing::{info, instrument, warn};
use url::Url;

pub struct DigestApp<K, S, N> {
    store: DigestStore<K>,
    preview: PreviewOrchestrator<S>,
    notifier: N,
    origin: String,
    selected: Option<DigestId>,
}

impl<K, S, N> DigestApp<K, S, N>
where
    K: KeyValueStore,
    S: Summarizer,
    N: Notifier,
{
    pub fn new(
        store: DigestStore<K>,
        preview: PreviewOrchestrator<S>,
        notifier: N,
        origin: impl Into<String>,
    ) -> Self {
        Self {
            store,
            preview,
            notifier,
            origin: origin.into(),
            selected: None,
        }
    }

    pub fn digests(&self) -> &[DigestConfig] {
        self.store.list()
    }

    pub fn selected_id(&self) -> Option<&DigestId> {
        self.selected.as_ref()
    }

    /// The selected digest, if it still exists.
    pub fn selected(&self) -> Option<&DigestConfig> {
        self.selected.as_ref().and_then(|id| self.store.get(id))
    }

    pub fn preview_state(&self) -> PreviewState {
        self.preview.state()
    }

    /// Select a digest. Re-selecting the current one still clears the preview.
    pub fn select(&mut self, id: &DigestId) -> bool {
        self.preview.selection_changed();
        if self.store.get(id).is_none() {
            warn!(%id, "Selected an unknown digest");
            self.selected = None;
            return false;
        }
        self.selected = Some(id.clone());
        true
    }

    /// Create a digest (`existing` is `None`) or replace the one at `existing`.
    /// The saved digest becomes the selection.
    #[instrument(level = "info", skip(self, draft))]
    pub fn save(&mut self, existing: Option<&DigestId>, draft: DigestDraft) -> Result<DigestConfig, StoreError> {
        let (saved, message) = match existing {
            Some(id) => (self.store.update(id, draft)?, "Digest updated successfully!"),
            None => (self.store.create(draft)?, "New digest created!"),
        };
        info!(id = %saved.id, name = %saved.name, "Saved digest");

        self.selected = Some(saved.id.clone());
        self.preview.selection_changed();
        self.notifier.notify(Notice::success(message));
        Ok(saved)
    }

    #[instrument(level = "info", skip(self))]
    pub fn delete(&mut self, id: &DigestId) -> Deletion {
        let deletion = self.store.delete(id);
        if self.selected.as_ref() == Some(id) {
            self.selected = None;
            self.preview.selection_changed();
        }
        if deletion.existed {
            self.notifier.notify(Notice::success("Digest deleted successfully."));
        }
        deletion
    }

    pub fn save_secret(&mut self, secret: impl Into<String>) {
        self.store.save_secret(secret);
        self.notifier.notify(Notice::success("Webhook secret saved!"));
    }

    /// Automation URL for the digest at `id`, or the reason there is none.
    pub fn automation_url(&self, id: &DigestId) -> Result<Url, CodecError> {
        encode_automation_url(&self.origin, self.store.get(id), self.store.secret())
    }

    /// Generate a preview of the selected digest.
    pub async fn generate_preview(&self) -> Result<String, PreviewError> {
        let result = self.preview.generate(self.selected()).await;
        match &result {
            Err(PreviewError::Superseded) | Ok(_) => {}
            Err(e) => self.notifier.notify(Notice::error(e.to_string())),
        }
        result
    }
}
