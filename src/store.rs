//! The digest store: in-memory state backed by key-value persistence.
//!
//! [`DigestStore`] loads both persisted values once, then runs every mutation
//! as a [`Command`]: apply it to the current [`DigestState`], swap in the new
//! state, and write a full snapshot of the key the command touched.
//!
//! # Failure Policy
//!
//! - A missing or unreadable value at startup becomes an empty list or empty
//!   secret. Startup never fails because of storage.
//! - A failed write is logged and otherwise ignored. The in-memory state stays
//!   authoritative for the rest of the session, so durability is best-effort.
//!
//! # Single Writer
//!
//! Snapshots replace the whole stored value. Two stores sharing one backend
//! (two processes on one data directory) silently overwrite each other on
//! their next write; there is no merge and no locking.

use crate::models::{DigestConfig, DigestDraft, DigestId};
use crate::persistence::{DIGESTS_KEY, KeyValueStore, PersistenceError, WEBHOOK_SECRET_KEY};
use crate::state::{Command, DigestState, Outcome, StoreError};
use chrono::Utc;
use itertools::Itertools;
use tracing::{debug, error, info, instrument, warn};

/// Issues `digest_<millis>` ids that are strictly increasing.
///
/// When two ids are requested within the same millisecond, or the clock
/// steps backwards, the next id is the previous value plus one.
#[derive(Debug, Default)]
pub struct IdGenerator {
    last: i64,
}

impl IdGenerator {
    /// How far ahead of the local clock a stored id may be and still count
    /// as a timestamp.
    const MAX_CLOCK_LEAD_MILLIS: i64 = 24 * 60 * 60 * 1000;

    /// Start above every timestamp-style id already in `existing`.
    ///
    /// Suffixes more than a day ahead of `now_millis` are not timestamps and
    /// are left out; [`DigestStore::create`] still skips them if they ever
    /// come up.
    pub fn seeded(existing: &[DigestConfig], now_millis: i64) -> Self {
        let ceiling = now_millis.saturating_add(Self::MAX_CLOCK_LEAD_MILLIS);
        let last = existing
            .iter()
            .filter_map(|d| d.id.timestamp_millis())
            .filter(|&millis| millis <= ceiling)
            .max()
            .unwrap_or(0);
        Self { last }
    }

    pub fn next_id(&mut self) -> DigestId {
        self.next_at(Utc::now().timestamp_millis())
    }

    fn next_at(&mut self, now_millis: i64) -> DigestId {
        let value = match self.last.checked_add(1) {
            Some(bumped) => now_millis.max(bumped),
            None => now_millis,
        };
        self.last = value;
        DigestId::new(format!("{}{}", DigestId::PREFIX, value))
    }
}

/// Result of [`DigestStore::delete`]. When `existed` is true the caller must
/// drop any selection pointing at `id`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Deletion {
    pub id: DigestId,
    pub existed: bool,
}

/// Owns the digest list and webhook secret for one process.
#[derive(Debug)]
pub struct DigestStore<K> {
    backend: K,
    state: DigestState,
    ids: IdGenerator,
}

impl<K: KeyValueStore> DigestStore<K> {
    /// Load persisted state from `backend`, falling back to empty values.
    #[instrument(level = "info", skip_all)]
    pub fn load(backend: K) -> Self {
        let digests = load_digests(&backend);
        let secret = load_secret(&backend);
        info!(
            digests = digests.len(),
            has_secret = !secret.is_empty(),
            "Loaded digest store"
        );
        let ids = IdGenerator::seeded(&digests, Utc::now().timestamp_millis());
        Self {
            backend,
            state: DigestState::new(digests, secret),
            ids,
        }
    }

    /// Digests in insertion order.
    pub fn list(&self) -> &[DigestConfig] {
        self.state.digests()
    }

    pub fn get(&self, id: &DigestId) -> Option<&DigestConfig> {
        self.state.get(id)
    }

    pub fn secret(&self) -> &str {
        self.state.secret()
    }

    /// Validate `draft`, store it under a fresh id at the end of the list.
    pub fn create(&mut self, draft: DigestDraft) -> Result<DigestConfig, StoreError> {
        let mut id = self.ids.next_id();
        while self.state.get(&id).is_some() {
            debug!(%id, "Generated id is taken; trying the next one");
            id = self.ids.next_id();
        }
        match self.execute(Command::Create { id, draft })? {
            Outcome::Created(config) => Ok(config),
            other => unreachable!("create produced {other:?}"),
        }
    }

    /// Replace every field of the digest at `id` with `draft`.
    pub fn update(&mut self, id: &DigestId, draft: DigestDraft) -> Result<DigestConfig, StoreError> {
        let command = Command::Update {
            id: id.clone(),
            draft,
        };
        match self.execute(command)? {
            Outcome::Updated(config) => Ok(config),
            other => unreachable!("update produced {other:?}"),
        }
    }

    /// Remove the digest at `id`. Deleting an absent id is not an error.
    pub fn delete(&mut self, id: &DigestId) -> Deletion {
        match self.execute(Command::Delete { id: id.clone() }) {
            Ok(Outcome::Deleted { id, existed }) => Deletion { id, existed },
            other => unreachable!("delete produced {other:?}"),
        }
    }

    /// Replace the webhook secret. An empty secret disables automation.
    pub fn save_secret(&mut self, secret: impl Into<String>) {
        let command = Command::SaveSecret {
            secret: secret.into(),
        };
        if let Err(e) = self.execute(command) {
            unreachable!("saving the secret cannot be refused: {e}");
        }
    }

    /// Apply one command, then persist the snapshot it touched.
    #[instrument(level = "debug", skip_all, fields(key = command.storage_key()))]
    pub fn execute(&mut self, command: Command) -> Result<Outcome, StoreError> {
        let key = command.storage_key();
        let (next, outcome) = match self.state.apply(command) {
            Ok(applied) => applied,
            Err(e) => {
                debug!(error = %e, "Command refused");
                return Err(e);
            }
        };
        self.state = next;

        if let Err(e) = self.persist(key) {
            error!(key, error = %e, "Failed to persist snapshot; keeping in-memory state");
        }
        Ok(outcome)
    }

    fn persist(&self, key: &'static str) -> Result<(), PersistenceError> {
        if key == WEBHOOK_SECRET_KEY {
            return self.backend.set(WEBHOOK_SECRET_KEY, self.state.secret());
        }
        let json = serde_json::to_string(self.state.digests()).map_err(|source| {
            PersistenceError::Serialize {
                key: key.to_string(),
                source,
            }
        })?;
        self.backend.set(DIGESTS_KEY, &json)
    }
}

fn load_digests<K: KeyValueStore>(backend: &K) -> Vec<DigestConfig> {
    let raw = match backend.get(DIGESTS_KEY) {
        Ok(Some(raw)) => raw,
        Ok(None) => return Vec::new(),
        Err(e) => {
            warn!(error = %e, "Could not read stored digests; starting empty");
            return Vec::new();
        }
    };

    let entries: Vec<serde_json::Value> = match serde_json::from_str(&raw) {
        Ok(entries) => entries,
        Err(e) => {
            warn!(error = %e, "Stored digests are not a JSON array; starting empty");
            return Vec::new();
        }
    };

    let total = entries.len();
    let digests: Vec<DigestConfig> = entries
        .into_iter()
        .enumerate()
        .filter_map(|(index, entry)| {
            let parsed = serde_json::from_value::<DigestConfig>(entry)
                .map_err(|e| e.to_string())
                .and_then(|c| c.revalidated().map_err(|e| e.to_string()));
            match parsed {
                Ok(config) => Some(config),
                Err(e) => {
                    warn!(index, error = %e, "Skipping invalid stored digest");
                    None
                }
            }
        })
        .unique_by(|d| d.id.clone())
        .collect();

    if digests.len() != total {
        warn!(kept = digests.len(), total, "Dropped unusable stored digests");
    }
    digests
}

fn load_secret<K: KeyValueStore>(backend: &K) -> String {
    match backend.get(WEBHOOK_SECRET_KEY) {
        Ok(secret) => secret.unwrap_or_default(),
        Err(e) => {
            warn!(error = %e, "Could not read webhook secret; starting without one");
            String::new()
        }
    }
}
