//! Application state and the commands that change it.
//!
//! [`DigestState`] is a plain value: the ordered digest list plus the webhook
//! secret. [`DigestState::apply`] takes one [`Command`] and returns the next
//! state without touching storage, so every mutation can be tested on its
//! own. Persisting the result is the caller's job
//! (see [`crate::store::DigestStore`]).

use crate::models::{DigestConfig, DigestDraft, DigestId, ValidationError};
use crate::persistence::{DIGESTS_KEY, WEBHOOK_SECRET_KEY};
use thiserror::Error;

/// Why a command was refused. A refused command never changes state.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("No digest with id '{0}'")]
    NotFound(DigestId),

    #[error("A digest with id '{0}' already exists")]
    DuplicateId(DigestId),
}

/// One mutation of the application state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Append a new digest built from `draft` under the fresh `id`.
    Create { id: DigestId, draft: DigestDraft },
    /// Replace every field of the digest at `id`, keeping its position.
    Update { id: DigestId, draft: DigestDraft },
    /// Remove the digest at `id` if present.
    Delete { id: DigestId },
    /// Replace the webhook secret. Empty disables automation.
    SaveSecret { secret: String },
}

impl Command {
    /// The storage key whose snapshot must be rewritten after this command.
    pub fn storage_key(&self) -> &'static str {
        match self {
            Command::SaveSecret { .. } => WEBHOOK_SECRET_KEY,
            _ => DIGESTS_KEY,
        }
    }
}

/// What a successfully applied command did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Created(DigestConfig),
    Updated(DigestConfig),
    /// `existed` is false when the id was already absent.
    Deleted { id: DigestId, existed: bool },
    SecretSaved,
}

/// Digest list and webhook secret.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DigestState {
    digests: Vec<DigestConfig>,
    secret: String,
}

impl DigestState {
    /// Build a state from already validated parts.
    pub fn new(digests: Vec<DigestConfig>, secret: String) -> Self {
        Self { digests, secret }
    }

    pub fn digests(&self) -> &[DigestConfig] {
        &self.digests
    }

    pub fn secret(&self) -> &str {
        &self.secret
    }

    pub fn get(&self, id: &DigestId) -> Option<&DigestConfig> {
        self.digests.iter().find(|d| &d.id == id)
    }

    fn position(&self, id: &DigestId) -> Option<usize> {
        self.digests.iter().position(|d| &d.id == id)
    }

    /// Apply `command`, returning the next state and what happened.
    pub fn apply(&self, command: Command) -> Result<(DigestState, Outcome), StoreError> {
        match command {
            Command::Create { id, draft } => {
                if self.position(&id).is_some() {
                    return Err(StoreError::DuplicateId(id));
                }
                let config = draft.build(id)?;
                let mut next = self.clone();
                next.digests.push(config.clone());
                Ok((next, Outcome::Created(config)))
            }
            Command::Update { id, draft } => {
                let index = self
                    .position(&id)
                    .ok_or_else(|| StoreError::NotFound(id.clone()))?;
                let config = draft.build(id)?;
                let mut next = self.clone();
                next.digests[index] = config.clone();
                Ok((next, Outcome::Updated(config)))
            }
            Command::Delete { id } => {
                let mut next = self.clone();
                next.digests.retain(|d| d.id != id);
                let existed = next.digests.len() != self.digests.len();
                Ok((next, Outcome::Deleted { id, existed }))
            }
            Command::SaveSecret { secret } => {
                let next = DigestState {
                    digests: self.digests.clone(),
                    secret,
                };
                Ok((next, Outcome::SecretSaved))
            }
        }
    }
}
