//! Data models for saved digest configurations.
//!
//! This module defines the entities shared by every other part of the
//! application:
//! - [`DigestConfig`]: A validated, stored digest configuration
//! - [`DigestDraft`]: The unvalidated form a user edits before saving
//! - [`DigestId`], [`StoryCount`], [`Schedule`]: Field types with their own rules
//! - [`ValidationError`]: Why a draft was refused
//!
//! Serialized field names use camelCase (`storyCount`) because the persisted
//! `newsDigests` value and the automation URL payload are read by tools that
//! expect that JSON shape.

use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Smallest number of stories per topic a digest may request.
pub const MIN_STORY_COUNT: u8 = 1;
/// Largest number of stories per topic a digest may request.
pub const MAX_STORY_COUNT: u8 = 10;
/// Story count pre-filled for a new digest.
pub const DEFAULT_STORY_COUNT: u8 = 5;
/// Name pre-filled for a new digest.
pub const DEFAULT_DIGEST_NAME: &str = "Untitled Digest";

/// Topics offered as one-click suggestions.
pub const DEFAULT_TOPICS: [&str; 10] = [
    "United Kingdom",
    "World",
    "Local",
    "Business",
    "Technology",
    "Entertainment",
    "Sports",
    "Science",
    "Health",
    "Music",
];

/// Reasons a draft cannot be saved.
///
/// Each variant maps to one form field via [`ValidationError::field`], so a
/// caller can show the message next to the offending input.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Digest name cannot be empty.")]
    EmptyName,

    #[error("Stories per topic must be between {min} and {max}, got {0}", min = MIN_STORY_COUNT, max = MAX_STORY_COUNT)]
    StoryCountOutOfRange(u32),

    #[error("Unknown schedule '{0}'. Use 'daily' or a day of the week")]
    UnknownSchedule(String),
}

impl ValidationError {
    /// The serialized name of the field this error belongs to.
    pub fn field(&self) -> &'static str {
        match self {
            ValidationError::EmptyName => "name",
            ValidationError::StoryCountOutOfRange(_) => "storyCount",
            ValidationError::UnknownSchedule(_) => "schedule",
        }
    }
}

/// Opaque identifier of a stored digest.
///
/// Generated ids look like `digest_1746540000000` (see
/// [`crate::store::IdGenerator`]), but any string loaded from storage is
/// accepted as-is.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DigestId(String);

impl DigestId {
    pub const PREFIX: &'static str = "digest_";

    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The millisecond timestamp embedded in a generated id, if any.
    pub fn timestamp_millis(&self) -> Option<i64> {
        self.0.strip_prefix(Self::PREFIX)?.parse().ok()
    }
}

impl fmt::Display for DigestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DigestId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for DigestId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Number of stories per topic, always within
/// [`MIN_STORY_COUNT`]..=[`MAX_STORY_COUNT`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct StoryCount(u8);

impl StoryCount {
    pub fn new(count: u32) -> Result<Self, ValidationError> {
        match u8::try_from(count) {
            Ok(n) if (MIN_STORY_COUNT..=MAX_STORY_COUNT).contains(&n) => Ok(Self(n)),
            _ => Err(ValidationError::StoryCountOutOfRange(count)),
        }
    }

    pub fn get(self) -> u8 {
        self.0
    }
}

impl Default for StoryCount {
    fn default() -> Self {
        Self(DEFAULT_STORY_COUNT)
    }
}

impl TryFrom<u8> for StoryCount {
    type Error = ValidationError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::new(u32::from(value))
    }
}

impl From<StoryCount> for u8 {
    fn from(count: StoryCount) -> Self {
        count.0
    }
}

impl fmt::Display for StoryCount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// How often an automated digest is meant to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Schedule {
    #[default]
    Daily,
    Monday,
    Tuesday,
    Wednesday,
    Thursday,
    Friday,
    Saturday,
    Sunday,
}

impl Schedule {
    pub const ALL: [Schedule; 8] = [
        Schedule::Daily,
        Schedule::Monday,
        Schedule::Tuesday,
        Schedule::Wednesday,
        Schedule::Thursday,
        Schedule::Friday,
        Schedule::Saturday,
        Schedule::Sunday,
    ];

    /// The serialized value, e.g. `"monday"`.
    pub fn as_str(self) -> &'static str {
        match self {
            Schedule::Daily => "daily",
            Schedule::Monday => "monday",
            Schedule::Tuesday => "tuesday",
            Schedule::Wednesday => "wednesday",
            Schedule::Thursday => "thursday",
            Schedule::Friday => "friday",
            Schedule::Saturday => "saturday",
            Schedule::Sunday => "sunday",
        }
    }

    /// Human readable label, e.g. `"Mondays"`.
    pub fn label(self) -> &'static str {
        match self {
            Schedule::Daily => "Daily",
            Schedule::Monday => "Mondays",
            Schedule::Tuesday => "Tuesdays",
            Schedule::Wednesday => "Wednesdays",
            Schedule::Thursday => "Thursdays",
            Schedule::Friday => "Fridays",
            Schedule::Saturday => "Saturdays",
            Schedule::Sunday => "Sundays",
        }
    }
}

impl fmt::Display for Schedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Schedule {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        Schedule::ALL
            .into_iter()
            .find(|schedule| schedule.as_str() == wanted)
            .ok_or_else(|| ValidationError::UnknownSchedule(s.to_string()))
    }
}

/// A stored digest configuration.
///
/// Values held by [`crate::store::DigestStore`] always satisfy the rules
/// enforced by [`DigestDraft::build`]: trimmed non-empty name, unique trimmed
/// topics, story count in range, known schedule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DigestConfig {
    pub id: DigestId,
    pub name: String,
    pub topics: Vec<String>,
    pub story_count: StoryCount,
    pub schedule: Schedule,
}

impl DigestConfig {
    /// Re-run draft validation on a config that came from outside the store
    /// (persisted data, a decoded automation URL).
    pub fn revalidated(self) -> Result<DigestConfig, ValidationError> {
        let id = self.id.clone();
        DigestDraft::from(self).build(id)
    }
}

/// The editable, unvalidated form of a digest.
///
/// Saving a draft always replaces every field of the target digest; there is
/// no partial update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DigestDraft {
    pub name: String,
    pub topics: Vec<String>,
    pub story_count: u32,
    pub schedule: Schedule,
}

impl Default for DigestDraft {
    fn default() -> Self {
        Self {
            name: DEFAULT_DIGEST_NAME.to_string(),
            topics: Vec::new(),
            story_count: u32::from(DEFAULT_STORY_COUNT),
            schedule: Schedule::Daily,
        }
    }
}

impl DigestDraft {
    /// Validate the draft and turn it into a config carrying `id`.
    pub fn build(&self, id: DigestId) -> Result<DigestConfig, ValidationError> {
        let name = self.name.trim();
        if name.is_empty() {
            return Err(ValidationError::EmptyName);
        }
        let story_count = StoryCount::new(self.story_count)?;

        Ok(DigestConfig {
            id,
            name: name.to_string(),
            topics: normalize_topics(&self.topics),
            story_count,
            schedule: self.schedule,
        })
    }
}

impl From<DigestConfig> for DigestDraft {
    fn from(config: DigestConfig) -> Self {
        Self {
            name: config.name,
            topics: config.topics,
            story_count: u32::from(config.story_count.get()),
            schedule: config.schedule,
        }
    }
}

impl From<&DigestConfig> for DigestDraft {
    fn from(config: &DigestConfig) -> Self {
        Self::from(config.clone())
    }
}

/// Trim topics, drop empty ones and keep the first of any exact duplicates.
pub fn normalize_topics<S: AsRef<str>>(topics: &[S]) -> Vec<String> {
    topics
        .iter()
        .map(|t| t.as_ref().trim())
        .filter(|t| !t.is_empty())
        .unique()
        .map(str::to_string)
        .collect()
}

/// Default topics that are not already part of `current`.
pub fn suggested_topics(current: &[String]) -> Vec<&'static str> {
    DEFAULT_TOPICS
        .into_iter()
        .filter(|t| !current.iter().any(|c| c == t))
        .collect()
}
