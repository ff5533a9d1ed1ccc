//! Command-line interface definitions for Awful News Digest.
//!
//! This module defines the CLI arguments and subcommands using the `clap`
//! crate. Global options can also be provided via environment variables.

use crate::models::{DEFAULT_DIGEST_NAME, DEFAULT_STORY_COUNT, DigestDraft, ValidationError};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Command-line arguments for the Awful News Digest application.
///
/// # Examples
///
/// ```sh
/// # Save a digest and print its automation URL
/// awful_news_digest create --name "Tech Briefing" -t Technology -t Science --stories 3
/// awful_news_digest secret s3cr3t
/// awful_news_digest automate digest_1746540000000
///
/// # Generate a preview with a settings file
/// awful_news_digest --settings ./digest.yaml preview digest_1746540000000 -o preview.html
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Directory holding saved digests and the webhook secret
    #[arg(short, long, env = "DIGEST_DATA_DIR", global = true)]
    pub data_dir: Option<PathBuf>,

    /// Optional path to a YAML settings file
    #[arg(short, long, env = "DIGEST_SETTINGS", global = true)]
    pub settings: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List saved digests
    List,

    /// Print the suggested default topics
    Topics,

    /// Create a new digest
    Create(DraftArgs),

    /// Replace every field of an existing digest
    Update {
        /// Id of the digest to replace
        id: String,

        #[command(flatten)]
        draft: DraftArgs,
    },

    /// Delete a digest
    Delete {
        /// Id of the digest to delete
        id: String,
    },

    /// Save the webhook secret (an empty value disables automation)
    Secret {
        #[arg(allow_hyphen_values = true)]
        value: String,
    },

    /// Print the automation URL for a digest
    Automate {
        /// Id of the digest to automate
        id: String,

        /// Origin the URL points at (overrides the settings file)
        #[arg(long, env = "DIGEST_ORIGIN")]
        origin: Option<String>,
    },

    /// Generate an HTML preview of a digest
    Preview {
        /// Id of the digest to preview
        id: String,

        /// Write the HTML here instead of stdout
        #[arg(short, long)]
        out: Option<PathBuf>,

        /// Give up after this many seconds (overrides the settings file)
        #[arg(long)]
        timeout: Option<u64>,
    },
}

/// Every field of a digest. Saving always replaces all of them.
#[derive(Args, Debug, Clone)]
pub struct DraftArgs {
    /// Digest name
    #[arg(short, long, default_value = DEFAULT_DIGEST_NAME)]
    pub name: String,

    /// Topic to cover (repeatable)
    #[arg(short, long = "topic")]
    pub topics: Vec<String>,

    /// Stories per topic (1-10)
    #[arg(long, default_value_t = DEFAULT_STORY_COUNT as u32)]
    pub stories: u32,

    /// daily, monday, tuesday, ... sunday
    #[arg(long, default_value = "daily")]
    pub schedule: String,
}

impl DraftArgs {
    pub fn to_draft(&self) -> Result<DigestDraft, ValidationError> {
        Ok(DigestDraft {
            name: self.name.clone(),
            topics: self.topics.clone(),
            story_count: self.stories,
            schedule: self.schedule.parse()?,
        })
    }
}
