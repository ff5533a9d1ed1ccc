//! # Awful News Digest
//!
//! Keeps a list of named news digest configurations (topics, stories per
//! topic, schedule), generates AI-written HTML previews of them, and exports
//! each one as a self-contained webhook URL that an external scheduler can
//! call to have the digest generated and delivered unattended.
//!
//! ## Usage
//!
//! ```sh
//! awful_news_digest create --name "Tech Briefing" -t Technology -t Science --stories 3
//! awful_news_digest list
//! awful_news_digest secret s3cr3t
//! awful_news_digest automate digest_1746540000000
//! awful_news_digest preview digest_1746540000000 -o preview.html
//! ```
//!
//! ## Architecture
//!
//! 1. **Models**: digest configurations and their validation rules
//! 2. **Store**: commands applied to an in-memory state, each followed by a
//!    full snapshot written to key-value storage
//! 3. **Webhook codec**: digest + secret to automation URL and back
//! 4. **Preview**: state machine around the slow, fallible summarization call

use clap::Parser;
use std::error::Error;
use std::time::Duration;
use tracing::{debug, error, info, instrument};
use tracing_subscriber::{EnvFilter, fmt as tfmt};
use url::Url;

mod api;
mod app;
mod cli;
mod models;
mod notify;
mod persistence;
mod preview;
mod settings;
mod state;
mod store;
mod utils;
mod webhook;

use api::{HttpSummarizer, LlmSummarizer, SummarizerBackend};
use app::DigestApp;
use cli::{Cli, Command};
use models::{DigestId, suggested_topics};
use notify::LogNotifier;
use persistence::FileKeyValueStore;
use preview::PreviewOrchestrator;
use settings::{Settings, SummarizerSettings};
use store::DigestStore;
use utils::ensure_writable_dir;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    // --- Tracing init ---
    // Logs go to stderr; stdout carries command output (URLs, HTML).
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    let start_time = std::time::Instant::now();
    let args = Cli::parse();
    debug!(?args.data_dir, ?args.settings, "Parsed CLI arguments");

    let settings = match &args.settings {
        Some(path) => Settings::load(path).await?,
        None => Settings::default(),
    };

    let data_dir = args.data_dir.clone().unwrap_or_else(|| settings.data_dir.clone());
    let data_dir_str = data_dir.to_str().ok_or("Not a valid data directory")?;
    if let Err(e) = ensure_writable_dir(data_dir_str).await {
        error!(
            path = %data_dir_str,
            error = %e,
            "Data directory is not writable (fix perms or choose a different path)"
        );
        return Err(e);
    }

    let result = run(args.command, &settings, FileKeyValueStore::new(&data_dir)).await;

    let elapsed = start_time.elapsed();
    info!(?elapsed, ok = result.is_ok(), "Execution complete");
    result
}

#[instrument(level = "debug", skip_all)]
async fn run(command: Command, settings: &Settings, backend: FileKeyValueStore) -> Result<(), Box<dyn Error>> {
    let (origin, summarizer, timeout) = match &command {
        Command::Automate { origin, .. } => {
            (origin.clone().unwrap_or_else(|| settings.origin.clone()), None, None)
        }
        Command::Preview { timeout, .. } => {
            let summarizer = build_summarizer(&settings.summarizer).await?;
            let timeout = timeout.or(settings.timeout_secs).map(Duration::from_secs);
            (settings.origin.clone(), Some(summarizer), timeout)
        }
        _ => (settings.origin.clone(), None, None),
    };

    let mut orchestrator = PreviewOrchestrator::new(summarizer);
    if let Some(limit) = timeout {
        orchestrator = orchestrator.with_timeout(limit);
    }
    let mut app = DigestApp::new(DigestStore::load(backend), orchestrator, LogNotifier, origin);

    match command {
        Command::List => {
            if app.digests().is_empty() {
                println!("No digests saved yet.");
            }
            for digest in app.digests() {
                println!(
                    "{}\t{}\t{}\t{} per topic\t{}",
                    digest.id,
                    digest.name,
                    digest.schedule.label(),
                    digest.story_count,
                    digest.topics.join(", ")
                );
            }
        }
        Command::Topics => {
            for topic in suggested_topics(&[]) {
                println!("{topic}");
            }
        }
        Command::Create(draft) => {
            let saved = app.save(None, draft.to_draft()?)?;
            println!("{}", saved.id);
        }
        Command::Update { id, draft } => {
            let saved = app.save(Some(&DigestId::from(id)), draft.to_draft()?)?;
            println!("{}", saved.id);
        }
        Command::Delete { id } => {
            let deletion = app.delete(&DigestId::from(id));
            if !deletion.existed {
                info!(id = %deletion.id, "Nothing to delete");
            }
        }
        Command::Secret { value } => {
            app.save_secret(value);
        }
        Command::Automate { id, .. } => match app.automation_url(&DigestId::from(id)) {
            Ok(url) => println!("{url}"),
            // The explanation replaces the URL; it is not a failure of the command.
            Err(e) => println!("{}", e.user_message()),
        },
        Command::Preview { id, out, .. } => {
            let id = DigestId::from(id);
            if !app.select(&id) {
                return Err(format!("No digest with id '{id}'").into());
            }
            let html = app.generate_preview().await?;
            match out {
                Some(path) => {
                    tokio::fs::write(&path, &html).await?;
                    info!(path = %path.display(), bytes = html.len(), "Wrote preview");
                }
                None => println!("{html}"),
            }
        }
    }
    Ok(())
}

async fn build_summarizer(settings: &SummarizerSettings) -> Result<SummarizerBackend, Box<dyn Error>> {
    match settings {
        SummarizerSettings::Llm {
            template,
            config_path,
        } => {
            let llm = LlmSummarizer::load(template, config_path.as_deref()).await?;
            Ok(SummarizerBackend::Llm(llm))
        }
        SummarizerSettings::Http { endpoint } => {
            let endpoint = Url::parse(endpoint)?;
            info!(%endpoint, "Using HTTP summarization service");
            Ok(SummarizerBackend::Http(HttpSummarizer::new(endpoint)))
        }
    }
}
