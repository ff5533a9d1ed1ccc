//! Preview generation state machine.
//!
//! ```text
//!            generate(digest)                 service answers
//!   Idle ─────────────────────▶ Loading ─────────────────────▶ Succeeded(html)
//!    ▲                            │  service fails / times out
//!    │ selection_changed          └───────────────────────────▶ Failed(message)
//!    └──────────────── any state ◀── generate(digest) restarts from Succeeded/Failed
//! ```
//!
//! # Request Tokens
//!
//! The summarization call is the only suspension point and it can take a
//! long time. Every `generate` and every `selection_changed` takes a new,
//! strictly increasing token; a finished call only updates the state if its
//! token is still the newest. An answer for a digest the user has already
//! moved away from is therefore dropped, and the last request wins rather
//! than the last answer to arrive.

use crate::api::{GenerationError, Summarizer};
use crate::models::DigestConfig;
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, instrument, warn};

/// Message shown when a preview is requested with nothing selected.
pub const NOTHING_SELECTED: &str = "Please select a digest to preview.";

/// What the preview pane shows.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum PreviewState {
    #[default]
    Idle,
    Loading,
    Succeeded(String),
    Failed(String),
}

impl PreviewState {
    pub fn is_loading(&self) -> bool {
        matches!(self, PreviewState::Loading)
    }

    pub fn html(&self) -> Option<&str> {
        match self {
            PreviewState::Succeeded(html) => Some(html),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            PreviewState::Failed(message) => Some(message),
            _ => None,
        }
    }
}

/// Why a `generate` call did not produce the displayed document.
#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum PreviewError {
    #[error("{}", NOTHING_SELECTED)]
    NothingSelected,

    #[error(transparent)]
    Generation(#[from] GenerationError),

    /// A newer request or a selection change happened while this call was
    /// in flight; its answer was discarded.
    #[error("Preview request was superseded")]
    Superseded,
}

/// Drives one preview pane.
pub struct PreviewOrchestrator<S> {
    summarizer: S,
    timeout: Option<Duration>,
    token: Mutex<u64>,
    state: watch::Sender<PreviewState>,
}

impl<S: Summarizer> PreviewOrchestrator<S> {
    pub fn new(summarizer: S) -> Self {
        let (state, _) = watch::channel(PreviewState::Idle);
        Self {
            summarizer,
            timeout: None,
            token: Mutex::new(0),
            state,
        }
    }

    /// Give up on a summarization call after `timeout`.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn state(&self) -> PreviewState {
        self.state.borrow().clone()
    }

    /// Observe every state change.
    pub fn subscribe(&self) -> watch::Receiver<PreviewState> {
        self.state.subscribe()
    }

    fn lock_token(&self) -> MutexGuard<'_, u64> {
        self.token.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Start a new cycle: take a fresh token and publish `state`.
    fn restart(&self, state: PreviewState) -> u64 {
        let mut token = self.lock_token();
        *token += 1;
        self.state.send_replace(state);
        *token
    }

    /// The selected digest changed (or was re-selected): clear any result
    /// and drop whatever is still in flight.
    pub fn selection_changed(&self) {
        let token = self.restart(PreviewState::Idle);
        debug!(token, "Preview reset");
    }

    /// Generate a preview of `digest`.
    ///
    /// With no digest the state becomes `Failed` immediately and no call is
    /// made. Otherwise the state is `Loading` until the service answers, then
    /// `Succeeded` or `Failed`, unless a newer request arrived in the
    /// meantime, in which case [`PreviewError::Superseded`] is returned and
    /// the state is left alone.
    #[instrument(level = "info", skip_all, fields(id = digest.map(|d| d.id.as_str())))]
    pub async fn generate(&self, digest: Option<&DigestConfig>) -> Result<String, PreviewError> {
        let Some(digest) = digest else {
            self.restart(PreviewState::Failed(NOTHING_SELECTED.to_string()));
            warn!("Preview requested with no digest selected");
            return Err(PreviewError::NothingSelected);
        };

        let ticket = self.restart(PreviewState::Loading);
        info!(ticket, "Generating preview");
        let outcome = self.call_summarizer(digest).await;
        self.finish(ticket, outcome)
    }

    async fn call_summarizer(&self, digest: &DigestConfig) -> Result<String, GenerationError> {
        let attempt = AssertUnwindSafe(self.summarizer.summarize(digest)).catch_unwind();
        let caught = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, attempt).await {
                Ok(caught) => caught,
                Err(_) => return Err(GenerationError::TimedOut(limit)),
            },
            None => attempt.await,
        };
        caught.unwrap_or_else(|panic| Err(GenerationError::Unexpected(panic_message(&*panic))))
    }

    fn finish(&self, ticket: u64, outcome: Result<String, GenerationError>) -> Result<String, PreviewError> {
        let token = self.lock_token();
        if *token != ticket {
            debug!(ticket, current = *token, "Discarding stale preview result");
            return Err(PreviewError::Superseded);
        }

        match outcome {
            Ok(html) => {
                info!(ticket, bytes = html.len(), "Preview ready");
                self.state.send_replace(PreviewState::Succeeded(html.clone()));
                Ok(html)
            }
            Err(e) => {
                warn!(ticket, error = %e, "Preview failed");
                self.state.send_replace(PreviewState::Failed(e.to_string()));
                Err(PreviewError::Generation(e))
            }
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DigestDraft, DigestId, Schedule};
    use std::collections::HashMap;
    use tokio::sync::Notify;
    use tokio::time::sleep;

    fn digest(name: &str) -> DigestConfig {
        DigestDraft {
            name: name.to_string(),
            topics: vec!["Technology".to_string(), "Science".to_string()],
            story_count: 3,
            schedule: Schedule::Daily,
        }
        .build(DigestId::from(format!("digest_{}", name.len())))
        .unwrap()
    }

    /// Answers with `result` after `delay`.
    struct DelayedSummarizer {
        delay: Duration,
        result: Result<String, String>,
    }

    impl DelayedSummarizer {
        fn ok(html: &str, delay_ms: u64) -> Self {
            Self {
                delay: Duration::from_millis(delay_ms),
                result: Ok(html.to_string()),
            }
        }

        fn err(message: &str, delay_ms: u64) -> Self {
            Self {
                delay: Duration::from_millis(delay_ms),
                result: Err(message.to_string()),
            }
        }
    }

    impl Summarizer for DelayedSummarizer {
        async fn summarize(&self, _digest: &DigestConfig) -> Result<String, GenerationError> {
            sleep(self.delay).await;
            self.result.clone().map_err(GenerationError::Service)
        }
    }

    /// Answers for a digest (by name) once its gate is opened.
    #[derive(Default)]
    struct GatedSummarizer {
        gates: HashMap<String, (Notify, String)>,
    }

    impl GatedSummarizer {
        fn with(mut self, name: &str, html: &str) -> Self {
            self.gates
                .insert(name.to_string(), (Notify::new(), html.to_string()));
            self
        }

        fn open(&self, name: &str) {
            self.gates[name].0.notify_one();
        }
    }

    impl Summarizer for GatedSummarizer {
        async fn summarize(&self, digest: &DigestConfig) -> Result<String, GenerationError> {
            let (gate, html) = &self.gates[&digest.name];
            gate.notified().await;
            Ok(html.clone())
        }
    }

    struct PanickingSummarizer;

    impl Summarizer for PanickingSummarizer {
        async fn summarize(&self, _digest: &DigestConfig) -> Result<String, GenerationError> {
            panic!("boom");
        }
    }

    #[tokio::test]
    async fn test_generate_success_passes_through_loading() {
        let orchestrator = PreviewOrchestrator::new(DelayedSummarizer::ok("<html>ok</html>", 100));
        let config = digest("Tech Briefing");
        assert_eq!(orchestrator.state(), PreviewState::Idle);

        let (result, while_pending) = tokio::join!(orchestrator.generate(Some(&config)), async {
            sleep(Duration::from_millis(20)).await;
            orchestrator.state()
        });

        assert_eq!(while_pending, PreviewState::Loading);
        assert_eq!(result.unwrap(), "<html>ok</html>");
        assert_eq!(
            orchestrator.state(),
            PreviewState::Succeeded("<html>ok</html>".to_string())
        );
    }

    #[tokio::test]
    async fn test_generate_failure_passes_through_loading() {
        let orchestrator = PreviewOrchestrator::new(DelayedSummarizer::err("rate limited", 100));
        let config = digest("Tech Briefing");

        let (result, while_pending) = tokio::join!(orchestrator.generate(Some(&config)), async {
            sleep(Duration::from_millis(20)).await;
            orchestrator.state()
        });

        assert_eq!(while_pending, PreviewState::Loading);
        assert_eq!(
            result.unwrap_err(),
            PreviewError::Generation(GenerationError::Service("rate limited".to_string()))
        );
        assert_eq!(orchestrator.state(), PreviewState::Failed("rate limited".to_string()));
        assert_eq!(orchestrator.state().error(), Some("rate limited"));
    }

    #[tokio::test]
    async fn test_generate_without_selection_never_loads() {
        let orchestrator = PreviewOrchestrator::new(DelayedSummarizer::ok("<html>ok</html>", 0));
        let mut rx = orchestrator.subscribe();

        let err = orchestrator.generate(None).await.unwrap_err();
        assert_eq!(err, PreviewError::NothingSelected);
        assert_eq!(err.to_string(), NOTHING_SELECTED);
        assert!(rx.has_changed().unwrap());
        assert_eq!(
            *rx.borrow_and_update(),
            PreviewState::Failed(NOTHING_SELECTED.to_string())
        );
    }

    #[tokio::test]
    async fn test_selection_change_clears_result() {
        let orchestrator = PreviewOrchestrator::new(DelayedSummarizer::ok("<html>ok</html>", 0));
        let config = digest("Tech Briefing");
        orchestrator.generate(Some(&config)).await.unwrap();
        assert!(orchestrator.state().html().is_some());

        orchestrator.selection_changed();
        assert_eq!(orchestrator.state(), PreviewState::Idle);
    }

    #[tokio::test]
    async fn test_regenerate_after_failure_starts_fresh_cycle() {
        let stub = DelayedSummarizer::err("rate limited", 50);
        let orchestrator = PreviewOrchestrator::new(&stub);
        let config = digest("Tech Briefing");
        assert!(orchestrator.generate(Some(&config)).await.is_err());
        assert!(orchestrator.state().error().is_some());

        let (_, while_pending) = tokio::join!(orchestrator.generate(Some(&config)), async {
            sleep(Duration::from_millis(10)).await;
            orchestrator.state()
        });
        assert_eq!(while_pending, PreviewState::Loading);
    }

    // Stale answers: the request that is current when an answer arrives
    // decides what is shown, regardless of arrival order.
    #[tokio::test]
    async fn test_stale_resolution_after_selection_change_is_discarded() {
        let stub = GatedSummarizer::default().with("Alpha", "<html>alpha</html>");
        let orchestrator = PreviewOrchestrator::new(&stub);
        let alpha = digest("Alpha");

        let (result, ()) = tokio::join!(orchestrator.generate(Some(&alpha)), async {
            sleep(Duration::from_millis(20)).await;
            assert!(orchestrator.state().is_loading());
            orchestrator.selection_changed();
            stub.open("Alpha");
        });

        assert_eq!(result.unwrap_err(), PreviewError::Superseded);
        assert_eq!(orchestrator.state(), PreviewState::Idle);
    }

    #[tokio::test]
    async fn test_last_request_wins_over_last_resolution() {
        let stub = GatedSummarizer::default()
            .with("Alpha", "<html>alpha</html>")
            .with("Beta", "<html>beta</html>");
        let orchestrator = PreviewOrchestrator::new(&stub);
        let alpha = digest("Alpha");
        let beta = digest("Beta");

        let (first, second, ()) = tokio::join!(
            orchestrator.generate(Some(&alpha)),
            async {
                sleep(Duration::from_millis(20)).await;
                orchestrator.generate(Some(&beta)).await
            },
            async {
                sleep(Duration::from_millis(60)).await;
                stub.open("Beta");
                sleep(Duration::from_millis(40)).await;
                stub.open("Alpha");
            }
        );

        assert_eq!(second.unwrap(), "<html>beta</html>");
        assert_eq!(first.unwrap_err(), PreviewError::Superseded);
        assert_eq!(
            orchestrator.state(),
            PreviewState::Succeeded("<html>beta</html>".to_string())
        );
    }

    #[tokio::test]
    async fn test_timeout_becomes_failure() {
        let orchestrator = PreviewOrchestrator::new(DelayedSummarizer::ok("<html>late</html>", 500))
            .with_timeout(Duration::from_millis(20));
        let config = digest("Tech Briefing");

        let err = orchestrator.generate(Some(&config)).await.unwrap_err();
        assert_eq!(
            err,
            PreviewError::Generation(GenerationError::TimedOut(Duration::from_millis(20)))
        );
        assert_eq!(
            orchestrator.state().error(),
            Some("Digest generation timed out after 20ms.")
        );
    }

    #[tokio::test]
    async fn test_panic_in_summarizer_becomes_failure() {
        let orchestrator = PreviewOrchestrator::new(PanickingSummarizer);
        let config = digest("Tech Briefing");

        let err = orchestrator.generate(Some(&config)).await.unwrap_err();
        assert_eq!(
            err,
            PreviewError::Generation(GenerationError::Unexpected("boom".to_string()))
        );
        assert_eq!(
            orchestrator.state(),
            PreviewState::Failed("Digest generation failed unexpectedly: boom".to_string())
        );
    }
}
