//! Analysis session lifecycle.
//! Owns the debounce, the streaming ingest, span deduplication, and the
//! sequential highlight queue. All mutable session state lives in one
//! context object with a reset boundary triggered on every edit.

use std::collections::{HashSet, VecDeque};
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::matching::{self, UnitMatch};
use crate::overlay::OverlayLayer;
use crate::surface::EditorSurface;
use crate::{Config, TaggedSpan};

/// Where one edit session currently sits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Pending,
    Streaming,
}

/// What happened to one queued span.
#[derive(Debug, Clone)]
pub struct HighlightOutcome {
    pub span: TaggedSpan,
    pub matched: Option<UnitMatch>,
    pub decorated: bool,
}

/// One analysis session for one editor view.
///
/// An edit invalidates everything: pending debounce, decorations, dedup
/// state, the cumulative buffer, and the fix action. An in-flight network
/// response is *not* cancelled; chunks that arrive after a reset are
/// processed against the cleared dedup set. Callers that want to suppress
/// that race entirely can compare `epoch()` before applying a batch.
pub struct Session {
    config: Config,
    state: SessionState,
    processed: HashSet<String>,
    buffer: String,
    queue: VecDeque<TaggedSpan>,
    drained: usize,
    epoch: u64,
    debounce: Option<JoinHandle<()>>,
    pub fix_available: bool,
    pub legend_visible: bool,
}

impl Session {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            state: SessionState::Idle,
            processed: HashSet::new(),
            buffer: String::new(),
            queue: VecDeque::new(),
            drained: 0,
            epoch: 0,
            debounce: None,
            fix_available: false,
            legend_visible: false,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Bumped on every edit; a batch tagged with an older epoch is stale.
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    /// The cumulative tagged response received so far. Kept after the
    /// stream ends: it is the source for the fixer hand-off.
    pub fn tagged_response(&self) -> &str {
        &self.buffer
    }

    /// The reset boundary. Invalidates all in-flight and completed
    /// analysis: pending debounce, decorations, dedup set, buffer, queue,
    /// and the fix action.
    pub fn note_edit(&mut self, overlay: &mut OverlayLayer) {
        if let Some(handle) = self.debounce.take() {
            handle.abort();
        }
        overlay.clear();
        self.processed.clear();
        self.buffer.clear();
        self.queue.clear();
        self.drained = 0;
        self.fix_available = false;
        self.epoch += 1;
        self.state = SessionState::Idle;
    }

    /// Arms the debounce, cancelling any prior pending timer. The receiver
    /// resolves with the session epoch when the timer fires; it errors if
    /// a newer edit aborted the timer first.
    pub fn arm_debounce(&mut self) -> oneshot::Receiver<u64> {
        if let Some(handle) = self.debounce.take() {
            handle.abort();
        }
        self.state = SessionState::Pending;
        let (tx, rx) = oneshot::channel();
        let delay = Duration::from_millis(self.config.timings.debounce_ms);
        let epoch = self.epoch;
        self.debounce = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(epoch);
        }));
        rx
    }

    pub fn begin_stream(&mut self) {
        self.state = SessionState::Streaming;
    }

    /// Folds one streamed chunk into the cumulative buffer, re-extracts
    /// over the whole buffer (tags may straddle chunk boundaries), drops
    /// spans already processed this session, and queues the rest. Returns
    /// the genuinely new spans in arrival order.
    pub fn ingest_chunk(&mut self, chunk: &str) -> Vec<TaggedSpan> {
        self.buffer.push_str(chunk);
        let mut fresh = Vec::new();
        for span in crate::extract::extract(&self.buffer) {
            if self.processed.insert(span.dedup_key()) {
                self.queue.push_back(span.clone());
                fresh.push(span);
            }
        }
        fresh
    }

    pub fn finish_stream(&mut self) {
        self.state = SessionState::Idle;
    }

    /// Processes the next queued span: match, decorate, animate, then wait
    /// the fixed inter-item delay. Returns `None` once the queue is empty;
    /// at that point, if the stream has ended and at least one item was
    /// drained, the fix action becomes available.
    pub async fn drain_next(
        &mut self,
        surface: &EditorSurface,
        overlay: &mut OverlayLayer,
    ) -> Option<HighlightOutcome> {
        let Some(span) = self.queue.pop_front() else {
            if self.state == SessionState::Idle && self.drained > 0 {
                self.fix_available = true;
            }
            return None;
        };

        let live_text = surface.text();
        let matched = matching::best_unit(&live_text, &span.text, &self.config.matching);
        let mut decorated = false;
        match &matched {
            Some(unit) => {
                if let Some(handle) = overlay.decorate(surface, &unit.text, span.category) {
                    overlay.animate(&handle, &self.config.timings).await;
                    decorated = true;
                } else {
                    tracing::debug!(span = %span.text, "matched unit not present in any text node");
                }
            }
            None => {
                tracing::debug!(span = %span.text, "no live unit matched the tagged span");
            }
        }

        self.legend_visible = true;
        self.drained += 1;
        tokio::time::sleep(Duration::from_millis(self.config.timings.queue_delay_ms)).await;
        Some(HighlightOutcome {
            span,
            matched,
            decorated,
        })
    }

    /// Drains the queue to exhaustion, strictly sequentially.
    pub async fn drain_queue(
        &mut self,
        surface: &EditorSurface,
        overlay: &mut OverlayLayer,
    ) -> Vec<HighlightOutcome> {
        let mut outcomes = Vec::new();
        while let Some(outcome) = self.drain_next(surface, overlay).await {
            outcomes.push(outcome);
        }
        outcomes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::surface::SurfaceMetrics;
    use crate::Category;

    fn fixtures(text: &str) -> (Session, EditorSurface, OverlayLayer) {
        let surface = EditorSurface::from_text(text, SurfaceMetrics::default()).unwrap();
        let overlay = OverlayLayer::attach(&surface).unwrap();
        (Session::new(Config::default()), surface, overlay)
    }

    #[tokio::test(start_paused = true)]
    async fn debounce_fires_with_current_epoch() {
        let (mut session, _surface, _overlay) = fixtures("draft");
        let rx = session.arm_debounce();
        assert_eq!(session.state(), SessionState::Pending);
        assert_eq!(rx.await.unwrap(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn rearming_cancels_the_prior_timer() {
        let (mut session, _surface, _overlay) = fixtures("draft");
        let stale = session.arm_debounce();
        let fresh = session.arm_debounce();
        assert!(stale.await.is_err());
        assert_eq!(fresh.await.unwrap(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn chunks_accumulate_and_tags_span_boundaries() {
        let (mut session, _surface, _overlay) = fixtures("draft");
        session.begin_stream();
        let first = session.ingest_chunk("<fluff>Be consi");
        assert!(first.is_empty());
        let second = session.ingest_chunk("stent.</fluff>");
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].text, "Be consistent.");
    }

    #[tokio::test(start_paused = true)]
    async fn re_emitted_spans_are_deduplicated() {
        let (mut session, _surface, _overlay) = fixtures("draft");
        session.begin_stream();
        let first = session.ingest_chunk("<fluff>Be consistent.</fluff>");
        assert_eq!(first.len(), 1);
        // The cumulative re-scan sees the same span again plus a new one.
        let second = session.ingest_chunk("<spam_words>Act now!</spam_words>");
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].category, Category::SpamWords);
        assert_eq!(session.queue_len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn queue_drains_in_arrival_order_and_exposes_fix() {
        let text = "Our product is a game-changer. It solves problems. \
                    The API uses REST and returns JSON payloads synchronously.";
        let (mut session, surface, mut overlay) = fixtures(text);
        session.begin_stream();
        session.ingest_chunk(
            "<spam_words>Our product is a game-changer.</spam_words>\n\
             <hard_to_read>The API uses REST and returns JSON payloads synchronously.</hard_to_read>",
        );
        session.finish_stream();
        assert!(!session.fix_available);

        let outcomes = session.drain_queue(&surface, &mut overlay).await;
        assert_eq!(outcomes.len(), 2);
        assert_eq!(outcomes[0].span.category, Category::SpamWords);
        assert_eq!(outcomes[1].span.category, Category::HardToRead);
        assert!(outcomes.iter().all(|o| o.decorated));
        assert_eq!(overlay.wrappers().len(), 2);
        assert!(session.fix_available);
        assert!(session.legend_visible);
    }

    #[tokio::test(start_paused = true)]
    async fn unmatched_spans_are_skipped_not_fatal() {
        let (mut session, surface, mut overlay) = fixtures("Completely unrelated prose lives here.");
        session.begin_stream();
        session.ingest_chunk("<fluff>Nothing like the actual document content.</fluff>");
        session.finish_stream();
        let outcomes = session.drain_queue(&surface, &mut overlay).await;
        assert_eq!(outcomes.len(), 1);
        assert!(!outcomes[0].decorated);
        assert!(overlay.is_empty());
        // The queue held an item, so the fix action still appears.
        assert!(session.fix_available);
    }

    #[tokio::test(start_paused = true)]
    async fn edit_clears_queue_dedup_and_fix_action() {
        let text = "Unlock the secret to instant results. Claim your free bonus today. \
                    This one weird trick works.";
        let (mut session, surface, mut overlay) = fixtures(text);
        session.begin_stream();
        session.ingest_chunk(
            "<spam_words>Unlock the secret to instant results.</spam_words>\
             <spam_words>Claim your free bonus today.</spam_words>\
             <spam_words>This one weird trick works.</spam_words>",
        );
        session.finish_stream();
        let first = session.drain_next(&surface, &mut overlay).await;
        assert!(first.is_some());
        assert_eq!(session.queue_len(), 2);

        session.note_edit(&mut overlay);
        assert_eq!(session.queue_len(), 0);
        assert!(overlay.is_empty());
        assert!(!session.fix_available);
        assert!(session.drain_next(&surface, &mut overlay).await.is_none());
        // Nothing from the stale batch resurfaces after the clear.
        assert!(overlay.is_empty());
        assert!(!session.fix_available);
    }

    #[tokio::test(start_paused = true)]
    async fn stale_response_lands_on_cleared_dedup_set() {
        let (mut session, _surface, mut overlay) = fixtures("draft");
        session.begin_stream();
        session.ingest_chunk("<fluff>Be consistent.</fluff>");
        let before = session.epoch();
        session.note_edit(&mut overlay);
        assert_eq!(session.epoch(), before + 1);
        // The in-flight response was not cancelled; its late chunk is
        // accepted again because the dedup set was wiped.
        let late = session.ingest_chunk("<fluff>Be consistent.</fluff>");
        assert_eq!(late.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn buffer_feeds_the_fixer_handoff() {
        let (mut session, _surface, _overlay) = fixtures("draft");
        session.begin_stream();
        session.ingest_chunk("pre <fluff>Be consistent.</fluff> post");
        session.finish_stream();
        assert_eq!(
            crate::extract::rewrap(session.tagged_response()),
            "<fluff>Be consistent.</fluff>"
        );
    }
}
