//! End-to-end pipeline scenarios over the public API: stream ingest,
//! progressive highlighting, reconciliation, alignment, and hand-off.

use gmm_core::{
    align_units, extract, parse_pairs, reconstruct, Category, Config, DiffKind, DiffView,
    DraftPair, EditorSurface, HandoffConfig, HandoffPayload, HandoffStore, OverlayLayer,
    RowMarker, Session, SurfaceMetrics,
};

const DRAFT: &str = "Our product is a game-changer. It solves problems. \
                     The API uses REST and returns JSON payloads synchronously.";

fn editor(text: &str) -> (EditorSurface, OverlayLayer) {
    let surface = EditorSurface::from_text(text, SurfaceMetrics::default()).unwrap();
    let overlay = OverlayLayer::attach(&surface).unwrap();
    (surface, overlay)
}

#[tokio::test(start_paused = true)]
async fn analysis_round_trip_highlights_and_offers_fix() {
    let (surface, mut overlay) = editor(DRAFT);
    let mut session = Session::new(Config::default());

    session.begin_stream();
    // The analyzer streams in two chunks, splitting a tag across them.
    let first = session.ingest_chunk("<spam_words>Our product is a game-cha");
    assert!(first.is_empty());
    let second = session.ingest_chunk(
        "nger.</spam_words>\n<hard_to_read>The API uses REST and returns JSON \
         payloads synchronously.</hard_to_read>",
    );
    assert_eq!(second.len(), 2);
    session.finish_stream();

    let outcomes = session.drain_queue(&surface, &mut overlay).await;
    assert_eq!(outcomes.len(), 2);
    // Queue order is arrival order: spam first, hard-to-read second.
    assert_eq!(outcomes[0].span.category, Category::SpamWords);
    assert_eq!(outcomes[1].span.category, Category::HardToRead);
    for outcome in &outcomes {
        let matched = outcome.matched.as_ref().unwrap();
        assert!((matched.score - 1.0).abs() < f32::EPSILON);
        assert!(outcome.decorated);
    }
    assert_eq!(overlay.wrappers().len(), 2);
    // Every decoration finished its animation before the next item ran.
    for wrapper in overlay.wrappers() {
        for segment in &wrapper.segments {
            assert_eq!(segment.width, segment.full_width);
        }
    }
    assert!(session.fix_available);
}

#[tokio::test(start_paused = true)]
async fn editing_mid_drain_drops_the_stale_batch() {
    let text = "Unlock instant results today. Claim your free bonus now. \
                This weird trick always works.";
    let (surface, mut overlay) = editor(text);
    let mut session = Session::new(Config::default());

    session.begin_stream();
    session.ingest_chunk(
        "<spam_words>Unlock instant results today.</spam_words>\
         <spam_words>Claim your free bonus now.</spam_words>\
         <spam_words>This weird trick always works.</spam_words>",
    );
    session.finish_stream();

    assert!(session.drain_next(&surface, &mut overlay).await.is_some());
    session.note_edit(&mut overlay);

    assert!(session.drain_next(&surface, &mut overlay).await.is_none());
    assert!(overlay.is_empty());
    assert!(!session.fix_available);
}

#[tokio::test(start_paused = true)]
async fn grade_to_fix_handoff_round_trip() {
    let (surface, mut overlay) = editor(DRAFT);
    let mut session = Session::new(Config::default());

    session.begin_stream();
    session.ingest_chunk("<spam_words>Our product is a game-changer.</spam_words>");
    session.finish_stream();
    session.drain_queue(&surface, &mut overlay).await;
    assert!(session.fix_available);

    let dir = tempfile::tempdir().unwrap();
    let mut store = HandoffStore::new(&HandoffConfig {
        durable_path: Some(dir.path().join("handoff.json")),
    });
    store
        .store_payload(&HandoffPayload {
            full_original_text: Some(DRAFT.to_string()),
            tagged_content: gmm_core::rewrap(session.tagged_response()),
            ..HandoffPayload::default()
        })
        .unwrap();

    // The fix view picks the payload up, applies the fixer's answer, and
    // clears the keys once rendered.
    let payload = store.load_payload().unwrap();
    assert_eq!(
        payload.tagged_content,
        "<spam_words>Our product is a game-changer.</spam_words>"
    );
    let pairs = parse_pairs(
        "<old_draft>Our product is a game-changer.</old_draft>\
         <optimized_draft>Our product cut onboarding from two weeks to one day.</optimized_draft>",
    );
    let improved = reconstruct(payload.full_original_text.as_deref().unwrap(), &pairs);
    let units = align_units(payload.full_original_text.as_deref().unwrap(), &improved);
    assert_eq!(units[0].kind, DiffKind::Changed);
    assert!(units[1..].iter().all(|u| u.kind == DiffKind::Unchanged));

    let view = DiffView::build(&units);
    assert_eq!(view.original[0].marker, RowMarker::Removed);
    assert_eq!(view.improved[0].marker, RowMarker::Added);
    assert_eq!(view.original[0].sync_id, view.improved[0].sync_id);

    store.clear_all();
    assert!(store.load_payload().is_none());
}

#[test]
fn empty_fixer_response_is_parse_empty_not_an_error() {
    let pairs = parse_pairs("The content looks fine as written.");
    assert!(pairs.is_empty());
}

#[test]
fn one_malformed_span_never_aborts_the_batch() {
    let raw = "<fluff>good span</fluff><spam_words>unterminated \
               <hard_to_read>still parsed</hard_to_read>";
    let spans = extract(raw);
    let texts: Vec<&str> = spans.iter().map(|s| s.text.as_str()).collect();
    assert!(texts.contains(&"good span"));
    assert!(texts.contains(&"still parsed"));
}

#[test]
fn fuzzy_fix_applies_once_or_not_at_all() {
    let document = "Greeting line. The launch plan needs three more weeks of work. Sign-off.";
    let unique = vec![DraftPair {
        // Not a literal substring, but its first five words anchor exactly
        // one sentence of the document.
        original: "The launch plan needs three extra sprints".into(),
        improved: "The launch plan slips three weeks.".into(),
    }];
    assert_eq!(
        reconstruct(document, &unique),
        "Greeting line. The launch plan slips three weeks. Sign-off."
    );

    let twice = "The launch plan needs work. The launch plan needs review.";
    let ambiguous = vec![DraftPair {
        // Whitespace drift defeats the literal path; the four-word key
        // phrase then matches both sentences.
        original: "The launch  plan needs".into(),
        improved: "Rewritten.".into(),
    }];
    assert_eq!(reconstruct(twice, &ambiguous), twice);
}
