use mnemos_memory::{
    BatchItem, ConsolidationOutcome, ConsolidationState, MemoryArea, MemoryError, MemoryMind,
    MemoryMindOptions, ProviderError, RetrieveOptions, SynthesisProvider,
};
use mnemos_test_utils::{
    FailingSynthesizer, FixedSynthesizer, RecordingSynthesizer, SlowSynthesizer, StubEmbedder,
};
use pretty_assertions::assert_eq;
use serde_json::json;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tempfile::tempdir;

fn options(threshold: usize, store_cooldown: Duration) -> MemoryMindOptions {
    let mut options = MemoryMindOptions::default();
    options.consolidation.threshold = threshold;
    options.consolidation.store_cooldown = store_cooldown;
    options
}

async fn open_mind(
    dir: &Path,
    synthesizer: Arc<dyn SynthesisProvider>,
    options: MemoryMindOptions,
) -> Arc<MemoryMind> {
    Arc::new(
        MemoryMind::open(
            "daemon",
            dir,
            Arc::new(StubEmbedder::new(256)),
            synthesizer,
            options,
        )
        .await
        .expect("mind"),
    )
}

async fn store_fragments(mind: &MemoryMind, texts: impl IntoIterator<Item = String>) {
    for text in texts {
        mind.store(text, MemoryArea::Fragments, json!({}))
            .await
            .expect("store fragment");
    }
}

#[tokio::test]
async fn learned_fragments_scenario() {
    let temp = tempdir().expect("tempdir");
    let (synthesizer, calls) = RecordingSynthesizer::new("Synthesis: X, Y, Z");
    let mind = open_mind(temp.path(), Arc::new(synthesizer), options(3, Duration::ZERO)).await;

    let mut fragment_ids = Vec::new();
    for text in ["I learned X", "I learned Y", "I learned Z"] {
        let id = mind
            .store(text, "fragments", json!({}))
            .await
            .expect("store")
            .expect("inserted");
        fragment_ids.push(id.to_string());
    }

    assert_eq!(calls.lock().len(), 1);
    let solutions = mind.list_area(&MemoryArea::Solutions);
    assert_eq!(solutions.len(), 1);
    let solution = &solutions[0];
    assert_eq!(solution.text, "Synthesis: X, Y, Z");
    assert_eq!(solution.metadata["type"], json!("consolidation"));
    assert_eq!(solution.metadata["fragment_count"], json!(3));
    assert_eq!(solution.metadata["consolidated_by"], json!("memory_mind"));
    let mut sources: Vec<String> = solution.metadata["source_fragments"]
        .as_array()
        .expect("sources")
        .iter()
        .filter_map(|id| id.as_str().map(str::to_string))
        .collect();
    sources.sort();
    fragment_ids.sort();
    assert_eq!(sources, fragment_ids);

    let hits = mind
        .retrieve("X", RetrieveOptions::default().with_area("fragments"))
        .await
        .expect("retrieve");
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].text, "I learned X");
}

#[tokio::test]
async fn ninth_fragment_does_not_trigger_but_tenth_does() {
    let temp = tempdir().expect("tempdir");
    let (synthesizer, calls) = RecordingSynthesizer::new("summary of ten");
    let mind = open_mind(temp.path(), Arc::new(synthesizer), options(10, Duration::ZERO)).await;

    store_fragments(&mind, (1..=9).map(|n| format!("fragment number {n}"))).await;
    assert!(calls.lock().is_empty());

    store_fragments(&mind, ["fragment number 10".to_string()]).await;
    assert_eq!(calls.lock().len(), 1);
    assert_eq!(calls.lock()[0].texts.len(), 10);
}

#[tokio::test]
async fn cooldown_allows_one_attempt_per_window() {
    let temp = tempdir().expect("tempdir");
    let (synthesizer, calls) = RecordingSynthesizer::new("cooled summary");
    let mind = open_mind(
        temp.path(),
        Arc::new(synthesizer),
        options(3, Duration::from_secs(600)),
    )
    .await;

    store_fragments(&mind, (1..=6).map(|n| format!("observation {n}"))).await;
    assert_eq!(calls.lock().len(), 1);
    assert_eq!(mind.stats().consolidation_runs, 1);
}

#[tokio::test]
async fn consolidation_keeps_fragments() {
    let temp = tempdir().expect("tempdir");
    let mind = open_mind(
        temp.path(),
        Arc::new(FixedSynthesizer::new("fragments distilled")),
        MemoryMindOptions::default(),
    )
    .await;
    store_fragments(&mind, (1..=4).map(|n| format!("raw note {n}"))).await;
    let before = mind.list_area(&MemoryArea::Fragments);

    let outcome = mind.consolidate(20).await.expect("consolidate");
    let ConsolidationOutcome::Consolidated {
        solution_id,
        fragment_count,
    } = outcome
    else {
        panic!("expected consolidation, got {outcome:?}");
    };
    assert_eq!(fragment_count, 4);
    assert_eq!(mind.list_area(&MemoryArea::Fragments), before);
    for fragment in &before {
        assert!(mind.index().get(fragment.id).is_some());
    }
    let solution = mind.index().get(solution_id).expect("solution");
    assert_eq!(solution.area, MemoryArea::Solutions);
    assert_eq!(solution.metadata["stored_by"], json!("memory_mind"));
}

#[tokio::test]
async fn consolidate_takes_newest_fragments() {
    let temp = tempdir().expect("tempdir");
    let (synthesizer, calls) = RecordingSynthesizer::new("newest only");
    let mind = open_mind(temp.path(), Arc::new(synthesizer), MemoryMindOptions::default()).await;
    store_fragments(&mind, (1..=5).map(|n| format!("entry {n}"))).await;

    mind.consolidate(3).await.expect("consolidate");
    let calls = calls.lock();
    assert_eq!(
        calls[0].texts,
        vec!["entry 5".to_string(), "entry 4".to_string(), "entry 3".to_string()]
    );
}

#[tokio::test]
async fn batch_inserted_fragments_tie_on_time_and_latest_wins() {
    let temp = tempdir().expect("tempdir");
    let (synthesizer, calls) = RecordingSynthesizer::new("tie break");
    let mind = open_mind(temp.path(), Arc::new(synthesizer), MemoryMindOptions::default()).await;
    mind.index()
        .add_batch(
            ["a", "b", "c", "d"]
                .into_iter()
                .map(|text| BatchItem::new(text, MemoryArea::Fragments))
                .collect(),
        )
        .await
        .expect("batch");

    mind.consolidate(3).await.expect("consolidate");
    assert_eq!(calls.lock()[0].texts, vec!["d", "c", "b"]);
}

#[tokio::test]
async fn small_manual_batch_draws_from_all_stored_fragments() {
    let temp = tempdir().expect("tempdir");
    let (synthesizer, calls) = RecordingSynthesizer::new("summary");
    let mind = open_mind(temp.path(), Arc::new(synthesizer), MemoryMindOptions::default()).await;
    store_fragments(&mind, (1..=5).map(|n| format!("fragment {n}"))).await;

    let outcome = mind.consolidate(2).await.expect("consolidate");
    let ConsolidationOutcome::Consolidated { fragment_count, .. } = outcome else {
        panic!("expected consolidation, got {outcome:?}");
    };
    assert_eq!(fragment_count, 2);
    let calls = calls.lock();
    assert_eq!(calls.len(), 1);
    assert_eq!(
        calls[0].texts,
        vec!["fragment 5".to_string(), "fragment 4".to_string()]
    );
}

#[tokio::test]
async fn too_few_fragments_is_nothing_to_do() {
    let temp = tempdir().expect("tempdir");
    let (synthesizer, calls) = RecordingSynthesizer::new("unused");
    let mind = open_mind(temp.path(), Arc::new(synthesizer), MemoryMindOptions::default()).await;
    store_fragments(&mind, ["only one".to_string(), "only two".to_string()]).await;

    let outcome = mind.consolidate(20).await.expect("consolidate");
    assert_eq!(outcome, ConsolidationOutcome::NothingToDo { fragments: 2 });
    assert!(calls.lock().is_empty());
    assert!(mind.stats().last_consolidation.is_some());
}

#[tokio::test]
async fn synthesis_failure_stores_nothing_and_starts_cooldown() {
    let temp = tempdir().expect("tempdir");
    let mind = open_mind(
        temp.path(),
        Arc::new(FailingSynthesizer::new("model offline")),
        options(3, Duration::from_secs(600)),
    )
    .await;
    store_fragments(&mind, (1..=3).map(|n| format!("unlucky {n}"))).await;

    assert!(mind.list_area(&MemoryArea::Solutions).is_empty());
    let stats = mind.stats();
    assert!(stats.last_consolidation.is_some());
    assert_eq!(stats.consolidation_runs, 0);
    assert_eq!(stats.consolidation_state, ConsolidationState::Idle);

    let err = mind.consolidate(20).await.unwrap_err();
    assert!(matches!(err, MemoryError::Provider(ProviderError::Request(_))));
}

#[tokio::test]
async fn blank_synthesis_is_a_provider_error() {
    let temp = tempdir().expect("tempdir");
    let mind = open_mind(
        temp.path(),
        Arc::new(FixedSynthesizer::new("   \n")),
        MemoryMindOptions::default(),
    )
    .await;
    store_fragments(&mind, (1..=3).map(|n| format!("blank {n}"))).await;

    let err = mind.consolidate(20).await.unwrap_err();
    assert!(matches!(
        err,
        MemoryError::Provider(ProviderError::InvalidResponse(_))
    ));
    assert!(mind.list_area(&MemoryArea::Solutions).is_empty());
}

#[tokio::test]
async fn repeated_synthesis_text_reports_duplicate() {
    let temp = tempdir().expect("tempdir");
    let mind = open_mind(
        temp.path(),
        Arc::new(FixedSynthesizer::new("same every time")),
        MemoryMindOptions::default(),
    )
    .await;
    store_fragments(&mind, (1..=3).map(|n| format!("repeat {n}"))).await;

    let first = mind.consolidate(20).await.expect("first");
    let ConsolidationOutcome::Consolidated { solution_id, .. } = first else {
        panic!("expected consolidation, got {first:?}");
    };
    let second = mind.consolidate(20).await.expect("second");
    assert_eq!(
        second,
        ConsolidationOutcome::Duplicate {
            existing_id: solution_id
        }
    );
}

#[tokio::test]
async fn manual_consolidation_reports_in_flight() {
    let temp = tempdir().expect("tempdir");
    let synthesizer = SlowSynthesizer::new("slow summary", Duration::from_millis(200));
    let mind = open_mind(
        temp.path(),
        Arc::new(synthesizer.clone()),
        MemoryMindOptions::default(),
    )
    .await;
    store_fragments(&mind, (1..=3).map(|n| format!("pending {n}"))).await;

    let running = {
        let mind = mind.clone();
        tokio::spawn(async move { mind.consolidate(20).await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(mind.stats().consolidation_state, ConsolidationState::Consolidating);
    assert_eq!(
        mind.consolidate(20).await.expect("second"),
        ConsolidationOutcome::InFlight
    );

    let outcome = running.await.expect("join").expect("consolidate");
    assert!(matches!(outcome, ConsolidationOutcome::Consolidated { .. }));
    assert_eq!(synthesizer.started(), 1);
}

#[tokio::test]
async fn store_and_background_share_one_gate() {
    let temp = tempdir().expect("tempdir");
    let synthesizer = SlowSynthesizer::new("shared gate", Duration::from_millis(150));
    let mut options = options(3, Duration::from_secs(600));
    options.consolidation.background_cooldown = Duration::from_secs(600);
    options.consolidation.interval = Duration::from_millis(10);
    let mind = open_mind(temp.path(), Arc::new(synthesizer.clone()), options).await;

    store_fragments(&mind, ["left".to_string(), "right".to_string()]).await;
    assert!(mind.start_background());
    let (a, b) = tokio::join!(
        mind.store("up", MemoryArea::Fragments, json!({})),
        mind.store("down", MemoryArea::Fragments, json!({})),
    );
    a.expect("store a");
    b.expect("store b");
    tokio::time::sleep(Duration::from_millis(300)).await;
    mind.stop_background().await;

    assert_eq!(synthesizer.started(), 1);
    assert_eq!(mind.list_area(&MemoryArea::Solutions).len(), 1);
}

#[tokio::test]
async fn background_scheduler_consolidates_on_tick() {
    let temp = tempdir().expect("tempdir");
    let (synthesizer, calls) = RecordingSynthesizer::new("nightly digest");
    let mut options = options(3, Duration::from_secs(600));
    options.consolidation.background_cooldown = Duration::ZERO;
    options.consolidation.interval = Duration::from_millis(20);
    let mind = open_mind(temp.path(), Arc::new(synthesizer), options).await;

    mind.index()
        .add_batch(
            (1..=3)
                .map(|n| BatchItem::new(format!("quiet {n}"), MemoryArea::Fragments))
                .collect(),
        )
        .await
        .expect("batch");
    assert!(calls.lock().is_empty());

    mind.start_background();
    tokio::time::sleep(Duration::from_millis(200)).await;
    mind.stop_background().await;

    assert!(!calls.lock().is_empty());
    assert_eq!(mind.list_area(&MemoryArea::Solutions).len(), 1);
}

#[tokio::test]
async fn stop_background_aborts_after_shutdown_timeout() {
    let temp = tempdir().expect("tempdir");
    let synthesizer = SlowSynthesizer::new("never finishes", Duration::from_secs(30));
    let mut options = options(3, Duration::from_secs(600));
    options.consolidation.background_cooldown = Duration::ZERO;
    options.consolidation.interval = Duration::from_millis(10);
    options.consolidation.shutdown_timeout = Duration::from_millis(100);
    options.consolidation.synthesis_timeout = Duration::from_secs(60);
    let mind = open_mind(temp.path(), Arc::new(synthesizer.clone()), options).await;
    mind.index()
        .add_batch(
            (1..=3)
                .map(|n| BatchItem::new(format!("stuck {n}"), MemoryArea::Fragments))
                .collect(),
        )
        .await
        .expect("batch");

    mind.start_background();
    tokio::time::sleep(Duration::from_millis(80)).await;
    assert_eq!(synthesizer.started(), 1);

    let started = Instant::now();
    mind.stop_background().await;
    assert!(started.elapsed() < Duration::from_secs(2));
    assert!(!mind.background_running());

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(mind.stats().consolidation_state, ConsolidationState::Idle);
}

#[tokio::test]
async fn search_and_format_lists_hits() {
    let temp = tempdir().expect("tempdir");
    let mind = open_mind(
        temp.path(),
        Arc::new(FixedSynthesizer::new("unused")),
        MemoryMindOptions::default(),
    )
    .await;
    mind.store("rust ownership", "solutions", json!({}))
        .await
        .expect("store");

    let listing = mind
        .search_and_format("rust ownership", 5)
        .await
        .expect("format");
    assert_eq!(
        listing,
        "Memory search results for 'rust ownership':\n1. [solutions] rust ownership (score: 1.00)"
    );
    assert_eq!(
        mind.search_and_format("zebra", 5).await.expect("format"),
        "No memories found for: zebra"
    );
}

#[tokio::test]
async fn context_folds_recent_turns() {
    let temp = tempdir().expect("tempdir");
    let mind = open_mind(
        temp.path(),
        Arc::new(FixedSynthesizer::new("unused")),
        MemoryMindOptions::default(),
    )
    .await;
    mind.store("the deploy key lives in the vault", "instruments", json!({}))
        .await
        .expect("store");

    let turns = vec![
        "where is the deploy key".to_string(),
        "the deploy key lives in the vault".to_string(),
    ];
    let context = mind
        .context_for("thanks", &turns, 5)
        .await
        .expect("context");
    assert!(context.starts_with(
        "## Relevant Memories:\n- [instruments] the deploy key lives in the vault (relevance: "
    ));
}
