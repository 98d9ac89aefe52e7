use notegraph_core::models::Note;
use notegraph_core::profile::ConfigProfile;
use notegraph_core::{score, FeatureExtractor, LinkingOrchestrator};
use proptest::prelude::*;

const WORDS: &[&str] = &[
    "rust", "ownership", "borrow", "graph", "edge", "note", "vector", "cosine", "topic",
    "keyword", "parser", "lexer", "tokio", "async", "cache", "index", "query", "schema",
];

/// Capitalized phrases, identifiers, code spans and non-ASCII words.
const NAMED: &[&str] = &[
    "Machine Learning", "Graph Theory", "Tokio", "PostgreSQL", "loss_fn", "learningRate",
    "`edge_key`", "`HashMap`", "introdução", "programação", "Álgebra Linear", "функции",
    "высшего порядка", "Straße",
];

/// Fragments that only mean something at the start of a line.
const MARKUP: &[&str] = &[
    "\n# Overview\n", "\n## Details\n", "\n- first item\n", "\n* second item\n",
    "\n1. step one\n", "\n```\nlet x = 1;\n```\n", "[docs](https://example.org)",
    "**important**", "\n\n",
];

fn fragment() -> impl Strategy<Value = &'static str> {
    prop_oneof![
        6 => prop::sample::select(WORDS),
        2 => prop::sample::select(NAMED),
        1 => prop::sample::select(MARKUP),
    ]
}

fn text() -> impl Strategy<Value = String> {
    // A leading plain word keeps every note extractable.
    (prop::sample::select(WORDS), prop::collection::vec(fragment(), 2..24))
        .prop_map(|(first, rest)| format!("{} {}", first, rest.join(" ")))
}

fn embedding() -> impl Strategy<Value = Option<Vec<f32>>> {
    prop::option::of(prop::collection::vec(0.0f32..1.0, 4))
}

fn note() -> impl Strategy<Value = Note> {
    (text(), text(), embedding()).prop_map(|(title, content, emb)| {
        let n = Note::new(title, content);
        match emb {
            Some(e) => n.with_embedding(e),
            None => n,
        }
    })
}

fn stricter(base: &ConfigProfile, delta: f32) -> ConfigProfile {
    let mut p = base.clone();
    let t = &mut p.thresholds;
    for v in [
        &mut t.highly_related,
        &mut t.semantically_related,
        &mut t.topically_related,
        &mut t.structurally_related,
        &mut t.keyword_related,
        &mut t.loosely_related,
        &mut t.conceptually_related,
        &mut t.weakly_related,
    ] {
        *v = (*v + delta).min(1.0);
    }
    p
}

proptest! {
    #[test]
    fn every_dimension_is_symmetric(a in note(), b in note()) {
        let extractor = FeatureExtractor::new().unwrap();
        let corpus = vec![a.clone(), b.clone()];
        let snapshot = extractor.snapshot(&corpus);
        let fa = extractor.extract(&a, &snapshot).unwrap();
        let fb = extractor.extract(&b, &snapshot).unwrap();
        let weights = ConfigProfile::default().weights;

        let ab = score(&fa, &fb, &weights);
        let ba = score(&fb, &fa, &weights);
        match (ab.semantic, ba.semantic) {
            (Some(x), Some(y)) => prop_assert!((x - y).abs() < 1e-5),
            (x, y) => prop_assert_eq!(x, y),
        }
        prop_assert!((ab.keyword - ba.keyword).abs() < 1e-5);
        prop_assert!((ab.structural - ba.structural).abs() < 1e-5);
        prop_assert!((ab.topic - ba.topic).abs() < 1e-5);
        prop_assert!((ab.concept - ba.concept).abs() < 1e-5);
        prop_assert!((ab.composite - ba.composite).abs() < 1e-5);
        prop_assert_eq!(ab.shared_markup, ba.shared_markup);
        for v in [ab.keyword, ab.structural, ab.topic, ab.concept, ab.composite] {
            prop_assert!((0.0..=1.0).contains(&v));
        }
        prop_assert!(fa.concepts.is_subset(&fa.topics));
    }

    #[test]
    fn stricter_thresholds_never_add_candidates(
        notes in prop::collection::vec(note(), 2..8),
        delta in 0.0f32..0.3,
    ) {
        let orch = LinkingOrchestrator::standalone().unwrap();
        let base = ConfigProfile::default();
        let strict = stricter(&base, delta);

        let loose = orch.analyze(&notes[0], &notes, &base, &[]).unwrap();
        let tight = orch.analyze(&notes[0], &notes, &strict, &[]).unwrap();
        prop_assert!(
            tight.accepted.len() + tight.over_cap.len()
                <= loose.accepted.len() + loose.over_cap.len()
        );
    }

    #[test]
    fn cap_and_self_exclusion_hold(
        notes in prop::collection::vec(note(), 1..10),
        cap in 0usize..5,
    ) {
        let orch = LinkingOrchestrator::standalone().unwrap();
        let mut profile = ConfigProfile::default();
        profile.max_relationships_per_note = cap;
        profile.enable_weak_relationships = true;

        let analysis = orch.analyze(&notes[0], &notes, &profile, &[]).unwrap();
        prop_assert!(analysis.accepted.len() <= cap);
        prop_assert!(analysis.accepted.iter().all(|c| c.target_id != notes[0].id));
        prop_assert!(analysis.accepted.iter().all(|c| c.source_id == notes[0].id));
        prop_assert_eq!(analysis.pairs_evaluated, notes.len() - 1);
    }

    #[test]
    fn per_type_cap_holds(
        notes in prop::collection::vec(note(), 2..10),
        per_type in 1usize..3,
    ) {
        let orch = LinkingOrchestrator::standalone().unwrap();
        let mut profile = ConfigProfile::default();
        profile.max_relationships_per_type = per_type;
        profile.enable_weak_relationships = true;

        let analysis = orch.analyze(&notes[0], &notes, &profile, &[]).unwrap();
        let mut counts = std::collections::BTreeMap::new();
        for c in &analysis.accepted {
            *counts.entry(c.rel_type).or_insert(0usize) += 1;
        }
        prop_assert!(counts.values().all(|n| *n <= per_type));
    }

    #[test]
    fn linking_is_deterministic(notes in prop::collection::vec(note(), 2..8)) {
        let orch = LinkingOrchestrator::standalone().unwrap();
        let profile = ConfigProfile::default();
        let first = orch.link(&notes[0], &notes, &profile, &[]).unwrap();
        let second = orch.link(&notes[0], &notes, &profile, &[]).unwrap();
        prop_assert_eq!(first, second);
    }
}
